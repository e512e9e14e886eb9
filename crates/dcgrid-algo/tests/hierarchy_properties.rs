//! Property tests for subnetwork decomposition and hierarchy resolution.
//!
//! Random trees of voltage domains are joined by converters of random
//! orientation; one domain holds the external grid.

use dcgrid_algo::{Decomposition, HierarchyResolver};
use dcgrid_core::*;
use proptest::prelude::*;
use std::collections::HashMap;

/// (parent of every domain after the first, converter drawn parent → child?, grid domain)
fn arb_tree(max_domains: usize) -> impl Strategy<Value = (Vec<usize>, Vec<bool>, usize)> {
    (2..=max_domains).prop_flat_map(|n| {
        let parents: Vec<_> = (1..n).map(|i| 0..i).collect();
        (
            parents,
            proptest::collection::vec(any::<bool>(), n - 1),
            0..n,
        )
    })
}

/// Domain `d` owns buses `2d` and `2d + 1`, joined by one line.
fn build(parents: &[usize], forward: &[bool], grid_domain: usize) -> Network {
    let domains = parents.len() + 1;
    let mut network = Network::new();
    for d in 0..domains {
        let voltage = if d % 2 == 0 { 750.0 } else { 48.0 };
        for bus in [2 * d, 2 * d + 1] {
            network.add_bus(Bus::new(BusId::new(bus), Volts(voltage)));
        }
        network
            .add_line(Line::new(
                LineId::new(d),
                BusId::new(2 * d),
                BusId::new(2 * d + 1),
                10.0,
                0.001,
            ))
            .unwrap();
    }
    for (i, (&parent, &down)) in parents.iter().zip(forward).enumerate() {
        let child = i + 1;
        let (a, b) = (BusId::new(2 * parent + 1), BusId::new(2 * child));
        let (from, to) = if down { (a, b) } else { (b, a) };
        network
            .add_converter(Converter::new(
                ConverterId::new(i),
                format!("conv {i}"),
                from,
                to,
                ConverterKind::Pdu,
                Kilowatts(10.0),
            ))
            .unwrap();
    }
    network.add_ext_grid(ExternalGrid::new(
        ExtGridId::new(0),
        BusId::new(2 * grid_domain),
    ));
    network
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn single_root_holds_the_grid((parents, forward, grid) in arb_tree(8)) {
        let network = build(&parents, &forward, grid);
        let mut decomposition = Decomposition::new(&network);
        let hierarchy = HierarchyResolver::resolve(&network, &mut decomposition).unwrap();

        prop_assert_eq!(decomposition.len(), parents.len() + 1);
        prop_assert_eq!(
            Some(hierarchy.root()),
            decomposition.subnetwork_of(BusId::new(2 * grid))
        );
        prop_assert_eq!(hierarchy.depth(hierarchy.root()), Some(0));
        prop_assert!(decomposition.get(hierarchy.root()).unwrap().upstream_links.is_empty());
    }

    #[test]
    fn every_converter_classified_once((parents, forward, grid) in arb_tree(8)) {
        let network = build(&parents, &forward, grid);
        let mut decomposition = Decomposition::new(&network);
        let hierarchy = HierarchyResolver::resolve(&network, &mut decomposition).unwrap();

        let edges: Vec<_> = hierarchy.edges().collect();
        prop_assert_eq!(edges.len(), parents.len());
        for (up, down, converter) in edges {
            prop_assert_eq!(hierarchy.depth(down), hierarchy.depth(up).map(|d| d + 1));

            // upstream on one side ⇔ downstream on the other
            let below = decomposition.get(down).unwrap();
            let above = decomposition.get(up).unwrap();
            prop_assert!(below.upstream_links.iter().any(|l| l.converter == converter && l.remote == up));
            prop_assert!(above.downstream_links.iter().any(|l| l.converter == converter && l.remote == down));
            prop_assert!(!below.downstream_links.iter().any(|l| l.converter == converter));
        }
        // a tree has one feeder per non-root domain
        for subnet in decomposition.subnetworks() {
            let expected = usize::from(subnet.id != hierarchy.root());
            prop_assert_eq!(subnet.upstream_links.len(), expected);
        }
    }

    #[test]
    fn order_solves_leaves_before_feeders((parents, forward, grid) in arb_tree(8)) {
        let network = build(&parents, &forward, grid);
        let mut decomposition = Decomposition::new(&network);
        let hierarchy = HierarchyResolver::resolve(&network, &mut decomposition).unwrap();

        let position: HashMap<usize, usize> = hierarchy
            .order()
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos))
            .collect();
        prop_assert_eq!(position.len(), decomposition.len());
        prop_assert_eq!(hierarchy.order().last().copied(), Some(hierarchy.root()));
        for (up, down, _) in hierarchy.edges() {
            prop_assert!(position[&down] < position[&up]);
        }
    }
}

#[test]
fn second_active_grid_is_rejected() {
    let mut network = build(&[0, 1], &[true, false], 0);
    network.add_ext_grid(ExternalGrid::new(ExtGridId::new(1), BusId::new(5)));
    let mut decomposition = Decomposition::new(&network);
    let err = HierarchyResolver::resolve(&network, &mut decomposition).unwrap_err();
    assert!(matches!(err, DcGridError::Config(_)), "{err}");
}

#[test]
fn out_of_service_grid_does_not_count() {
    let mut network = build(&[0, 1], &[true, false], 0);
    network.add_ext_grid(ExternalGrid {
        in_service: false,
        ..ExternalGrid::new(ExtGridId::new(1), BusId::new(5))
    });
    let mut decomposition = Decomposition::new(&network);
    let hierarchy = HierarchyResolver::resolve(&network, &mut decomposition).unwrap();
    assert_eq!(Some(hierarchy.root()), decomposition.subnetwork_of(BusId::new(0)));
}
