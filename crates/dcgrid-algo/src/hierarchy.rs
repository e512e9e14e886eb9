//! # Subnetwork hierarchy
//!
//! Every converter joins two subnetworks. The resolver decides, per converter,
//! which side is closer to the single active external grid (the root) and
//! records the connection on both subnetworks: as an upstream link on the fed
//! side and as a downstream link on the feeding side.
//!
//! ## Classification
//!
//! Neighbor `N` of subnetwork `S` is upstream when a depth-first search over
//! converter connections, started at `N` with `S` excluded, reaches the root.
//! When both sides reach the root independently (a ring of converters) the side
//! with fewer converter hops to the root wins, ties broken by subnetwork id.
//! Every directed edge therefore points from a lower to a higher
//! `(hops, id)` rank, so the result is acyclic by construction; it is still
//! checked with a topological sort before use.
//!
//! ```text
//!        [0] root (active grid)
//!       /    \
//!     AC/DC  PDU
//!     /        \
//!   [1]        [2]
//!     \        /
//!      PDU   PDU          ring: both sides of 1-3 reach the root
//!        \  /
//!         [3]
//! ```
//!
//! ## Validation
//!
//! All failures are [`DcGridError::Config`]: no subnetwork or several
//! subnetworks holding an active external grid, subnetworks that cannot
//! reach the root, or a root set other than the slack subnetwork.

use crate::decompose::Decomposition;
use dcgrid_core::{BusId, ConverterId, DcGridError, DcGridResult, Network};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::{debug, warn};

/// A converter connection as seen from one subnetwork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    pub converter: ConverterId,
    /// Subnetwork on the other side of the converter
    pub remote: usize,
    /// Converter terminal inside this subnetwork
    pub local_bus: BusId,
    /// Converter terminal inside the remote subnetwork
    pub remote_bus: BusId,
}

/// Directed dependency graph over subnetwork ids
#[derive(Debug, Clone)]
pub struct Hierarchy {
    root: usize,
    /// Processing order, every subnetwork after all of its downstream neighbors
    order: Vec<usize>,
    /// Converter hops from the root
    depth: Vec<usize>,
    /// Edges point from the feeding to the fed subnetwork
    dag: DiGraph<usize, ConverterId>,
}

impl Hierarchy {
    pub fn root(&self) -> usize {
        self.root
    }

    /// Downstream-first processing order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn depth(&self, subnetwork: usize) -> Option<usize> {
        self.depth.get(subnetwork).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// (upstream, downstream, converter) triples
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, ConverterId)> + '_ {
        self.dag.edge_indices().filter_map(move |e| {
            let (a, b) = self.dag.edge_endpoints(e)?;
            Some((self.dag[a], self.dag[b], self.dag[e]))
        })
    }
}

pub struct HierarchyResolver;

impl HierarchyResolver {
    /// Classify every converter connection and fill the link lists of the
    /// decomposition's subnetworks.
    pub fn resolve(network: &Network, decomposition: &mut Decomposition) -> DcGridResult<Hierarchy> {
        let n = decomposition.len();
        let root = Self::find_root(network, decomposition)?;

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut connections = Vec::new();
        for converter in network.converters() {
            let side = |bus: BusId| {
                decomposition.subnetwork_of(bus).ok_or_else(|| {
                    DcGridError::Topology(format!("{} references unknown {bus}", converter.name))
                })
            };
            let (a, b) = (side(converter.from_bus)?, side(converter.to_bus)?);
            if a == b {
                warn!(
                    converter = %converter.name,
                    subnetwork = a,
                    "converter joins two buses of the same subnetwork; ignored"
                );
                continue;
            }
            adjacency[a].push(b);
            adjacency[b].push(a);
            connections.push((converter.id, a, converter.from_bus, b, converter.to_bus));
        }

        let depth = Self::hop_distances(&adjacency, root);
        let orphans: Vec<usize> = (0..n).filter(|&s| depth[s] == usize::MAX).collect();
        if !orphans.is_empty() {
            return Err(DcGridError::Config(format!(
                "subnetworks {orphans:?} have no converter path to the slack subnetwork {root}"
            )));
        }

        let mut dag = DiGraph::with_capacity(n, connections.len());
        let nodes: Vec<NodeIndex> = (0..n).map(|s| dag.add_node(s)).collect();
        for subnet in decomposition.subnetworks_mut() {
            subnet.upstream_links.clear();
            subnet.downstream_links.clear();
        }

        for (converter, a, bus_a, b, bus_b) in connections {
            let b_reaches = Self::reaches_root(&adjacency, b, a, root);
            let a_reaches = Self::reaches_root(&adjacency, a, b, root);
            let b_is_upstream = match (a_reaches, b_reaches) {
                (false, true) => true,
                (true, false) => false,
                (true, true) => (depth[b], b) < (depth[a], a),
                (false, false) => {
                    return Err(DcGridError::Config(format!(
                        "neither side of converter {} reaches the slack subnetwork",
                        converter.value()
                    )))
                }
            };
            let (up, up_bus, down, down_bus) = if b_is_upstream {
                (b, bus_b, a, bus_a)
            } else {
                (a, bus_a, b, bus_b)
            };

            let subnets = decomposition.subnetworks_mut();
            subnets[down].upstream_links.push(Link {
                converter,
                remote: up,
                local_bus: down_bus,
                remote_bus: up_bus,
            });
            subnets[up].downstream_links.push(Link {
                converter,
                remote: down,
                local_bus: up_bus,
                remote_bus: down_bus,
            });
            dag.add_edge(nodes[up], nodes[down], converter);
        }

        let roots: Vec<usize> = decomposition
            .subnetworks()
            .iter()
            .filter(|s| s.upstream_links.is_empty())
            .map(|s| s.id)
            .collect();
        if roots != [root] {
            return Err(DcGridError::Config(format!(
                "expected subnetwork {root} as the only root, found {roots:?}"
            )));
        }

        let sorted = toposort(&dag, None).map_err(|cycle| {
            DcGridError::Config(format!(
                "subnetwork {} lies on a converter cycle",
                dag[cycle.node_id()]
            ))
        })?;
        let order: Vec<usize> = sorted.into_iter().rev().map(|ix| dag[ix]).collect();
        debug!(subnetworks = n, root, ?order, "hierarchy resolved");

        Ok(Hierarchy {
            root,
            order,
            depth,
            dag,
        })
    }

    fn find_root(network: &Network, decomposition: &Decomposition) -> DcGridResult<usize> {
        let holders: BTreeSet<usize> = network
            .active_ext_grids()
            .filter_map(|g| decomposition.subnetwork_of(g.bus))
            .collect();
        let mut iter = holders.iter();
        match (iter.next(), iter.next()) {
            (Some(&root), None) => Ok(root),
            (None, _) => Err(DcGridError::Config(
                "no subnetwork holds an in-service external grid".into(),
            )),
            (Some(_), Some(_)) => Err(DcGridError::Config(format!(
                "active external grids found in subnetworks {holders:?}; exactly one slack source is supported"
            ))),
        }
    }

    /// Breadth-first converter hop count from the root; `usize::MAX` when unreachable.
    fn hop_distances(adjacency: &[Vec<usize>], root: usize) -> Vec<usize> {
        let mut depth = vec![usize::MAX; adjacency.len()];
        let mut queue = VecDeque::from([root]);
        depth[root] = 0;
        while let Some(s) = queue.pop_front() {
            for &next in &adjacency[s] {
                if depth[next] == usize::MAX {
                    depth[next] = depth[s] + 1;
                    queue.push_back(next);
                }
            }
        }
        depth
    }

    /// Depth-first search from `start` that never enters `excluded`.
    fn reaches_root(adjacency: &[Vec<usize>], start: usize, excluded: usize, root: usize) -> bool {
        if start == root {
            return true;
        }
        let mut visited = HashSet::from([excluded, start]);
        let mut stack = vec![start];
        while let Some(s) = stack.pop() {
            for &next in &adjacency[s] {
                if !visited.insert(next) {
                    continue;
                }
                if next == root {
                    return true;
                }
                stack.push(next);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcgrid_core::*;

    /// One bus per subnetwork, converters between the given pairs, grid on bus 0
    fn converter_graph(n: usize, pairs: &[(usize, usize)]) -> Network {
        let mut network = Network::new();
        for id in 0..n {
            network.add_bus(Bus::new(BusId::new(id), Volts(48.0)));
        }
        network.add_ext_grid(ExternalGrid::new(ExtGridId::new(0), BusId::new(0)));
        for (id, &(a, b)) in pairs.iter().enumerate() {
            network
                .add_converter(Converter::new(
                    ConverterId::new(id),
                    format!("PDU {id}"),
                    BusId::new(a),
                    BusId::new(b),
                    ConverterKind::Pdu,
                    Kilowatts(10.0),
                ))
                .unwrap();
        }
        network
    }

    fn resolve(network: &Network) -> DcGridResult<(Decomposition, Hierarchy)> {
        let mut decomposition = Decomposition::new(network);
        let hierarchy = HierarchyResolver::resolve(network, &mut decomposition)?;
        Ok((decomposition, hierarchy))
    }

    #[test]
    fn test_chain_order_is_downstream_first() {
        // converter written "backwards" on the 2-1 link
        let network = converter_graph(3, &[(0, 1), (2, 1)]);
        let (decomposition, hierarchy) = resolve(&network).unwrap();
        assert_eq!(hierarchy.root(), 0);
        assert_eq!(hierarchy.order(), &[2, 1, 0]);

        let leaf = decomposition.get(2).unwrap();
        assert_eq!(leaf.upstream_links.len(), 1);
        assert_eq!(leaf.upstream_links[0].remote, 1);
        assert_eq!(leaf.upstream_links[0].local_bus, BusId::new(2));
        assert!(leaf.downstream_links.is_empty());
        assert_eq!(hierarchy.depth(2), Some(2));
    }

    #[test]
    fn test_ring_is_broken_by_depth() {
        let network = converter_graph(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let (decomposition, hierarchy) = resolve(&network).unwrap();
        let three = decomposition.get(3).unwrap();
        assert_eq!(three.upstream_links.len(), 2);
        assert!(three.downstream_links.is_empty());
        assert_eq!(hierarchy.order().first(), Some(&3));
        assert_eq!(hierarchy.order().last(), Some(&0));
        assert_eq!(hierarchy.edges().count(), 4);
    }

    #[test]
    fn test_links_are_symmetric() {
        let network = converter_graph(5, &[(0, 1), (1, 2), (1, 3), (3, 4), (2, 4)]);
        let (decomposition, _) = resolve(&network).unwrap();
        for subnet in decomposition.subnetworks() {
            for link in &subnet.upstream_links {
                let remote = decomposition.get(link.remote).unwrap();
                assert!(remote.downstream_links.iter().any(|l| l.converter == link.converter
                    && l.remote == subnet.id
                    && l.remote_bus == link.local_bus));
            }
        }
    }

    #[test]
    fn test_missing_grid_is_config_error() {
        let mut network = converter_graph(2, &[(0, 1)]);
        for grid in network.ext_grids_mut() {
            grid.in_service = false;
        }
        assert!(matches!(resolve(&network), Err(DcGridError::Config(_))));
    }

    #[test]
    fn test_two_slack_subnetworks_is_config_error() {
        let mut network = converter_graph(2, &[(0, 1)]);
        network.add_ext_grid(ExternalGrid::new(ExtGridId::new(1), BusId::new(1)));
        let err = resolve(&network).unwrap_err();
        assert!(matches!(err, DcGridError::Config(ref msg) if msg.contains("exactly one")));
    }

    #[test]
    fn test_orphan_subnetwork_is_config_error() {
        let network = converter_graph(3, &[(0, 1)]);
        assert!(matches!(resolve(&network), Err(DcGridError::Config(_))));
    }

    #[test]
    fn test_emulation_grids_do_not_count_as_root() {
        let mut network = converter_graph(2, &[(0, 1)]);
        network.add_ext_grid(ExternalGrid {
            origin: GridOrigin::ConverterEmulation {
                converter: ConverterId::new(0),
            },
            ..ExternalGrid::new(ExtGridId::new(1), BusId::new(1))
        });
        let (_, hierarchy) = resolve(&network).unwrap();
        assert_eq!(hierarchy.root(), 0);
    }
}
