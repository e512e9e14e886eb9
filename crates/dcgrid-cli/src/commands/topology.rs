use anyhow::{Context, Result};
use dcgrid_algo::{Decomposition, HierarchyResolver};
use dcgrid_cli::{ProjectArgs, TopologyFormat};
use dcgrid_core::{graph_utils, Diagnostics, Network};
use serde::Serialize;
use std::io::{self, Write};
use tabwriter::TabWriter;

use super::common::{load_project, report_diagnostics};

#[derive(Debug, Serialize)]
struct SubnetworkView {
    id: usize,
    depth: Option<usize>,
    buses: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct LinkView {
    converter: String,
    upstream: usize,
    downstream: usize,
}

#[derive(Debug, Serialize)]
struct TopologyView {
    root: usize,
    order: Vec<usize>,
    subnetworks: Vec<SubnetworkView>,
    links: Vec<LinkView>,
}

fn describe(network: &Network) -> Result<TopologyView> {
    let mut decomposition = Decomposition::new(network);
    let hierarchy = HierarchyResolver::resolve(network, &mut decomposition)
        .context("resolving converter hierarchy")?;

    let subnetworks = decomposition
        .subnetworks()
        .iter()
        .map(|s| SubnetworkView {
            id: s.id,
            depth: hierarchy.depth(s.id),
            buses: s.buses.iter().map(|b| b.value()).collect(),
        })
        .collect();
    let links = hierarchy
        .edges()
        .map(|(upstream, downstream, converter)| LinkView {
            converter: network
                .converter(converter)
                .map_or_else(|| format!("converter {}", converter.value()), |c| c.name.clone()),
            upstream,
            downstream,
        })
        .collect();

    Ok(TopologyView {
        root: hierarchy.root(),
        order: hierarchy.order().to_vec(),
        subnetworks,
        links,
    })
}

fn print_plain(view: &TopologyView) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "Root subnetwork: {}", view.root)?;
    writeln!(writer, "SUBNETWORK\tDEPTH\tBUSES")?;
    for sub in &view.subnetworks {
        let buses: Vec<String> = sub.buses.iter().map(ToString::to_string).collect();
        let depth = sub.depth.map_or_else(|| "-".to_string(), |d| d.to_string());
        writeln!(writer, "{}\t{}\t{}", sub.id, depth, buses.join(","))?;
    }
    writeln!(writer)?;
    writeln!(writer, "CONVERTER\tUPSTREAM\tDOWNSTREAM")?;
    for link in &view.links {
        writeln!(writer, "{}\t{}\t{}", link.converter, link.upstream, link.downstream)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn handle(project: &ProjectArgs, format: TopologyFormat) -> Result<()> {
    let mut diag = Diagnostics::new();
    let loaded = load_project(project, &mut diag)?;
    match format {
        TopologyFormat::Dot => {
            println!("{}", graph_utils::export_graph(&loaded.network, "dot")?);
        }
        TopologyFormat::Json => {
            let view = describe(&loaded.network)?;
            serde_json::to_writer_pretty(io::stdout(), &view)
                .context("serializing topology to JSON")?;
            println!();
        }
        TopologyFormat::Plain => print_plain(&describe(&loaded.network)?)?,
    }
    report_diagnostics(&diag);
    Ok(())
}
