use crate::error::{DcGridError, DcGridResult};
use crate::{BusId, Edge, LineId, Network, Node};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Bus adjacency over cables only; converters never connect buses here.
fn line_adjacency(network: &Network) -> BTreeMap<BusId, Vec<(BusId, LineId)>> {
    let mut adjacency: BTreeMap<BusId, Vec<(BusId, LineId)>> = BTreeMap::new();
    for bus in network.buses() {
        adjacency.entry(bus.id).or_default();
    }
    for line in network.lines() {
        adjacency
            .entry(line.from_bus)
            .or_default()
            .push((line.to_bus, line.id));
        adjacency
            .entry(line.to_bus)
            .or_default()
            .push((line.from_bus, line.id));
    }
    adjacency
}

/// Connected components of buses joined by lines (breadth-first search).
///
/// Components are ordered by their first bus in insertion order; buses without
/// any line come out as singleton components.
pub fn line_components(network: &Network) -> Vec<Vec<BusId>> {
    let adjacency = line_adjacency(network);
    let mut visited = HashSet::new();
    let mut components = Vec::new();
    for start in network.buses().map(|b| b.id) {
        if visited.contains(&start) {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(bus) = queue.pop_front() {
            if !visited.insert(bus) {
                continue;
            }
            members.push(bus);
            for (neighbor, _) in adjacency.get(&bus).into_iter().flatten() {
                if !visited.contains(neighbor) {
                    queue.push_back(*neighbor);
                }
            }
        }
        components.push(members);
    }
    components
}

/// Hop count over lines from the nearest of `sources` to every reachable bus.
pub fn bus_distances(network: &Network, sources: &[BusId]) -> HashMap<BusId, usize> {
    let adjacency = line_adjacency(network);
    let mut distances = HashMap::new();
    let mut queue = VecDeque::new();
    for &source in sources {
        if distances.insert(source, 0).is_none() {
            queue.push_back(source);
        }
    }
    while let Some(bus) = queue.pop_front() {
        let next = distances[&bus] + 1;
        for (neighbor, _) in adjacency.get(&bus).into_iter().flatten() {
            if !distances.contains_key(neighbor) {
                distances.insert(*neighbor, next);
                queue.push_back(*neighbor);
            }
        }
    }
    distances
}

/// Lines on a shortest (fewest hops) path between two buses, in walking order.
///
/// `None` when the buses are not connected by lines; an empty path when `from == to`.
pub fn shortest_line_path(network: &Network, from: BusId, to: BusId) -> Option<Vec<LineId>> {
    let adjacency = line_adjacency(network);
    let mut parent: HashMap<BusId, (BusId, LineId)> = HashMap::new();
    let mut seen = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(bus) = queue.pop_front() {
        if bus == to {
            let mut path = Vec::new();
            let mut cursor = to;
            while let Some(&(prev, line)) = parent.get(&cursor) {
                path.push(line);
                cursor = prev;
            }
            path.reverse();
            return Some(path);
        }
        for &(neighbor, line) in adjacency.get(&bus).into_iter().flatten() {
            if seen.insert(neighbor) {
                parent.insert(neighbor, (bus, line));
                queue.push_back(neighbor);
            }
        }
    }
    None
}

/// Export the topology to a DOT string (Graphviz) so external tools can visualize the layout.
pub fn export_graph(network: &Network, format: &str) -> DcGridResult<String> {
    match format.to_ascii_lowercase().as_str() {
        "graphviz" | "dot" => Ok(render_dot(network)),
        other => Err(DcGridError::Config(format!(
            "unsupported graph export format '{other}'"
        ))),
    }
}

fn render_dot(network: &Network) -> String {
    let mut buffer = String::new();
    buffer.push_str("graph dc_network {\n");
    let mut bus_nodes = HashMap::new();
    for node in network.graph.node_indices() {
        let weight = &network.graph[node];
        let label = sanitize_label(weight.label());
        let shape = match weight {
            Node::Bus(bus) => {
                bus_nodes.insert(bus.id, node.index());
                "box"
            }
            Node::Asset(_) => "ellipse",
            Node::ExtGrid(_) => "doublecircle",
        };
        buffer.push_str(&format!(
            "  n{} [label=\"{}\", shape={}];\n",
            node.index(),
            label,
            shape
        ));
    }
    for edge in network.graph.edge_references() {
        let source = edge.source().index();
        let target = edge.target().index();
        let style = match edge.weight() {
            Edge::Line(_) => "solid",
            Edge::Converter(_) => "bold",
        };
        let label = sanitize_label(edge.weight().label());
        buffer.push_str(&format!(
            "  n{source} -- n{target} [label=\"{label}\", style={style}];\n"
        ));
    }
    // Assets and grids are isolated nodes; draw their bus attachment.
    for node in network.graph.node_indices() {
        let bus = match &network.graph[node] {
            Node::Asset(a) => a.bus,
            Node::ExtGrid(g) => g.bus,
            Node::Bus(_) => continue,
        };
        if let Some(bus_index) = bus_nodes.get(&bus) {
            buffer.push_str(&format!(
                "  n{} -- n{bus_index} [style=dotted];\n",
                node.index()
            ));
        }
    }
    buffer.push('}');
    buffer
}

fn sanitize_label(label: &str) -> String {
    label.replace('"', "\\\"")
}
