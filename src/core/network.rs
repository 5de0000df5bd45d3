use crate::types::{LineId, Tie};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Parameters for network construction and connectivity diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    /// A component whose worst-pair shortest-path cost (edges cost
    /// 1/confidence) exceeds this is flagged poorly connected
    pub max_path_cost: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self { max_path_cost: 50.0 }
    }
}

/// Connectivity diagnostics for one connected component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDiagnostics {
    /// Line ids in this component, ascending
    pub lines: Vec<LineId>,
    pub tie_count: usize,
    /// Maximum over line pairs of the minimum-cost connectivity; 0 for
    /// singletons
    pub cost_diameter: f64,
    pub poorly_connected: bool,
}

/// Undirected weighted tie graph over survey lines.
///
/// Built once per correction run from the merged tie set and discarded
/// after the solve. The shortest-path diagnostics flag sub-networks where
/// the least-squares solve may be ill-conditioned; they never change the
/// formulation itself.
#[derive(Debug, Clone)]
pub struct LevelingNetwork {
    pub ties: Vec<Tie>,
    /// Connected components over all supplied line ids (singletons
    /// included), each sorted ascending
    pub components: Vec<Vec<LineId>>,
    pub diagnostics: Vec<ComponentDiagnostics>,
    adjacency: HashMap<LineId, Vec<(LineId, f64)>>,
}

impl LevelingNetwork {
    /// Build the network over `line_ids` from the merged tie set
    pub fn build(ties: Vec<Tie>, line_ids: &[LineId], params: &NetworkParams) -> Self {
        let mut adjacency: HashMap<LineId, Vec<(LineId, f64)>> =
            line_ids.iter().map(|&id| (id, Vec::new())).collect();
        for tie in &ties {
            adjacency.entry(tie.line_a).or_default().push((tie.line_b, tie.weight));
            adjacency.entry(tie.line_b).or_default().push((tie.line_a, tie.weight));
        }

        let components = connected_components(&adjacency);
        let mut diagnostics = Vec::with_capacity(components.len());

        for component in &components {
            if component.len() < 2 {
                log::info!(
                    "line {:02} has no crossover with any other line; left unleveled",
                    component[0]
                );
                diagnostics.push(ComponentDiagnostics {
                    lines: component.clone(),
                    tie_count: 0,
                    cost_diameter: 0.0,
                    poorly_connected: false,
                });
                continue;
            }

            let members: HashSet<LineId> = component.iter().copied().collect();
            let tie_count = ties
                .iter()
                .filter(|t| members.contains(&t.line_a))
                .count();

            let cost_diameter = component
                .iter()
                .map(|&src| {
                    dijkstra(&adjacency, src)
                        .values()
                        .fold(0.0_f64, |acc, &d| acc.max(d))
                })
                .fold(0.0_f64, f64::max);

            let poorly_connected = cost_diameter > params.max_path_cost;
            if poorly_connected {
                log::warn!(
                    "component {:?}: worst-pair path cost {:.2} exceeds {:.2}; solve may be ill-conditioned",
                    component,
                    cost_diameter,
                    params.max_path_cost
                );
            } else {
                log::debug!(
                    "component {:?}: {} tie(s), cost diameter {:.2}",
                    component,
                    tie_count,
                    cost_diameter
                );
            }

            diagnostics.push(ComponentDiagnostics {
                lines: component.clone(),
                tie_count,
                cost_diameter,
                poorly_connected,
            });
        }

        log::info!(
            "leveling network: {} line(s), {} tie(s), {} component(s)",
            adjacency.len(),
            ties.len(),
            components.len()
        );

        Self {
            ties,
            components,
            diagnostics,
            adjacency,
        }
    }

    /// Ties whose endpoints both lie in `lines`
    pub fn ties_in_component(&self, lines: &[LineId]) -> Vec<&Tie> {
        let members: HashSet<LineId> = lines.iter().copied().collect();
        self.ties
            .iter()
            .filter(|t| members.contains(&t.line_a) && members.contains(&t.line_b))
            .collect()
    }

    /// Number of ties incident to a line
    pub fn degree(&self, line: LineId) -> usize {
        self.adjacency.get(&line).map_or(0, |n| n.len())
    }
}

fn connected_components(adjacency: &HashMap<LineId, Vec<(LineId, f64)>>) -> Vec<Vec<LineId>> {
    let mut visited: HashSet<LineId> = HashSet::new();
    let mut components = Vec::new();

    let mut nodes: Vec<LineId> = adjacency.keys().copied().collect();
    nodes.sort_unstable();

    for start in nodes {
        if visited.contains(&start) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = vec![start];
        visited.insert(start);
        while let Some(node) = queue.pop() {
            component.push(node);
            if let Some(neighbors) = adjacency.get(&node) {
                for &(next, _) in neighbors {
                    if visited.insert(next) {
                        queue.push(next);
                    }
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }

    components
}

#[derive(PartialEq)]
struct HeapEntry {
    cost: f64,
    node: LineId,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost; ties broken by node id for determinism
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest-path costs from `source` with edge cost = 1/confidence
fn dijkstra(adjacency: &HashMap<LineId, Vec<(LineId, f64)>>, source: LineId) -> HashMap<LineId, f64> {
    let mut dist: HashMap<LineId, f64> = HashMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(source, 0.0);
    heap.push(HeapEntry { cost: 0.0, node: source });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if cost > *dist.get(&node).unwrap_or(&f64::INFINITY) {
            continue;
        }
        if let Some(neighbors) = adjacency.get(&node) {
            for &(next, weight) in neighbors {
                if weight <= 0.0 {
                    continue;
                }
                let next_cost = cost + 1.0 / weight;
                if next_cost < *dist.get(&next).unwrap_or(&f64::INFINITY) {
                    dist.insert(next, next_cost);
                    heap.push(HeapEntry { cost: next_cost, node: next });
                }
            }
        }
    }

    dist
}
