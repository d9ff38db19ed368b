// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Min-Cost Max-Flow Solver

//! Successive shortest augmenting paths with Johnson potentials.
//!
//! One Bellman-Ford pass seeds the node potentials from the residual graph
//! as handed in (this tolerates negative reverse edges left by earlier flow).
//! Every later search is a Dijkstra over reduced costs
//! `c(u, v) + π(u) - π(v)`, which stay non-negative as long as π is advanced
//! by the distance labels after each search.
//!
//! Path lengths are lexicographic `(cost, tie)` pairs. The tie term of a
//! forward edge is the index of its head node (negated on the reverse twin),
//! so it is part of what the solver minimizes rather than an artifact of heap
//! order. Among all flows of minimum cost the solver returns one with the
//! smallest sum of head indices; in an assignment network that means lower
//! AP nodes, and therefore lower AP ids, win every tie, however many
//! augmentations came before. Runs are reproducible bit for bit.
//!
//! The solve can be bounded by wall-clock time and by augmentation count.
//! Exceeding either returns an error; the caller discards the network.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::network::{EdgeId, FlowNetwork, NodeId};

/// Lexicographic path length: milli cost first, node-index tie term second.
type Weight = (i64, i64);

const UNREACHED: Weight = (i64::MAX, i64::MAX);

fn add(a: Weight, b: Weight) -> Weight {
    (a.0 + b.0, a.1 + b.1)
}

fn sub(a: Weight, b: Weight) -> Weight {
    (a.0 - b.0, a.1 - b.1)
}

/// Cost and tie term of residual edge `e`. Forward edges sit at even ids.
fn weight(net: &FlowNetwork, e: EdgeId) -> Weight {
    let edge = net.edge(e);
    let tie = if e % 2 == 0 { edge.to as i64 } else { -(edge.from as i64) };
    (edge.cost, tie)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveError {
    #[error("solve exceeded its time budget after {augmentations} augmentations ({elapsed_ms} ms)")]
    TimeBudgetExceeded { augmentations: usize, elapsed_ms: u64 },

    #[error("solve exceeded its budget of {limit} augmentations")]
    AugmentationBudgetExceeded { limit: usize },

    #[error("residual network contains a negative-cost cycle")]
    NegativeCycle,
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveBudget {
    pub max_duration: Option<Duration>,
    pub max_augmentations: Option<usize>,
}

impl SolveBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_time_ms(ms: u64) -> Self {
        Self { max_duration: Some(Duration::from_millis(ms)), max_augmentations: None }
    }
}

/// Wall clock for the time budget. `std::time::Instant` panics on
/// wasm32-unknown-unknown, so the browser build runs without a time limit.
struct Deadline {
    #[cfg(not(target_arch = "wasm32"))]
    started: std::time::Instant,
    limit: Option<Duration>,
}

impl Deadline {
    fn start(limit: Option<Duration>) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            started: std::time::Instant::now(),
            limit,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[cfg(target_arch = "wasm32")]
    fn elapsed(&self) -> Duration {
        Duration::ZERO
    }

    fn expired(&self) -> bool {
        match self.limit {
            Some(Duration::ZERO) => true,
            Some(limit) => self.elapsed() > limit,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowResult {
    pub flow: i64,
    /// Total milli-unit cost of the flow pushed by this call.
    pub cost: i64,
    pub augmentations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MinCostMaxFlow {
    budget: SolveBudget,
}

impl MinCostMaxFlow {
    pub fn new(budget: SolveBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &SolveBudget {
        &self.budget
    }

    /// Push a maximum flow of minimum cost from source to sink, stopping
    /// early once `target` units have been pushed.
    pub fn solve(&self, net: &mut FlowNetwork, target: Option<i64>) -> Result<FlowResult, SolveError> {
        let deadline = Deadline::start(self.budget.max_duration);
        let mut potential = bellman_ford(net)?;
        let mut result = FlowResult { flow: 0, cost: 0, augmentations: 0 };
        let source = net.source();
        let sink = net.sink();

        loop {
            if target.is_some_and(|t| result.flow >= t) {
                break;
            }
            if deadline.expired() {
                return Err(SolveError::TimeBudgetExceeded {
                    augmentations: result.augmentations,
                    elapsed_ms: deadline.elapsed().as_millis() as u64,
                });
            }

            let (dist, parent) = dijkstra(net, &potential);
            if dist[sink] == UNREACHED {
                break;
            }
            if let Some(limit) = self.budget.max_augmentations {
                if result.augmentations >= limit {
                    return Err(SolveError::AugmentationBudgetExceeded { limit });
                }
            }

            for (pi, d) in potential.iter_mut().zip(&dist) {
                if *d != UNREACHED {
                    *pi = add(*pi, *d);
                }
            }

            let path = trace_path(net, &parent, source, sink);
            let mut amount = path.iter().map(|&e| net.edge(e).residual()).min().unwrap_or(0);
            if let Some(t) = target {
                amount = amount.min(t - result.flow);
            }
            if amount <= 0 {
                break;
            }
            for &e in &path {
                result.cost += amount * net.edge(e).cost;
                net.push(e, amount);
            }
            result.flow += amount;
            result.augmentations += 1;
        }

        tracing::trace!(
            flow = result.flow,
            cost = result.cost,
            augmentations = result.augmentations,
            "min-cost flow solved"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Shortest paths
// ---------------------------------------------------------------------------

/// Initial potentials: shortest residual distances from the source. Nodes the
/// source cannot reach get potential 0; no augmenting path ever visits them.
fn bellman_ford(net: &FlowNetwork) -> Result<Vec<Weight>, SolveError> {
    let n = net.node_count();
    let mut dist = vec![UNREACHED; n];
    dist[net.source()] = (0, 0);

    for round in 0..n {
        let mut changed = false;
        for u in 0..n {
            if dist[u] == UNREACHED {
                continue;
            }
            for &e in net.edges_from(u) {
                let edge = net.edge(e);
                let next = add(dist[u], weight(net, e));
                if edge.residual() > 0 && next < dist[edge.to] {
                    dist[edge.to] = next;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
        if round + 1 == n {
            return Err(SolveError::NegativeCycle);
        }
    }

    Ok(dist.into_iter().map(|d| if d == UNREACHED { (0, 0) } else { d }).collect())
}

fn dijkstra(net: &FlowNetwork, potential: &[Weight]) -> (Vec<Weight>, Vec<Option<EdgeId>>) {
    let n = net.node_count();
    let mut dist = vec![UNREACHED; n];
    let mut parent: Vec<Option<EdgeId>> = vec![None; n];
    let mut heap = BinaryHeap::new();

    dist[net.source()] = (0, 0);
    heap.push(Reverse(((0_i64, 0_i64), net.source())));

    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u] {
            continue;
        }
        for &e in net.edges_from(u) {
            let edge = net.edge(e);
            if edge.residual() <= 0 {
                continue;
            }
            let reduced = sub(add(weight(net, e), potential[u]), potential[edge.to]);
            let next = add(d, reduced);
            if next < dist[edge.to] {
                dist[edge.to] = next;
                parent[edge.to] = Some(e);
                heap.push(Reverse((next, edge.to)));
            }
        }
    }

    (dist, parent)
}

fn trace_path(net: &FlowNetwork, parent: &[Option<EdgeId>], source: NodeId, sink: NodeId) -> Vec<EdgeId> {
    let mut path = Vec::new();
    let mut node = sink;
    while node != source {
        let Some(e) = parent[node] else { return Vec::new() };
        path.push(e);
        node = net.edge(e).from;
    }
    path.reverse();
    path
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Two users, two APs with one slot each; both users prefer AP 0.
    fn contested() -> FlowNetwork {
        // 0 = source, 1..=2 users, 3..=4 APs, 5 = sink
        let mut net = FlowNetwork::new(6, 0, 5);
        net.add_edge(0, 1, 1, 0);
        net.add_edge(0, 2, 1, 0);
        net.add_edge(1, 3, 1, 100);
        net.add_edge(1, 4, 1, 400);
        net.add_edge(2, 3, 1, 100);
        net.add_edge(2, 4, 1, 150);
        net.add_edge(3, 5, 1, 0);
        net.add_edge(4, 5, 1, 0);
        net
    }

    #[test]
    fn finds_min_cost_max_flow() {
        let mut net = contested();
        let result = MinCostMaxFlow::default().solve(&mut net, None).expect("test: solve");
        assert_eq!(result.flow, 2);
        // user 1 → AP 3 (100) and user 2 → AP 4 (150)
        assert_eq!(result.cost, 250);
        assert_eq!(net.total_cost(), 250);
        for node in 1..=4 {
            assert_eq!(net.net_outflow(node), 0, "conservation at {}", node);
        }
    }

    #[test]
    fn stops_at_target() {
        let mut net = contested();
        let result = MinCostMaxFlow::default().solve(&mut net, Some(1)).expect("test: solve");
        assert_eq!(result.flow, 1);
        assert_eq!(result.cost, 100);
    }

    #[test]
    fn equal_cost_paths_prefer_lower_node() {
        let mut net = FlowNetwork::new(5, 0, 4);
        net.add_edge(0, 1, 1, 0);
        let low = net.add_edge(1, 2, 1, 300);
        let high = net.add_edge(1, 3, 1, 300);
        net.add_edge(2, 4, 1, 0);
        net.add_edge(3, 4, 1, 0);
        MinCostMaxFlow::default().solve(&mut net, None).expect("test: solve");
        assert_eq!(net.edge(low).flow, 1);
        assert_eq!(net.edge(high).flow, 0);
    }

    #[test]
    fn later_augmentations_still_prefer_lower_ap() {
        // 0 = source, 1..=2 users, 3..=5 APs, 6 = sink.
        // User 1 → {AP 3: 1, AP 4: 2}; user 2 → {AP 4: 3, AP 5: 3}.
        // Both optimal assignments cost 4; the second user must take AP 4.
        let mut net = FlowNetwork::new(7, 0, 6);
        net.add_edge(0, 1, 1, 0);
        net.add_edge(0, 2, 1, 0);
        let u1_a3 = net.add_edge(1, 3, 1, 1);
        net.add_edge(1, 4, 1, 2);
        let u2_a4 = net.add_edge(2, 4, 1, 3);
        let u2_a5 = net.add_edge(2, 5, 1, 3);
        for ap in 3..=5 {
            net.add_edge(ap, 6, 1, 0);
        }

        let result = MinCostMaxFlow::default().solve(&mut net, None).expect("test: solve");
        assert_eq!(result.flow, 2);
        assert_eq!(result.cost, 4);
        assert_eq!(net.edge(u1_a3).flow, 1);
        assert_eq!(net.edge(u2_a4).flow, 1);
        assert_eq!(net.edge(u2_a5).flow, 0);
    }

    #[test]
    fn rerouting_keeps_cost_optimal_over_ties() {
        // Both users want AP 3 at cost 1; the cheaper fallback is AP 5 for
        // user 1 (2) and AP 4 for user 2 (5). The tie term must never
        // outweigh a real cost difference.
        let mut net = FlowNetwork::new(7, 0, 6);
        net.add_edge(0, 1, 1, 0);
        net.add_edge(0, 2, 1, 0);
        net.add_edge(1, 3, 1, 1);
        let u1_a5 = net.add_edge(1, 5, 1, 2);
        net.add_edge(2, 3, 1, 1);
        net.add_edge(2, 4, 1, 5);
        for ap in 3..=5 {
            net.add_edge(ap, 6, 1, 0);
        }

        let result = MinCostMaxFlow::default().solve(&mut net, None).expect("test: solve");
        assert_eq!(result.cost, 3);
        assert_eq!(net.edge(u1_a5).flow, 1);
        assert_eq!(net.total_cost(), 3);
    }

    #[test]
    fn zero_time_budget_aborts() {
        let mut net = contested();
        let solver = MinCostMaxFlow::new(SolveBudget::with_time_ms(0));
        let err = solver.solve(&mut net, None).unwrap_err();
        assert!(matches!(err, SolveError::TimeBudgetExceeded { augmentations: 0, .. }));
    }

    #[test]
    fn augmentation_cap_aborts_unfinished_solve() {
        let mut net = contested();
        let solver = MinCostMaxFlow::new(SolveBudget { max_duration: None, max_augmentations: Some(1) });
        assert_eq!(
            solver.solve(&mut net, None),
            Err(SolveError::AugmentationBudgetExceeded { limit: 1 })
        );

        let mut net = contested();
        let roomy = MinCostMaxFlow::new(SolveBudget { max_duration: None, max_augmentations: Some(2) });
        assert_eq!(roomy.solve(&mut net, None).expect("test: solve").flow, 2);
    }

    #[test]
    fn empty_network_has_zero_flow() {
        let mut net = FlowNetwork::new(2, 0, 1);
        let result = MinCostMaxFlow::default().solve(&mut net, None).expect("test: solve");
        assert_eq!(result, FlowResult { flow: 0, cost: 0, augmentations: 0 });
    }
}
