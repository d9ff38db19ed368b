// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Flow Network

//! Dense-index residual network and the per-solve graph builder.
//!
//! Node layout is fixed: `0` is the source, users occupy `1..=U`, APs occupy
//! `U+1..=U+A` in ascending AP id order, and the sink is the last node.
//! Every edge is stored next to its reverse twin, so edge `e` and `e ^ 1`
//! always form a forward/reverse pair.

use crate::cost::{to_milli, CostFunction};
use crate::load::{LoadSnapshot, AIRTIME_EPSILON};
use crate::types::{AccessPoint, ApId, User, UserId};

pub type NodeId = usize;
pub type EdgeId = usize;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("user {0} has no access point above the usable RSSI threshold")]
    UnreachableUser(UserId),
}

// ---------------------------------------------------------------------------
// FlowNetwork
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub capacity: i64,
    /// Milli-unit cost per unit of flow.
    pub cost: i64,
    pub flow: i64,
}

impl FlowEdge {
    pub fn residual(&self) -> i64 {
        self.capacity - self.flow
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowNetwork {
    edges: Vec<FlowEdge>,
    adjacency: Vec<Vec<EdgeId>>,
    source: NodeId,
    sink: NodeId,
}

impl FlowNetwork {
    pub fn new(node_count: usize, source: NodeId, sink: NodeId) -> Self {
        Self {
            edges: Vec::new(),
            adjacency: vec![Vec::new(); node_count],
            source,
            sink,
        }
    }

    /// Add `from → to` plus its zero-capacity reverse. Returns the forward edge id.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, capacity: i64, cost: i64) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(FlowEdge { from, to, capacity, cost, flow: 0 });
        self.edges.push(FlowEdge { from: to, to: from, capacity: 0, cost: -cost, flow: 0 });
        self.adjacency[from].push(id);
        self.adjacency[to].push(id + 1);
        id
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn sink(&self) -> NodeId {
        self.sink
    }

    pub fn edge(&self, id: EdgeId) -> &FlowEdge {
        &self.edges[id]
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Residual edge ids leaving `node`, forward and reverse alike.
    pub fn edges_from(&self, node: NodeId) -> &[EdgeId] {
        &self.adjacency[node]
    }

    /// Forward edges only, in insertion order.
    pub fn forward_edges(&self) -> impl Iterator<Item = (EdgeId, &FlowEdge)> + '_ {
        self.edges.iter().enumerate().step_by(2)
    }

    /// Push `amount` units along `edge`, mirroring it on the reverse twin.
    pub fn push(&mut self, edge: EdgeId, amount: i64) {
        self.edges[edge].flow += amount;
        self.edges[edge ^ 1].flow -= amount;
    }

    /// Outflow minus inflow at `node`. Reverse edges carry negated flow, so
    /// the adjacency sum is exactly the net balance.
    pub fn net_outflow(&self, node: NodeId) -> i64 {
        self.adjacency[node].iter().map(|&e| self.edges[e].flow).sum()
    }

    pub fn total_flow(&self) -> i64 {
        self.net_outflow(self.source)
    }

    pub fn total_cost(&self) -> i64 {
        self.forward_edges().map(|(_, e)| e.flow * e.cost).sum()
    }

    pub fn reset_flow(&mut self) {
        for edge in &mut self.edges {
            edge.flow = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// FlowGraph
// ---------------------------------------------------------------------------

/// A user → AP edge admitted by the cost function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateEdge {
    pub ap: ApId,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkEdge {
    pub user: UserId,
    pub ap: ApId,
    pub edge: EdgeId,
    pub cost: f64,
}

/// A built network plus the id ↔ node bookkeeping needed to read it back.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    pub network: FlowNetwork,
    user_ids: Vec<UserId>,
    ap_ids: Vec<ApId>,
    links: Vec<LinkEdge>,
    unreachable: Vec<UserId>,
}

impl FlowGraph {
    pub fn user_node(&self, user: UserId) -> Option<NodeId> {
        self.user_ids.iter().position(|&u| u == user).map(|i| 1 + i)
    }

    pub fn ap_node(&self, ap: ApId) -> Option<NodeId> {
        self.ap_ids.binary_search(&ap).ok().map(|i| 1 + self.user_ids.len() + i)
    }

    /// Users that made it into the network.
    pub fn users(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn links(&self) -> &[LinkEdge] {
        &self.links
    }

    /// Users excluded from this solve for lack of any usable AP.
    pub fn unreachable(&self) -> &[UserId] {
        &self.unreachable
    }

    /// Units of flow the source can emit.
    pub fn supply(&self) -> i64 {
        self.user_ids.len() as i64
    }

    /// Units of flow the sink can absorb.
    pub fn ap_capacity(&self) -> i64 {
        let sink = self.network.sink();
        self.network
            .forward_edges()
            .filter(|(_, e)| e.to == sink)
            .map(|(_, e)| e.capacity)
            .sum()
    }

    /// Saturated user → AP edges, ascending by user id.
    pub fn extract(&self) -> Vec<LinkEdge> {
        let mut chosen: Vec<LinkEdge> = self
            .links
            .iter()
            .filter(|l| self.network.edge(l.edge).flow > 0)
            .copied()
            .collect();
        chosen.sort_by_key(|l| l.user);
        chosen
    }

    /// Users in the network that received no flow.
    pub fn unserved(&self) -> Vec<UserId> {
        let mut served: Vec<UserId> = self.extract().iter().map(|l| l.user).collect();
        served.sort_unstable();
        self.user_ids
            .iter()
            .copied()
            .filter(|u| served.binary_search(u).is_err())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// FlowGraphBuilder
// ---------------------------------------------------------------------------

/// Airtime view used to turn an AP's airtime budget into whole user slots.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AirtimeSlots {
    overload_fraction: f64,
    unit_demand: f64,
}

pub struct FlowGraphBuilder<'a> {
    cost: &'a CostFunction,
    aps: Vec<&'a AccessPoint>,
    load: &'a LoadSnapshot,
    airtime: Option<AirtimeSlots>,
}

impl<'a> FlowGraphBuilder<'a> {
    pub fn new(cost: &'a CostFunction, aps: &'a [AccessPoint], load: &'a LoadSnapshot) -> Self {
        let mut aps: Vec<&AccessPoint> = aps.iter().collect();
        aps.sort_by_key(|ap| ap.id);
        Self { cost, aps, load, airtime: None }
    }

    /// Bound each AP → sink edge by the number of `unit_demand` users that
    /// fit in the AP's airtime budget, as well as by its user capacity.
    pub fn with_airtime_limit(mut self, overload_fraction: f64, unit_demand: f64) -> Self {
        self.airtime = Some(AirtimeSlots { overload_fraction, unit_demand });
        self
    }

    /// Units of flow `ap` may absorb in this network.
    pub fn sink_capacity(&self, ap: &AccessPoint) -> i64 {
        let slots = i64::from(ap.user_capacity);
        match self.airtime {
            Some(a) if a.unit_demand > 0.0 => {
                let fit = (ap.airtime_budget(a.overload_fraction) / a.unit_demand + AIRTIME_EPSILON).floor();
                if fit.is_finite() {
                    slots.min(fit.max(0.0) as i64)
                } else {
                    slots
                }
            }
            _ => slots,
        }
    }

    /// Admitted edges for one user, ascending by AP id.
    pub fn user_edges(&self, user: &User, current: Option<ApId>) -> Result<Vec<CandidateEdge>, GraphError> {
        let edges: Vec<CandidateEdge> = self
            .aps
            .iter()
            .filter_map(|ap| {
                self.cost
                    .edge_cost(user, ap, self.load, current)
                    .map(|cost| CandidateEdge { ap: ap.id, cost })
            })
            .collect();
        if edges.is_empty() {
            return Err(GraphError::UnreachableUser(user.id));
        }
        Ok(edges)
    }

    /// Build the network for `users`, each paired with its current AP.
    /// Users without a single admitted edge are left out and reported.
    pub fn build<'u>(&self, users: impl IntoIterator<Item = (&'u User, Option<ApId>)>) -> FlowGraph {
        let mut admitted: Vec<(UserId, Vec<CandidateEdge>)> = Vec::new();
        let mut unreachable = Vec::new();
        for (user, current) in users {
            match self.user_edges(user, current) {
                Ok(edges) => admitted.push((user.id, edges)),
                Err(GraphError::UnreachableUser(id)) => unreachable.push(id),
            }
        }
        admitted.sort_by_key(|(id, _)| *id);
        unreachable.sort_unstable();

        let user_count = admitted.len();
        let ap_ids: Vec<ApId> = self.aps.iter().map(|ap| ap.id).collect();
        let source = 0;
        let sink = 1 + user_count + ap_ids.len();
        let mut network = FlowNetwork::new(sink + 1, source, sink);

        let mut links = Vec::new();
        for (i, (user, edges)) in admitted.iter().enumerate() {
            let user_node = 1 + i;
            network.add_edge(source, user_node, 1, 0);
            for candidate in edges {
                let Ok(j) = ap_ids.binary_search(&candidate.ap) else { continue };
                let edge = network.add_edge(user_node, 1 + user_count + j, 1, to_milli(candidate.cost));
                links.push(LinkEdge { user: *user, ap: candidate.ap, edge, cost: candidate.cost });
            }
        }
        for (j, ap) in self.aps.iter().enumerate() {
            network.add_edge(1 + user_count + j, sink, self.sink_capacity(ap), 0);
        }

        FlowGraph {
            network,
            user_ids: admitted.into_iter().map(|(id, _)| id).collect(),
            ap_ids,
            links,
            unreachable,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
