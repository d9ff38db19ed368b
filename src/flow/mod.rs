// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Flow Optimizer

//! Global assignment optimizer.
//!
//! [`network`] turns the current users and APs into a bipartite flow network
//! (source → users → APs → sink) and [`solver`] pushes a minimum-cost maximum
//! flow through it. Saturated user → AP edges become the new assignment.

pub mod network;
pub mod solver;

pub use network::{CandidateEdge, FlowEdge, FlowGraph, FlowGraphBuilder, FlowNetwork, GraphError, LinkEdge};
pub use solver::{FlowResult, MinCostMaxFlow, SolveBudget, SolveError};
