//! Trust graph analysis.
//!
//! Directed graph with an edge from each inviter to each invitee. The graph
//! must be a forest: acyclic, every citizen has exactly one incoming edge,
//! every root is a seed.

use super::member::{Member, MemberId};
use crate::error::{TrustError, TrustResult};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::HashMap;

pub struct TrustGraph {
    graph: DiGraph<MemberId, ()>,
    seeds: Vec<NodeIndex>,
}

impl TrustGraph {
    /// Build the graph from members. Fails if an edge points at an
    /// unregistered member.
    pub fn build(members: &[Member]) -> TrustResult<Self> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::with_capacity(members.len());
        let mut seeds = Vec::new();

        for member in members {
            let node = graph.add_node(member.id.clone());
            nodes.insert(member.id.clone(), node);
            if member.is_seed() {
                seeds.push(node);
            }
        }

        for member in members {
            if let Some(inviter) = &member.invited_by {
                let from = nodes.get(inviter).copied().ok_or_else(|| {
                    TrustError::invariant(format!(
                        "dangling invite edge {} -> {}",
                        inviter, member.id
                    ))
                })?;
                graph.add_edge(from, nodes[&member.id], ());
            }
        }

        Ok(Self { graph, seeds })
    }

    /// Check the forest invariant.
    pub fn verify(&self) -> TrustResult<()> {
        if is_cyclic_directed(&self.graph) {
            return Err(TrustError::invariant("trust graph contains a cycle"));
        }

        for node in self.graph.node_indices() {
            let parents = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .count();
            let is_seed = self.seeds.contains(&node);
            match (is_seed, parents) {
                (true, 0) | (false, 1) => {}
                (true, _) => {
                    return Err(TrustError::invariant(format!(
                        "seed {} has an inviter",
                        self.graph[node]
                    )));
                }
                (false, _) => {
                    return Err(TrustError::invariant(format!(
                        "{} has {} inviters",
                        self.graph[node], parents
                    )));
                }
            }
        }

        let reachable = self.depths().len();
        if reachable != self.graph.node_count() {
            return Err(TrustError::invariant(format!(
                "{} members are not reachable from a seed",
                self.graph.node_count() - reachable
            )));
        }

        Ok(())
    }

    /// Distance of each member from its seed root (seeds are 0).
    pub fn depths(&self) -> HashMap<MemberId, usize> {
        let mut depths = HashMap::with_capacity(self.graph.node_count());
        for &seed in &self.seeds {
            depths.insert(self.graph[seed].clone(), 0);
            let mut bfs = Bfs::new(&self.graph, seed);
            while let Some(node) = bfs.next(&self.graph) {
                let depth = depths.get(&self.graph[node]).copied().unwrap_or(0);
                for edge in self.graph.edges(node) {
                    depths.insert(self.graph[edge.target()].clone(), depth + 1);
                }
            }
        }
        depths
    }
}
