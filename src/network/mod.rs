//! Metabolic networks as bipartite metabolite/reaction graphs.
use nalgebra_sparse::CsrMatrix;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::branch::BranchPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkNode {
    Metabolite(usize),
    Reaction(usize),
}

pub type Graph = UnGraph<NetworkNode, f64>;

/// Undirected graph with one node per metabolite and per reaction, and an edge weighted by the
/// stoichiometric coefficient wherever a reaction consumes or produces a metabolite.
pub struct MetabolicNetwork {
    pub graph: Graph,
    metabolites: Vec<NodeIndex>,
    reactions: Vec<NodeIndex>,
}

impl MetabolicNetwork {
    /// Builds the network from a stoichiometric matrix (metabolites × reactions). Reaction `j`
    /// corresponds to flux `j`, i.e. to row `j` of the elementary mode matrix.
    pub fn from_stoichiometry(stoichiometry: &CsrMatrix<f64>) -> Self {
        let mut graph = Graph::with_capacity(
            stoichiometry.nrows() + stoichiometry.ncols(),
            stoichiometry.nnz(),
        );
        let metabolites: Vec<NodeIndex> = (0..stoichiometry.nrows())
            .map(|m| graph.add_node(NetworkNode::Metabolite(m)))
            .collect();
        let reactions: Vec<NodeIndex> = (0..stoichiometry.ncols())
            .map(|r| graph.add_node(NetworkNode::Reaction(r)))
            .collect();

        for (m, r, &coefficient) in stoichiometry.triplet_iter() {
            if coefficient != 0.0 {
                graph.add_edge(metabolites[m], reactions[r], coefficient);
            }
        }

        MetabolicNetwork {
            graph,
            metabolites,
            reactions,
        }
    }

    pub fn metabolite_count(&self) -> usize {
        self.metabolites.len()
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.len()
    }

    /// Number of reactions connected to `metabolite`.
    pub fn degree(&self, metabolite: usize) -> usize {
        self.graph.neighbors(self.metabolites[metabolite]).count()
    }

    /// Reactions connected to `metabolite`, ascending.
    pub fn reactions_of(&self, metabolite: usize) -> Vec<usize> {
        let mut reactions: Vec<usize> = self
            .graph
            .neighbors(self.metabolites[metabolite])
            .filter_map(|n| match self.graph[n] {
                NetworkNode::Reaction(r) => Some(r),
                NetworkNode::Metabolite(_) => None,
            })
            .collect();
        reactions.sort_unstable();
        reactions
    }

    /// Metabolites with more than two connecting reactions.
    pub fn branch_points(&self) -> Vec<BranchPoint> {
        (0..self.metabolite_count())
            .filter(|&m| self.degree(m) > 2)
            .map(|m| BranchPoint {
                metabolite: Some(m),
                fluxes: self.reactions_of(m),
            })
            .collect()
    }
}
