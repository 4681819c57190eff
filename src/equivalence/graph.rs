// Edge-based formulation of thread equivalence
//
// Vertices are the sub-ranges of one cacheline; an edge joins every pair of
// thread-equivalent sub-ranges. Because thread equivalence is transitive the
// connected components are cliques and coincide with the signature groups.

use super::{thread_equivalent, Signature};
use crate::decompose::AddrRecord;

/// Equivalence graph over the sub-ranges of a cacheline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalenceGraph {
    vertices: usize,
    edges: Vec<(usize, usize)>,
}

impl EquivalenceGraph {
    pub fn new(records: &[AddrRecord]) -> Self {
        // Precompute signatures so each pair test is a set comparison
        let signatures: Vec<Signature> = records.iter().map(Signature::of).collect();
        let mut edges = Vec::new();
        for i in 0..records.len() {
            for j in (i + 1)..records.len() {
                if signatures[i] == signatures[j] {
                    debug_assert!(thread_equivalent(&records[i], &records[j]));
                    edges.push((i, j));
                }
            }
        }
        Self {
            vertices: records.len(),
            edges,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Every pair of sub-ranges is equivalent (one access pattern only)
    pub fn is_complete(&self) -> bool {
        self.edges.len() == self.vertices * self.vertices.saturating_sub(1) / 2
    }

    /// Connected components, each sorted, ordered by smallest vertex
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut parent: Vec<usize> = (0..self.vertices).collect();

        fn find(parent: &mut [usize], mut v: usize) -> usize {
            while parent[v] != v {
                parent[v] = parent[parent[v]];
                v = parent[v];
            }
            v
        }

        for &(a, b) in &self.edges {
            let ra = find(&mut parent, a);
            let rb = find(&mut parent, b);
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }

        let mut components: Vec<Vec<usize>> = Vec::new();
        let mut slot_of_root = vec![usize::MAX; self.vertices];
        for v in 0..self.vertices {
            let root = find(&mut parent, v);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = components.len();
                components.push(Vec::new());
            }
            components[slot_of_root[root]].push(v);
        }
        components
    }
}
