use std::rc::Rc;

use crate::collections::{Indexed, IndexedMap, LinkedListMap};
use crate::error::{Error, Result};
use crate::graph::{Arc, ArcPool, Vertex};

/// An ordered collection of vertices and arcs with the derived indexes the
/// solvers need: per-vertex outgoing-arc lists, an O(1) arc-membership test
/// and the hyper-graph flag.
///
/// Networks share the owning problem's [`ArcPool`] and vertex set, so
/// filtering produces a cheap sibling rather than a deep copy.
#[derive(Clone, Debug)]
pub struct Network {
    pool: Rc<ArcPool>,
    vertices: Rc<Vec<Vertex>>,
    arcs: Vec<Arc>,
    out_arcs: LinkedListMap<Arc>,
    membership: IndexedMap<Arc, bool>,
    is_hyper: bool,
}

impl Network {
    pub fn new(pool: Rc<ArcPool>, vertices: Rc<Vec<Vertex>>, arcs: Vec<Arc>) -> Self {
        let mut out_arcs = LinkedListMap::new(vertices.len());
        let mut membership = IndexedMap::with_capacity(pool.len(), false);
        let mut is_hyper = false;

        // Reverse push order so per-vertex iteration yields arcs in arc order.
        for &arc in arcs.iter().rev() {
            let def = pool.def(arc);
            debug_assert!(def.head().index() < vertices.len());
            is_hyper |= def.is_hyper();
            for &(tail, _) in def.tails() {
                debug_assert!(tail.index() < vertices.len());
                out_arcs.push(tail.index(), arc);
            }
        }
        for &arc in &arcs {
            membership.set(arc, true);
        }

        Network {
            pool,
            vertices,
            arcs,
            out_arcs,
            membership,
            is_hyper,
        }
    }

    pub fn pool(&self) -> &ArcPool {
        &self.pool
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    pub fn contains_arc(&self, arc: Arc) -> bool {
        *self.membership.get(arc)
    }

    pub fn contains_tree(&self, tree: &crate::graph::HyperTree) -> bool {
        tree.arcs().iter().all(|&(arc, _)| self.contains_arc(arc))
    }

    pub fn outgoing(&self, vertex: Vertex) -> impl Iterator<Item = Arc> + '_ {
        self.out_arcs.iter(vertex.index()).copied()
    }

    pub fn is_hyper_graph(&self) -> bool {
        self.is_hyper
    }

    /// A sibling network over the same vertex set keeping only the arcs
    /// accepted by the predicate. Per-arc metadata lives in the problem and
    /// is untouched.
    pub fn filter_arcs(&self, mut predicate: impl FnMut(Arc) -> bool) -> Network {
        let arcs = self
            .arcs
            .iter()
            .copied()
            .filter(|&arc| predicate(arc))
            .collect();
        Network::new(self.pool.clone(), self.vertices.clone(), arcs)
    }

    /// Vertices reachable from `sources`, ordered so every arc's tails
    /// precede its head. Fails on the first cycle found.
    pub fn topological_order(&self, sources: &[Vertex]) -> Result<Vec<Vertex>> {
        let mut visited = vec![false; self.vertices.len()];
        let mut on_stack = vec![false; self.vertices.len()];
        let mut post_order = vec![];

        for &source in sources {
            self.topo_visit(source, &mut visited, &mut on_stack, &mut post_order)?;
        }
        post_order.reverse();
        Ok(post_order)
    }

    fn topo_visit(
        &self,
        vertex: Vertex,
        visited: &mut [bool],
        on_stack: &mut [bool],
        post_order: &mut Vec<Vertex>,
    ) -> Result<()> {
        if on_stack[vertex.index()] {
            return Err(Error::CyclicNetwork {
                vertex: vertex.index(),
            });
        }
        if visited[vertex.index()] {
            return Ok(());
        }
        on_stack[vertex.index()] = true;

        for arc in self.outgoing(vertex) {
            if self.contains_arc(arc) {
                self.topo_visit(self.pool.def(arc).head(), visited, on_stack, post_order)?;
            }
        }

        on_stack[vertex.index()] = false;
        visited[vertex.index()] = true;
        post_order.push(vertex);
        Ok(())
    }

    /// Arcs whose every tail is reachable from `sources`, ordered so that an
    /// arc appears only after every arc feeding one of its tails. This is the
    /// processing order of the label-propagation passes.
    pub fn topological_arcs(&self, sources: &[Vertex]) -> Result<Vec<Arc>> {
        let order = self.topological_order(sources)?;
        let mut position: IndexedMap<Vertex, usize> =
            IndexedMap::with_capacity(self.vertices.len(), usize::MAX);
        for (pos, &vertex) in order.iter().enumerate() {
            position.set(vertex, pos);
        }

        let mut keyed: Vec<(usize, Arc)> = vec![];
        'arcs: for &arc in &self.arcs {
            let mut key = 0;
            for &(tail, _) in self.pool.def(arc).tails() {
                if !position.contains(tail) {
                    continue 'arcs;
                }
                key = key.max(*position.get(tail));
            }
            keyed.push((key, arc));
        }
        keyed.sort_unstable();
        Ok(keyed.into_iter().map(|(_, arc)| arc).collect())
    }
}
