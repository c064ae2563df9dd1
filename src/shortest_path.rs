use rustc_hash::FxHashMap;

use crate::collections::{Indexed, IndexedMap};
use crate::error::{Error, Result};
use crate::graph::{Arc, HyperTree, Path, Vertex};
use crate::network::Network;

const VALUE_TOL: f64 = 1e-9;

/// A propagated label: best known cost, hop count for tie-breaking, and the
/// arc that realised it.
#[derive(Clone, Copy, Debug)]
pub struct Label {
    pub value: f64,
    pub hops: u32,
    pub entering_arc: Option<Arc>,
}

impl Label {
    fn dominates(&self, incumbent: &Label) -> bool {
        self.value < incumbent.value - VALUE_TOL
            || ((self.value - incumbent.value).abs() <= VALUE_TOL && self.hops < incumbent.hops)
    }
}

/// Forward and backward labels of one (source, sink) pricing solve.
///
/// `forward[v]` is the least cost of delivering one unit at `v` from the
/// source; `backward[v]` the least cost of sending one unit from `v` to the
/// sink, divided through the arc multipliers met on the way. The backward
/// side is only populated on non-hyper networks.
#[derive(Clone, Debug)]
pub struct ShortestPathSolution {
    source: Vertex,
    sink: Vertex,
    forward: IndexedMap<Vertex, Label>,
    backward: IndexedMap<Vertex, Label>,
    has_backward: bool,
}

const ABSENT: Label = Label {
    value: f64::INFINITY,
    hops: u32::MAX,
    entering_arc: None,
};

impl ShortestPathSolution {
    fn new(num_vertices: usize, source: Vertex, sink: Vertex) -> Self {
        ShortestPathSolution {
            source,
            sink,
            forward: IndexedMap::with_capacity(num_vertices, ABSENT),
            backward: IndexedMap::with_capacity(num_vertices, ABSENT),
            has_backward: false,
        }
    }

    pub fn source(&self) -> Vertex {
        self.source
    }

    pub fn sink(&self) -> Vertex {
        self.sink
    }

    pub fn forward_label(&self, vertex: Vertex) -> Option<&Label> {
        if self.forward.contains(vertex) {
            Some(self.forward.get(vertex))
        } else {
            None
        }
    }

    pub fn backward_label(&self, vertex: Vertex) -> Option<&Label> {
        if self.has_backward && self.backward.contains(vertex) {
            Some(self.backward.get(vertex))
        } else {
            None
        }
    }

    /// Cost of the cheapest unit delivery at the sink, infinite when the
    /// sink is unreachable.
    pub fn sink_value(&self) -> f64 {
        self.forward_label(self.sink).map(|l| l.value).unwrap_or(f64::INFINITY)
    }

    /// Least cost among unit-delivering source-to-sink flows that put one
    /// unit of flow on `arc`. Only defined on non-hyper networks.
    pub fn min_unit_flow_cost(
        &self,
        network: &Network,
        cost: &impl Fn(Arc) -> f64,
        arc: Arc,
    ) -> Result<f64> {
        if network.is_hyper_graph() {
            return Err(Error::HyperGraphUnsupported {
                operation: "min_unit_flow_cost",
            });
        }
        let def = network.pool().def(arc);
        let mut total = cost(arc);
        for &(tail, multiplier) in def.tails() {
            match self.forward_label(tail) {
                Some(label) => total += multiplier * label.value,
                None => return Ok(f64::INFINITY),
            }
        }
        match self.backward_label(def.head()) {
            Some(label) => Ok(total + label.value),
            None => Ok(f64::INFINITY),
        }
    }

    /// The path realising [`min_unit_flow_cost`]: forward labels are walked
    /// from the arc's tail back to the source, backward labels from its head
    /// down to the sink.
    pub fn min_unit_flow_path(&self, network: &Network, arc: Arc) -> Result<Path> {
        if network.is_hyper_graph() {
            return Err(Error::HyperGraphUnsupported {
                operation: "min_unit_flow_path",
            });
        }
        let pool = network.pool();
        let def = pool.def(arc);
        let (tail, _) = def.simple_tail().expect("simple arc on non-hyper network");

        let mut chain = vec![];
        let mut cursor = tail;
        while cursor != self.source {
            let label = self
                .forward_label(cursor)
                .ok_or(Error::UnreachableArc { arc: arc.index() })?;
            let entering = label
                .entering_arc
                .ok_or(Error::UnreachableArc { arc: arc.index() })?;
            chain.push(entering);
            cursor = pool
                .def(entering)
                .simple_tail()
                .expect("simple arc on non-hyper network")
                .0;
            if chain.len() > network.num_arcs() {
                return Err(Error::LabelWalkCycle {
                    vertex: cursor.index(),
                });
            }
        }
        chain.reverse();
        chain.push(arc);

        let mut cursor = def.head();
        while cursor != self.sink {
            let label = self
                .backward_label(cursor)
                .ok_or(Error::UnreachableArc { arc: arc.index() })?;
            let leaving = label
                .entering_arc
                .ok_or(Error::UnreachableArc { arc: arc.index() })?;
            chain.push(leaving);
            cursor = pool.def(leaving).head();
            if chain.len() > network.num_arcs() + 1 {
                return Err(Error::LabelWalkCycle {
                    vertex: cursor.index(),
                });
            }
        }

        // The walk must use the queried arc exactly once.
        if chain.iter().filter(|&&a| a == arc).count() != 1 {
            return Err(Error::LabelWalkCycle {
                vertex: def.head().index(),
            });
        }
        Path::from_arcs(pool, chain)
    }

    /// Reconstructs the optimal hyper-tree delivering one unit at `target`
    /// by following the forward entering arcs, accumulating per-tail
    /// multipliers. This is the pricing output on hyper-graphs.
    pub fn optimal_tree(&self, network: &Network, target: Vertex) -> Result<HyperTree> {
        if self.forward_label(target).is_none() {
            return Err(Error::UnreachableVertex {
                vertex: target.index(),
            });
        }

        let pool = network.pool();
        let mut multiplicities: FxHashMap<Arc, f64> = FxHashMap::default();
        let mut stack = vec![(target, 1.0)];
        while let Some((vertex, units)) = stack.pop() {
            let label = self.forward_label(vertex).ok_or(Error::UnreachableVertex {
                vertex: vertex.index(),
            })?;
            let Some(arc) = label.entering_arc else {
                continue; // a tree tail
            };
            *multiplicities.entry(arc).or_insert(0.0) += units;
            for &(tail, multiplier) in pool.def(arc).tails() {
                stack.push((tail, multiplier * units));
            }
        }

        HyperTree::new(pool, multiplicities.into_iter().collect())
    }
}

/// Reusable pricing oracle for one (network, source, sink) triple: the
/// topologically-sorted arc list and the label buffers survive across
/// solves, so repricing with new costs does not allocate.
#[derive(Debug)]
pub struct ShortestPathGenerator {
    network: Network,
    sorted_arcs: Vec<Arc>,
    solution: ShortestPathSolution,
}

impl ShortestPathGenerator {
    pub fn new(network: &Network, source: Vertex, sink: Vertex) -> Result<Self> {
        let sorted_arcs = network.topological_arcs(&[source])?;
        Ok(ShortestPathGenerator {
            network: network.clone(),
            sorted_arcs,
            solution: ShortestPathSolution::new(network.vertices().len(), source, sink),
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn solve(&mut self, cost: &impl Fn(Arc) -> f64) -> &ShortestPathSolution {
        let pool = self.network.pool();
        let solution = &mut self.solution;
        solution.forward.reset();
        solution.backward.reset();

        solution.forward.set(
            solution.source,
            Label {
                value: 0.0,
                hops: 0,
                entering_arc: None,
            },
        );

        'arcs: for &arc in &self.sorted_arcs {
            let def = pool.def(arc);
            let mut value = cost(arc);
            let mut hops = 1;
            for &(tail, multiplier) in def.tails() {
                if !solution.forward.contains(tail) {
                    continue 'arcs;
                }
                let label = solution.forward.get(tail);
                value += multiplier * label.value;
                hops += label.hops;
            }
            let candidate = Label {
                value,
                hops,
                entering_arc: Some(arc),
            };
            let head = def.head();
            if !solution.forward.contains(head) || candidate.dominates(solution.forward.get(head))
            {
                solution.forward.set(head, candidate);
            }
        }

        solution.has_backward = !self.network.is_hyper_graph();
        if solution.has_backward {
            solution.backward.set(
                solution.sink,
                Label {
                    value: 0.0,
                    hops: 0,
                    entering_arc: None,
                },
            );
            for &arc in self.sorted_arcs.iter().rev() {
                let def = pool.def(arc);
                let (tail, multiplier) =
                    def.simple_tail().expect("simple arc on non-hyper network");
                if !solution.backward.contains(def.head()) {
                    continue;
                }
                let head_label = solution.backward.get(def.head());
                let candidate = Label {
                    value: (head_label.value + cost(arc)) / multiplier,
                    hops: head_label.hops + 1,
                    entering_arc: Some(arc),
                };
                if !solution.backward.contains(tail)
                    || candidate.dominates(solution.backward.get(tail))
                {
                    solution.backward.set(tail, candidate);
                }
            }
        }

        &self.solution
    }

    pub fn solution(&self) -> &ShortestPathSolution {
        &self.solution
    }
}
