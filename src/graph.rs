use rustc_hash::FxHashMap;

use crate::collections::Indexed;
use crate::error::{Error, Result};

const BALANCE_TOL: f64 = 1e-9;

/// Vertex handle. Dense index into the owning problem's vertex range.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Vertex(u32);

impl Vertex {
    pub(crate) fn new(index: usize) -> Self {
        Vertex(index as u32)
    }
}

impl Indexed for Vertex {
    fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Arc handle. The tails/head definition lives in the [`ArcPool`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Arc(u32);

impl Arc {
    pub(crate) fn new(index: usize) -> Self {
        Arc(index as u32)
    }
}

impl Indexed for Arc {
    fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Tail list of an arc. The single-tail case is by far the most common, so it
/// avoids a heap allocation.
#[derive(Clone, Debug)]
pub enum Tails {
    Single([(Vertex, f64); 1]),
    Multi(Vec<(Vertex, f64)>),
}

impl Tails {
    pub fn as_slice(&self) -> &[(Vertex, f64)] {
        match self {
            Tails::Single(pair) => pair,
            Tails::Multi(pairs) => pairs,
        }
    }
}

/// An arc's structural definition: an ordered list of (tail, multiplier)
/// pairs and a head. The multiplier is the number of units consumed at the
/// tail per unit of flow arriving at the head.
#[derive(Clone, Debug)]
pub struct ArcDef {
    head: Vertex,
    tails: Tails,
}

impl ArcDef {
    pub fn head(&self) -> Vertex {
        self.head
    }

    pub fn tails(&self) -> &[(Vertex, f64)] {
        self.tails.as_slice()
    }

    pub fn is_hyper(&self) -> bool {
        self.tails().len() > 1
    }

    /// The (tail, multiplier) pair of a simple arc; `None` for hyper-arcs.
    pub fn simple_tail(&self) -> Option<(Vertex, f64)> {
        match &self.tails {
            Tails::Single([pair]) => Some(*pair),
            Tails::Multi(_) => None,
        }
    }
}

/// Owns every arc definition of a problem. Networks and solutions refer to
/// arcs by index only, so the pool is shared behind an `Rc`.
#[derive(Clone, Debug, Default)]
pub struct ArcPool {
    defs: Vec<ArcDef>,
}

impl ArcPool {
    pub fn new() -> Self {
        ArcPool::default()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn push(&mut self, tails: Vec<(Vertex, f64)>, head: Vertex) -> Result<Arc> {
        let index = self.defs.len();
        if tails.is_empty() {
            return Err(Error::EmptyTails { arc: index });
        }
        for &(tail, multiplier) in &tails {
            if multiplier <= 0.0 {
                return Err(Error::NonPositiveMultiplier {
                    arc: index,
                    tail: tail.index(),
                    multiplier,
                });
            }
        }
        let tails = if tails.len() == 1 {
            Tails::Single([tails[0]])
        } else {
            Tails::Multi(tails)
        };
        self.defs.push(ArcDef { head, tails });
        Ok(Arc::new(index))
    }

    pub fn def(&self, arc: Arc) -> &ArcDef {
        &self.defs[arc.index()]
    }

    pub fn arcs(&self) -> impl Iterator<Item = Arc> {
        (0..self.defs.len()).map(Arc::new)
    }
}

/// An aggregated, resource-compatible set of arcs delivering one unit of
/// flow at its head.
///
/// Balance at the head is +1, tails have strictly negative balance (their
/// aggregated resource consumption), every intermediate vertex balances to
/// zero. Two hyper-trees are equal iff their arc-multiplicity mappings are.
#[derive(Clone, Debug)]
pub struct HyperTree {
    head: Vertex,
    /// Sorted by arc index.
    multiplicities: Vec<(Arc, f64)>,
    /// Aggregated consumption per tail vertex, sorted by vertex index.
    tails: Vec<(Vertex, f64)>,
}

impl PartialEq for HyperTree {
    fn eq(&self, other: &Self) -> bool {
        self.multiplicities == other.multiplicities
    }
}

impl HyperTree {
    /// Builds a hyper-tree from an arc-multiplicity mapping, validating the
    /// balance invariants against the pool's arc definitions.
    pub fn new(pool: &ArcPool, arc_multiplicities: Vec<(Arc, f64)>) -> Result<Self> {
        let mut multiplicities = arc_multiplicities;
        multiplicities.sort_unstable_by_key(|(arc, _)| *arc);
        multiplicities.retain(|&(_, m)| m != 0.0);

        let mut balance: FxHashMap<Vertex, f64> = FxHashMap::default();
        let mut is_target: FxHashMap<Vertex, bool> = FxHashMap::default();

        for &(arc, m) in &multiplicities {
            let def = pool.def(arc);
            *balance.entry(def.head()).or_default() += m;
            is_target.insert(def.head(), true);
            for &(tail, multiplier) in def.tails() {
                *balance.entry(tail).or_default() -= m * multiplier;
                is_target.entry(tail).or_insert(false);
            }
        }

        let mut head = None;
        let mut tails = vec![];
        for (&vertex, &b) in &balance {
            if !is_target[&vertex] {
                // A pure tail: consumption must be non-zero.
                if b.abs() <= BALANCE_TOL {
                    return Err(Error::UnbalancedHyperTree {
                        vertex: vertex.index(),
                        balance: b,
                        expected: f64::NEG_INFINITY,
                    });
                }
                tails.push((vertex, -b));
            } else if (b - 1.0).abs() <= BALANCE_TOL {
                if head.is_some() {
                    return Err(Error::UnbalancedHyperTree {
                        vertex: vertex.index(),
                        balance: b,
                        expected: 0.0,
                    });
                }
                head = Some(vertex);
            } else if b.abs() > BALANCE_TOL {
                return Err(Error::UnbalancedHyperTree {
                    vertex: vertex.index(),
                    balance: b,
                    expected: 0.0,
                });
            }
        }

        let head = head.ok_or(Error::UnbalancedHyperTree {
            vertex: usize::MAX,
            balance: 0.0,
            expected: 1.0,
        })?;
        tails.sort_unstable_by_key(|(v, _)| *v);

        Ok(HyperTree {
            head,
            multiplicities,
            tails,
        })
    }

    pub fn head(&self) -> Vertex {
        self.head
    }

    /// (tail vertex, aggregated units consumed per unit delivered at head).
    pub fn tails(&self) -> &[(Vertex, f64)] {
        &self.tails
    }

    pub fn arcs(&self) -> &[(Arc, f64)] {
        &self.multiplicities
    }

    pub fn multiplicity(&self, arc: Arc) -> f64 {
        self.multiplicities
            .binary_search_by_key(&arc, |(a, _)| *a)
            .map(|pos| self.multiplicities[pos].1)
            .unwrap_or(0.0)
    }

    pub fn contains(&self, arc: Arc) -> bool {
        self.multiplicities
            .binary_search_by_key(&arc, |(a, _)| *a)
            .is_ok()
    }

    /// Per-vertex unit-delivery cost under the two oracles, memoised from the
    /// head down. The cost at a tail is `tail_cost(v)`; at any other vertex it
    /// is `arc_cost(a) + sum of multiplier-weighted tail costs` over its
    /// unique incoming tree arc `a`. The value at the head is the cost of the
    /// column this tree represents.
    pub fn vertex_costs(
        &self,
        pool: &ArcPool,
        arc_cost: &impl Fn(Arc) -> f64,
        tail_cost: &impl Fn(Vertex) -> f64,
    ) -> FxHashMap<Vertex, f64> {
        let mut in_arc: FxHashMap<Vertex, Arc> = FxHashMap::default();
        for &(arc, _) in &self.multiplicities {
            let prev = in_arc.insert(pool.def(arc).head(), arc);
            debug_assert!(prev.is_none(), "vertex with two incoming tree arcs");
        }

        let mut costs: FxHashMap<Vertex, f64> = FxHashMap::default();
        self.cost_recursive(self.head, pool, &in_arc, arc_cost, tail_cost, &mut costs);
        costs
    }

    /// Cost of delivering one unit at the head.
    pub fn cost(
        &self,
        pool: &ArcPool,
        arc_cost: &impl Fn(Arc) -> f64,
        tail_cost: &impl Fn(Vertex) -> f64,
    ) -> f64 {
        self.vertex_costs(pool, arc_cost, tail_cost)[&self.head]
    }

    fn cost_recursive(
        &self,
        vertex: Vertex,
        pool: &ArcPool,
        in_arc: &FxHashMap<Vertex, Arc>,
        arc_cost: &impl Fn(Arc) -> f64,
        tail_cost: &impl Fn(Vertex) -> f64,
        costs: &mut FxHashMap<Vertex, f64>,
    ) -> f64 {
        if let Some(&known) = costs.get(&vertex) {
            return known;
        }
        let cost = match in_arc.get(&vertex) {
            None => tail_cost(vertex),
            Some(&arc) => {
                let def = pool.def(arc);
                let mut cost = arc_cost(arc);
                for &(tail, multiplier) in def.tails() {
                    cost += multiplier
                        * self.cost_recursive(tail, pool, in_arc, arc_cost, tail_cost, costs);
                }
                cost
            }
        };
        costs.insert(vertex, cost);
        cost
    }
}

/// A hyper-tree whose arcs form a single directed chain.
///
/// Built from an ordered arc sequence: the last arc runs at multiplicity 1
/// and each earlier arc's multiplicity compounds by the multipliers of the
/// arcs downstream of it.
#[derive(Clone, Debug)]
pub struct Path {
    arcs: Vec<Arc>,
    tree: HyperTree,
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree
    }
}

impl Eq for Path {}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.arcs.hash(state);
    }
}

impl Path {
    pub fn from_arcs(pool: &ArcPool, arcs: Vec<Arc>) -> Result<Path> {
        let mut multiplicities = vec![0.0; arcs.len()];
        let mut downstream = 1.0;
        let mut expected_tail = None;
        for (pos, &arc) in arcs.iter().enumerate().rev() {
            let def = pool.def(arc);
            let (tail, multiplier) = def
                .simple_tail()
                .ok_or(Error::HyperArcInPath { arc: arc.index() })?;
            if let Some(expected) = expected_tail {
                if def.head() != expected {
                    return Err(Error::BrokenArcChain {
                        arc: arc.index(),
                        tail: tail.index(),
                        expected: expected.index(),
                    });
                }
            }
            multiplicities[pos] = downstream;
            downstream *= multiplier;
            expected_tail = Some(tail);
        }

        let tree = HyperTree::new(
            pool,
            arcs.iter()
                .copied()
                .zip(multiplicities.iter().copied())
                .collect(),
        )?;
        Ok(Path { arcs, tree })
    }

    pub fn from_tree(pool: &ArcPool, tree: HyperTree) -> Result<Path> {
        // Reorder the tree arcs into chain order starting at the single tail.
        let mut by_tail: FxHashMap<Vertex, Arc> = FxHashMap::default();
        for &(arc, _) in tree.arcs() {
            let def = pool.def(arc);
            let (tail, _) = def
                .simple_tail()
                .ok_or(Error::HyperArcInPath { arc: arc.index() })?;
            by_tail.insert(tail, arc);
        }
        let &(mut cursor, _) = tree.tails().first().ok_or(Error::UnbalancedHyperTree {
            vertex: tree.head().index(),
            balance: 0.0,
            expected: -1.0,
        })?;

        let mut arcs = vec![];
        while let Some(&arc) = by_tail.get(&cursor) {
            arcs.push(arc);
            cursor = pool.def(arc).head();
            if arcs.len() > tree.arcs().len() {
                return Err(Error::LabelWalkCycle {
                    vertex: cursor.index(),
                });
            }
        }
        Ok(Path { arcs, tree })
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn tree(&self) -> &HyperTree {
        &self.tree
    }

    pub fn source(&self) -> Vertex {
        self.tree.tails()[0].0
    }

    pub fn sink(&self) -> Vertex {
        self.tree.head()
    }
}
