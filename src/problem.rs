use std::rc::Rc;

use crate::collections::{Indexed, LinkedListMap};
use crate::error::{Error, Result};
use crate::graph::{Arc, ArcPool, Vertex};
use crate::network::Network;

pub const DEFAULT_VIOLATION_PENALTY: f64 = 1e3;

/// Commodity handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Commodity(u32);

impl Commodity {
    pub(crate) fn new(index: usize) -> Self {
        Commodity(index as u32)
    }
}

impl Indexed for Commodity {
    fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Handle to a constraint created through the builder. One handle expands to
/// one or two rows of the side-constraint stack when the problem is built.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConstraintHandle(u32);

#[derive(Clone, Debug)]
pub struct CommodityDef {
    pub source: Vertex,
    pub sink: Vertex,
    pub demand: f64,
    pub capacity: f64,
    pub violation_penalty: f64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConstraintSense {
    Ge,
    Le,
    Eq,
}

/// A generic linear row over arc flows.
#[derive(Clone, Debug)]
pub struct SideConstraint {
    pub coefficients: Vec<(Arc, f64)>,
    pub sense: ConstraintSense,
    pub rhs: f64,
    pub violation_penalty: f64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarType {
    Continuous,
    Integer,
}

/// The immutable problem frame (network, per-arc metadata, commodities) plus
/// the mutable side-constraint stack.
///
/// The stack supports matched push/pop: the branch-and-bound driver pushes a
/// right-branch row on entering a node and pops it on exit, and the per-arc
/// secondary index follows along.
#[derive(Clone, Debug)]
pub struct Problem {
    pool: Rc<ArcPool>,
    network: Network,
    costs: Vec<f64>,
    capacities: Vec<f64>,
    var_types: Vec<VarType>,
    commodities: Vec<CommodityDef>,
    constraints: Vec<SideConstraint>,
    /// Per arc: (constraint index, coefficient), newest first.
    arc_constraints: LinkedListMap<(usize, f64)>,
}

impl Problem {
    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn pool(&self) -> &ArcPool {
        &self.pool
    }

    pub fn cost(&self, arc: Arc) -> f64 {
        self.costs[arc.index()]
    }

    pub fn capacity(&self, arc: Arc) -> f64 {
        self.capacities[arc.index()]
    }

    pub fn var_type(&self, arc: Arc) -> VarType {
        self.var_types[arc.index()]
    }

    pub fn num_commodities(&self) -> usize {
        self.commodities.len()
    }

    pub fn commodities(&self) -> impl Iterator<Item = (Commodity, &CommodityDef)> {
        self.commodities
            .iter()
            .enumerate()
            .map(|(idx, def)| (Commodity::new(idx), def))
    }

    pub fn commodity(&self, commodity: Commodity) -> &CommodityDef {
        &self.commodities[commodity.index()]
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraint(&self, index: usize) -> &SideConstraint {
        &self.constraints[index]
    }

    pub fn constraints(&self) -> impl Iterator<Item = (usize, &SideConstraint)> {
        self.constraints.iter().enumerate()
    }

    /// (constraint index, coefficient) pairs of the rows touching `arc`.
    pub fn arc_constraint_terms(&self, arc: Arc) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.arc_constraints.iter(arc.index()).copied()
    }

    /// Pushes a side constraint, updating the per-arc index. Returns the row
    /// index for dual lookups.
    pub fn push_constraint(&mut self, constraint: SideConstraint) -> usize {
        let index = self.constraints.len();
        for &(arc, coeff) in &constraint.coefficients {
            self.arc_constraints.push(arc.index(), (index, coeff));
        }
        self.constraints.push(constraint);
        index
    }

    /// Pops the most recent side constraint, restoring the per-arc index to
    /// its pre-push state.
    pub fn pop_constraint(&mut self) -> Option<SideConstraint> {
        let constraint = self.constraints.pop()?;
        let index = self.constraints.len();
        for &(arc, _) in &constraint.coefficients {
            let popped = self
                .arc_constraints
                .pop_head_where(arc.index(), |&(row, _)| row == index);
            debug_assert!(popped.is_some());
        }
        Some(constraint)
    }

    /// A sibling problem over the filtered network; metadata and constraint
    /// stack are carried over unchanged.
    pub fn filter_arcs(&self, predicate: impl FnMut(Arc) -> bool) -> Problem {
        Problem {
            pool: self.pool.clone(),
            network: self.network.filter_arcs(predicate),
            costs: self.costs.clone(),
            capacities: self.capacities.clone(),
            var_types: self.var_types.clone(),
            commodities: self.commodities.clone(),
            constraints: self.constraints.clone(),
            arc_constraints: self.arc_constraints.clone(),
        }
    }

    /// True when every arc variable is integer and every arc cost integral,
    /// which certifies an integer-valued objective.
    pub fn has_integral_objective(&self) -> bool {
        self.network.arcs().iter().all(|&arc| {
            self.var_type(arc) == VarType::Integer && self.cost(arc).fract() == 0.0
        })
    }
}

/// Tail specification accepted by [`ProblemBuilder::new_arc`]: a plain
/// vertex (multiplier 1), a (vertex, multiplier) pair, or a full list.
pub struct TailSpec(Vec<(Vertex, f64)>);

impl From<Vertex> for TailSpec {
    fn from(tail: Vertex) -> Self {
        TailSpec(vec![(tail, 1.0)])
    }
}

impl From<(Vertex, f64)> for TailSpec {
    fn from(pair: (Vertex, f64)) -> Self {
        TailSpec(vec![pair])
    }
}

impl From<Vec<(Vertex, f64)>> for TailSpec {
    fn from(tails: Vec<(Vertex, f64)>) -> Self {
        TailSpec(tails)
    }
}

struct BuilderConstraint {
    lb: f64,
    ub: f64,
    violation_penalty: f64,
    coefficients: Vec<(Arc, f64)>,
}

/// Fluent construction surface for problems.
#[derive(Default)]
pub struct ProblemBuilder {
    pool: ArcPool,
    num_vertices: usize,
    costs: Vec<f64>,
    capacities: Vec<f64>,
    var_types: Vec<VarType>,
    commodities: Vec<CommodityDef>,
    constraints: Vec<BuilderConstraint>,
}

impl ProblemBuilder {
    pub fn new() -> Self {
        ProblemBuilder::default()
    }

    pub fn new_vertex(&mut self) -> Vertex {
        let vertex = Vertex::new(self.num_vertices);
        self.num_vertices += 1;
        vertex
    }

    /// Creates an arc with cost 0, infinite capacity and a continuous
    /// variable; adjust afterwards with the setters.
    pub fn new_arc(&mut self, tails: impl Into<TailSpec>, head: Vertex) -> Result<Arc> {
        let TailSpec(tails) = tails.into();
        let arc = self.pool.push(tails, head)?;
        self.costs.push(0.0);
        self.capacities.push(f64::INFINITY);
        self.var_types.push(VarType::Continuous);
        Ok(arc)
    }

    pub fn set_cost(&mut self, arc: Arc, cost: f64) {
        self.costs[arc.index()] = cost;
    }

    pub fn set_capacity(&mut self, arc: Arc, capacity: f64) {
        self.capacities[arc.index()] = capacity;
    }

    pub fn set_var_type(&mut self, arc: Arc, var_type: VarType) {
        self.var_types[arc.index()] = var_type;
    }

    pub fn new_commodity(
        &mut self,
        source: Vertex,
        sink: Vertex,
        demand: f64,
        capacity: f64,
    ) -> Result<Commodity> {
        self.new_commodity_with_penalty(source, sink, demand, capacity, DEFAULT_VIOLATION_PENALTY)
    }

    pub fn new_commodity_with_penalty(
        &mut self,
        source: Vertex,
        sink: Vertex,
        demand: f64,
        capacity: f64,
        violation_penalty: f64,
    ) -> Result<Commodity> {
        if !(0.0 <= demand && demand <= capacity && capacity < f64::INFINITY) {
            return Err(Error::InvalidCommodityBounds {
                commodity: self.commodities.len(),
                demand,
                capacity,
            });
        }
        let commodity = Commodity::new(self.commodities.len());
        self.commodities.push(CommodityDef {
            source,
            sink,
            demand,
            capacity,
            violation_penalty,
        });
        Ok(commodity)
    }

    pub fn new_constraint(&mut self, lb: f64, ub: f64) -> Result<ConstraintHandle> {
        self.new_constraint_with_penalty(lb, ub, DEFAULT_VIOLATION_PENALTY)
    }

    pub fn new_constraint_with_penalty(
        &mut self,
        lb: f64,
        ub: f64,
        violation_penalty: f64,
    ) -> Result<ConstraintHandle> {
        let unbounded = lb == f64::NEG_INFINITY && ub == f64::INFINITY;
        let infeasible_infinities = lb == f64::INFINITY || ub == f64::NEG_INFINITY;
        if lb > ub || unbounded || infeasible_infinities {
            return Err(Error::InvalidConstraintBounds {
                constraint: self.constraints.len(),
                lb,
                ub,
            });
        }
        let handle = ConstraintHandle(self.constraints.len() as u32);
        self.constraints.push(BuilderConstraint {
            lb,
            ub,
            violation_penalty,
            coefficients: vec![],
        });
        Ok(handle)
    }

    pub fn set_constraint_coefficient(
        &mut self,
        constraint: ConstraintHandle,
        arc: Arc,
        coefficient: f64,
    ) {
        self.constraints[constraint.0 as usize]
            .coefficients
            .push((arc, coefficient));
    }

    /// Materialises the problem: builds the network over everything created
    /// so far and expands each builder constraint into its stack rows.
    pub fn get_problem(self) -> Problem {
        let num_arcs = self.costs.len();
        let pool = Rc::new(self.pool);
        let vertices: Vec<Vertex> = (0..self.num_vertices).map(Vertex::new).collect();
        let arcs: Vec<Arc> = pool.arcs().collect();
        let network = Network::new(pool.clone(), Rc::new(vertices), arcs);

        let mut problem = Problem {
            pool,
            network,
            costs: self.costs,
            capacities: self.capacities,
            var_types: self.var_types,
            commodities: self.commodities,
            constraints: vec![],
            arc_constraints: LinkedListMap::new(num_arcs),
        };

        for builder in self.constraints {
            if builder.lb == builder.ub {
                problem.push_constraint(SideConstraint {
                    coefficients: builder.coefficients,
                    sense: ConstraintSense::Eq,
                    rhs: builder.lb,
                    violation_penalty: builder.violation_penalty,
                });
                continue;
            }
            if builder.lb > f64::NEG_INFINITY {
                problem.push_constraint(SideConstraint {
                    coefficients: builder.coefficients.clone(),
                    sense: ConstraintSense::Ge,
                    rhs: builder.lb,
                    violation_penalty: builder.violation_penalty,
                });
            }
            if builder.ub < f64::INFINITY {
                problem.push_constraint(SideConstraint {
                    coefficients: builder.coefficients,
                    sense: ConstraintSense::Le,
                    rhs: builder.ub,
                    violation_penalty: builder.violation_penalty,
                });
            }
        }

        problem
    }
}
