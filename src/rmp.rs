use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::collections::Indexed;
use crate::error::{Error, Result};
use crate::graph::{Arc, HyperTree, Vertex};
use crate::lp_model::{LpSolver, ModelBuilder, ModelReady, ModelSolved};
use crate::problem::{Commodity, ConstraintSense, Problem, VarType};
use crate::solution::{round_to, ArcFlowSolution, DualSolution, PrimalSolution};

/// What the master-problem variables stand for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BasisKind {
    /// One variable per (arc, commodity).
    ArcFlow,
    /// One variable per priced path or hyper-tree.
    PathFlow,
}

/// A master-problem column: a hyper-tree of one commodity, its variable
/// domain and its cost under the problem's arc costs.
#[derive(Clone, Debug)]
pub struct Column {
    pub tree: HyperTree,
    pub commodity: Commodity,
    pub var_type: VarType,
    pub cost: f64,
}

impl Column {
    pub fn from_tree(problem: &Problem, commodity: Commodity, tree: HyperTree) -> Column {
        let cost = tree.cost(problem.pool(), &|arc| problem.cost(arc), &|_| 0.0);
        let var_type = if tree
            .arcs()
            .iter()
            .all(|&(arc, _)| problem.var_type(arc) == VarType::Integer)
        {
            VarType::Integer
        } else {
            VarType::Continuous
        };
        Column {
            tree,
            commodity,
            var_type,
            cost,
        }
    }

    pub fn from_arc(problem: &Problem, commodity: Commodity, arc: Arc) -> Result<Column> {
        let tree = HyperTree::new(problem.pool(), vec![(arc, 1.0)])?;
        Ok(Column {
            cost: tree.cost(problem.pool(), &|a| problem.cost(a), &|_| 0.0),
            var_type: problem.var_type(arc),
            tree,
            commodity,
        })
    }
}

/// Bit-exact identity of a hyper-tree, used to reject duplicate columns.
type ColumnKey = Vec<(usize, u64)>;

fn tree_key(tree: &HyperTree) -> ColumnKey {
    tree.arcs()
        .iter()
        .map(|&(arc, m)| (arc.index(), m.to_bits()))
        .collect()
}

struct ColumnEntry<Solver: LpSolver> {
    column: Column,
    var: <Solver::Model as ModelBuilder>::Variable,
    zero_iters: usize,
    active: bool,
}

enum ModelState<Solver: LpSolver> {
    Ready(Solver::Model),
    Solved(Solver::SolvedModel),
    Poisoned,
}

/// The restricted master problem.
///
/// Rows are laid out once at construction: a demand and a capacity row per
/// commodity (each carrying a penalised artificial so the model is feasible
/// with zero columns), a capacity row per capacitated arc, and one row per
/// side constraint on the problem's stack. Flow-conservation rows appear
/// lazily when a column first touches an intermediate vertex.
pub struct MasterModel<Solver: LpSolver> {
    state: ModelState<Solver>,
    relax: bool,
    primal_precision: u32,
    dual_precision: u32,

    demand_rows: Vec<<Solver::Model as ModelBuilder>::Row>,
    capacity_rows: Vec<<Solver::Model as ModelBuilder>::Row>,
    conservation_rows: FxHashMap<(Commodity, Vertex), <Solver::Model as ModelBuilder>::Row>,
    arc_capacity_rows: FxHashMap<Arc, <Solver::Model as ModelBuilder>::Row>,
    side_rows: Vec<<Solver::Model as ModelBuilder>::Row>,

    columns: Vec<ColumnEntry<Solver>>,
    column_keys: FxHashSet<(Commodity, ColumnKey)>,
}

impl<Solver: LpSolver> MasterModel<Solver> {
    pub fn new(
        problem: &Problem,
        relax: bool,
        primal_precision: u32,
        dual_precision: u32,
        verbose: bool,
    ) -> Self {
        let mut model = Solver::create_model("master", verbose);

        let mut demand_rows = vec![];
        let mut capacity_rows = vec![];
        for (commodity, def) in problem.commodities() {
            let k = commodity.index();
            let slack = model.add_variable(
                &format!("art_dem_{}", k),
                false,
                def.violation_penalty,
                0.0,
                f64::INFINITY,
            );
            demand_rows.push(model.add_row(
                &format!("dem_{}", k),
                &[slack],
                &[1.0],
                Some(def.demand),
                None,
            ));
            let slack = model.add_variable(
                &format!("art_cap_{}", k),
                false,
                def.violation_penalty,
                0.0,
                f64::INFINITY,
            );
            capacity_rows.push(model.add_row(
                &format!("cap_{}", k),
                &[slack],
                &[-1.0],
                None,
                Some(def.capacity),
            ));
        }

        let mut arc_capacity_rows = FxHashMap::default();
        for &arc in problem.network().arcs() {
            let capacity = problem.capacity(arc);
            if capacity < f64::INFINITY {
                let row = model.add_row(
                    &format!("arc_cap_{}", arc.index()),
                    &[],
                    &[],
                    None,
                    Some(capacity),
                );
                arc_capacity_rows.insert(arc, row);
            }
        }

        let mut side_rows = vec![];
        for (index, constraint) in problem.constraints() {
            let mut slacks = vec![];
            let mut coeffs = vec![];
            match constraint.sense {
                ConstraintSense::Ge => {
                    slacks.push(model.add_variable(
                        &format!("art_side_{}", index),
                        false,
                        constraint.violation_penalty,
                        0.0,
                        f64::INFINITY,
                    ));
                    coeffs.push(1.0);
                }
                ConstraintSense::Le => {
                    slacks.push(model.add_variable(
                        &format!("art_side_{}", index),
                        false,
                        constraint.violation_penalty,
                        0.0,
                        f64::INFINITY,
                    ));
                    coeffs.push(-1.0);
                }
                ConstraintSense::Eq => {
                    for (suffix, coeff) in [("p", 1.0), ("m", -1.0)] {
                        slacks.push(model.add_variable(
                            &format!("art_side_{}{}", index, suffix),
                            false,
                            constraint.violation_penalty,
                            0.0,
                            f64::INFINITY,
                        ));
                        coeffs.push(coeff);
                    }
                }
            }
            let (lb, ub) = match constraint.sense {
                ConstraintSense::Ge => (Some(constraint.rhs), None),
                ConstraintSense::Le => (None, Some(constraint.rhs)),
                ConstraintSense::Eq => (Some(constraint.rhs), Some(constraint.rhs)),
            };
            side_rows.push(model.add_row(
                &format!("side_{}", index),
                &slacks,
                &coeffs,
                lb,
                ub,
            ));
        }

        MasterModel {
            state: ModelState::Ready(model),
            relax,
            primal_precision,
            dual_precision,
            demand_rows,
            capacity_rows,
            conservation_rows: FxHashMap::default(),
            arc_capacity_rows,
            side_rows,
            columns: vec![],
            column_keys: FxHashSet::default(),
        }
    }

    pub fn is_relaxation(&self) -> bool {
        self.relax
    }

    pub fn is_solved(&self) -> bool {
        matches!(self.state, ModelState::Solved(_))
    }

    pub fn num_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.active).count()
    }

    /// Brings the model back to an editable state after a solve.
    fn make_editable(&mut self) {
        if matches!(self.state, ModelState::Solved(_)) {
            let state = std::mem::replace(&mut self.state, ModelState::Poisoned);
            let ModelState::Solved(solved) = state else {
                unreachable!()
            };
            self.state = ModelState::Ready(solved.reset());
        }
    }

    /// Adds a column unless its hyper-tree leaves the current network or an
    /// equal column is already present. Returns whether it was added.
    pub fn add_column(&mut self, problem: &Problem, column: Column) -> bool {
        if !problem.network().contains_tree(&column.tree) {
            return false;
        }
        let key = (column.commodity, tree_key(&column.tree));
        if self.column_keys.contains(&key) {
            return false;
        }

        self.make_editable();
        let ModelState::Ready(model) = &mut self.state else {
            unreachable!("master model poisoned");
        };

        let def = problem.commodity(column.commodity);
        let is_integer = column.var_type == VarType::Integer && !self.relax;
        let var = model.add_variable(
            &format!("col_{}", self.columns.len()),
            is_integer,
            column.cost,
            0.0,
            f64::INFINITY,
        );

        let head = column.tree.head();
        if head == def.sink {
            model.set_coefficient(&self.demand_rows[column.commodity.index()], &var, 1.0);
            model.set_coefficient(&self.capacity_rows[column.commodity.index()], &var, 1.0);
        } else {
            let row = conservation_row::<Solver>(
                &mut self.conservation_rows,
                model,
                column.commodity,
                head,
            );
            model.set_coefficient(row, &var, 1.0);
        }

        for &(tail, multiplier) in column.tree.tails() {
            if tail == def.source {
                continue;
            }
            let row = conservation_row::<Solver>(
                &mut self.conservation_rows,
                model,
                column.commodity,
                tail,
            );
            model.set_coefficient(row, &var, -multiplier);
        }

        for &(arc, multiplicity) in column.tree.arcs() {
            if let Some(row) = self.arc_capacity_rows.get(&arc) {
                model.set_coefficient(row, &var, multiplicity);
            }
        }

        let mut side_coeffs: FxHashMap<usize, f64> = FxHashMap::default();
        for &(arc, multiplicity) in column.tree.arcs() {
            for (row, coeff) in problem.arc_constraint_terms(arc) {
                *side_coeffs.entry(row).or_insert(0.0) += coeff * multiplicity;
            }
        }
        for (row, coeff) in side_coeffs {
            if coeff != 0.0 {
                model.set_coefficient(&self.side_rows[row], &var, coeff);
            }
        }

        self.column_keys.insert(key);
        self.columns.push(ColumnEntry {
            column,
            var,
            zero_iters: 0,
            active: true,
        });
        true
    }

    /// Column deletion fixes the variable to zero instead of removing rows.
    pub fn delete_column(&mut self, index: usize) {
        if !self.columns[index].active {
            return;
        }
        self.make_editable();
        let ModelState::Ready(model) = &mut self.state else {
            unreachable!("master model poisoned");
        };
        let entry = &mut self.columns[index];
        model.set_upper_bound(&entry.var, 0.0);
        entry.active = false;
        self.column_keys
            .remove(&(entry.column.commodity, tree_key(&entry.column.tree)));
    }

    pub fn solve(&mut self, time_limit: Option<Duration>) {
        self.make_editable();
        let state = std::mem::replace(&mut self.state, ModelState::Poisoned);
        let ModelState::Ready(mut model) = state else {
            unreachable!("master model poisoned");
        };
        if let Some(limit) = time_limit {
            model = model.set_time_limit(limit);
        }
        self.state = ModelState::Solved(model.solve());
    }

    fn solved(&self) -> &Solver::SolvedModel {
        match &self.state {
            ModelState::Solved(solved) => solved,
            _ => unreachable!("master model not solved"),
        }
    }

    pub fn has_solution(&self) -> bool {
        self.solved().has_solution()
    }

    pub fn is_optimal(&self) -> bool {
        self.solved().is_optimal()
    }

    pub fn objective_value(&self) -> f64 {
        self.solved().objective_value()
    }

    /// Rounded values of all columns, inactive ones reading zero, in column
    /// insertion order.
    pub fn column_values(&self) -> Vec<f64> {
        let solved = self.solved();
        self.columns
            .iter()
            .map(|entry| {
                if entry.active {
                    round_to(solved.variable_value(&entry.var), self.primal_precision)
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Updates zero-streak counters and deletes columns idle for more than
    /// `max_zero_iters` consecutive iterations.
    pub fn apply_retention(&mut self, max_zero_iters: usize) {
        if max_zero_iters == usize::MAX {
            return;
        }
        let values = self.column_values();
        let mut stale = vec![];
        for (index, value) in values.into_iter().enumerate() {
            let entry = &mut self.columns[index];
            if !entry.active {
                continue;
            }
            if value == 0.0 {
                entry.zero_iters += 1;
                if entry.zero_iters > max_zero_iters {
                    stale.push(index);
                }
            } else {
                entry.zero_iters = 0;
            }
        }
        for index in stale {
            self.delete_column(index);
        }
    }

    /// Aggregates column values into per-commodity arc flows.
    pub fn primal(&self, problem: &Problem) -> PrimalSolution {
        let solved = self.solved();
        let mut solutions: FxHashMap<Commodity, ArcFlowSolution> = problem
            .commodities()
            .map(|(c, def)| (c, ArcFlowSolution::new(c, def.source, def.sink)))
            .collect();
        for entry in &self.columns {
            if !entry.active {
                continue;
            }
            let value = round_to(solved.variable_value(&entry.var), self.primal_precision);
            if value == 0.0 {
                continue;
            }
            let solution = solutions
                .get_mut(&entry.column.commodity)
                .expect("column of unknown commodity");
            for &(arc, multiplicity) in entry.column.tree.arcs() {
                solution.add_flow(arc, value * multiplicity);
            }
        }
        let mut primal = PrimalSolution::default();
        for (commodity, solution) in solutions {
            primal.insert(commodity, solution);
        }
        primal
    }

    /// Row duals rounded to the configured precision. Only defined while the
    /// master is a linear relaxation.
    pub fn duals(&self, problem: &Problem) -> Result<DualSolution> {
        if !self.relax {
            return Err(Error::DualsUnavailable);
        }
        let solved = self.solved();
        let mut duals = DualSolution::default();
        for (commodity, _) in problem.commodities() {
            duals.demand.insert(
                commodity,
                round_to(
                    solved.row_dual(&self.demand_rows[commodity.index()]),
                    self.dual_precision,
                ),
            );
            duals.capacity.insert(
                commodity,
                round_to(
                    solved.row_dual(&self.capacity_rows[commodity.index()]),
                    self.dual_precision,
                ),
            );
        }
        for (index, row) in self.side_rows.iter().enumerate() {
            duals
                .side
                .insert(index, round_to(solved.row_dual(row), self.dual_precision));
        }
        for (&arc, row) in &self.arc_capacity_rows {
            duals
                .arc_capacity
                .insert(arc, round_to(solved.row_dual(row), self.dual_precision));
        }
        Ok(duals)
    }

    /// The active columns, for hand-off to deeper branch-and-bound nodes.
    pub fn active_columns(&self) -> Vec<Column> {
        self.columns
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.column.clone())
            .collect()
    }
}

fn conservation_row<'a, Solver: LpSolver>(
    rows: &'a mut FxHashMap<(Commodity, Vertex), <Solver::Model as ModelBuilder>::Row>,
    model: &mut Solver::Model,
    commodity: Commodity,
    vertex: Vertex,
) -> &'a <Solver::Model as ModelBuilder>::Row {
    rows.entry((commodity, vertex)).or_insert_with(|| {
        model.add_row(
            &format!("flow_{}_{}", commodity.index(), vertex.index()),
            &[],
            &[],
            Some(0.0),
            Some(0.0),
        )
    })
}
