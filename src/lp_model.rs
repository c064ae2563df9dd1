use std::{fmt::Debug, time::Duration};

pub mod scip;

/// Capability set required from the black-box LP/MIP engine.
///
/// The engine only needs to create a minimisation model, grow it by
/// variables and rows, edit coefficients and bounds, solve, and hand back
/// primal values and row duals. Integrality relaxation is not an engine
/// concern: the master problem downgrades integer variables at creation
/// time when it runs in linear-relaxation mode.
pub trait ModelBuilder {
    type Variable: Clone + Debug;
    type Row: Clone + Debug;

    fn add_variable(
        &mut self,
        name: &str,
        is_integer: bool,
        obj: f64,
        lb: f64,
        ub: f64,
    ) -> Self::Variable;

    /// Adds a row `lb <= ax <= ub`; `None` means unbounded on that side.
    /// The row must accept coefficient edits for variables added later.
    fn add_row(
        &mut self,
        name: &str,
        vars: &[Self::Variable],
        coeffs: &[f64],
        lb: Option<f64>,
        ub: Option<f64>,
    ) -> Self::Row;

    fn set_coefficient(&mut self, row: &Self::Row, var: &Self::Variable, coeff: f64);

    fn set_upper_bound(&mut self, var: &Self::Variable, ub: f64);
}

pub trait ModelReady: ModelBuilder + Sized {
    type SolvedModel: ModelSolved<Model = Self>;

    fn set_time_limit(self, duration: Duration) -> Self;
    fn solve(self) -> Self::SolvedModel;
}

pub trait ModelSolved: Sized {
    type Model: ModelReady<SolvedModel = Self>;

    /// Whether any incumbent exists. A time-limited solve that found one is
    /// still usable.
    fn has_solution(&self) -> bool;
    fn is_optimal(&self) -> bool;
    fn objective_value(&self) -> f64;
    fn variable_value(&self, var: &<Self::Model as ModelBuilder>::Variable) -> f64;
    /// Dual value of a row; meaningful only when the model solved was linear.
    fn row_dual(&self, row: &<Self::Model as ModelBuilder>::Row) -> f64;
    /// Returns the model to an editable state, keeping all variables and
    /// rows. Columns priced between solves are added through this.
    fn reset(self) -> Self::Model;
}

pub trait LpSolver: Clone + Debug {
    type Model: ModelReady<SolvedModel = Self::SolvedModel>;
    type SolvedModel: ModelSolved<Model = Self::Model>;

    /// A fresh minimisation model.
    fn create_model(name: &str, verbose: bool) -> Self::Model;
}
