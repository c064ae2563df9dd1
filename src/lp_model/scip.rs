use russcip::{
    Constraint, Model, ProblemCreated, ProblemOrSolving, Solved, VarType, Variable, WithSolutions,
};

use super::{LpSolver, ModelBuilder, ModelReady, ModelSolved};

#[derive(Clone, Copy, Debug)]
pub struct ScipSolver;

impl ModelBuilder for Model<ProblemCreated> {
    type Variable = Variable;
    type Row = Constraint;

    fn add_variable(
        &mut self,
        name: &str,
        is_integer: bool,
        obj: f64,
        lb: f64,
        ub: f64,
    ) -> Self::Variable {
        self.add_var(
            lb,
            ub,
            obj,
            name,
            if is_integer {
                VarType::Integer
            } else {
                VarType::Continuous
            },
        )
    }

    fn add_row(
        &mut self,
        name: &str,
        vars: &[Self::Variable],
        coeffs: &[f64],
        lb: Option<f64>,
        ub: Option<f64>,
    ) -> Self::Row {
        let cons = self.add_cons(
            vars.iter().collect(),
            coeffs,
            lb.unwrap_or(f64::NEG_INFINITY),
            ub.unwrap_or(f64::INFINITY),
            name,
        );
        // Rows keep receiving coefficients as columns are priced in.
        self.set_cons_modifiable(&cons, true);
        cons
    }

    fn set_coefficient(&mut self, row: &Self::Row, var: &Self::Variable, coeff: f64) {
        self.add_cons_coef(row, var, coeff);
    }

    fn set_upper_bound(&mut self, var: &Self::Variable, ub: f64) {
        // No safe API exposes changing a variable's global bound outside of
        // probing/diving in this russcip version; call the underlying SCIP
        // function directly through the public `scip_ptr`/`inner` handles.
        unsafe {
            russcip::ffi::SCIPchgVarUb(self.scip_ptr(), var.inner(), ub);
        }
    }
}

pub struct ScipSolved {
    model: Model<Solved>,
}

impl ModelReady for Model<ProblemCreated> {
    type SolvedModel = ScipSolved;

    fn set_time_limit(self, duration: std::time::Duration) -> Self {
        Model::set_time_limit(self, duration.as_secs_f64() as usize)
    }

    fn solve(self) -> ScipSolved {
        let model = self.solve();
        ScipSolved { model }
    }
}

impl ModelSolved for ScipSolved {
    type Model = Model<ProblemCreated>;

    fn has_solution(&self) -> bool {
        self.model.best_sol().is_some()
    }

    fn is_optimal(&self) -> bool {
        self.model.status() == russcip::Status::Optimal
    }

    fn objective_value(&self) -> f64 {
        self.model.obj_val()
    }

    fn variable_value(&self, var: &Variable) -> f64 {
        match self.model.best_sol() {
            Some(solution) => solution.val(var),
            None => 0.0,
        }
    }

    fn row_dual(&self, row: &Constraint) -> f64 {
        row.dual_sol().expect("row has no dual value")
    }

    fn reset(self) -> Model<ProblemCreated> {
        self.model.free_transform()
    }
}

impl LpSolver for ScipSolver {
    type Model = Model<ProblemCreated>;
    type SolvedModel = ScipSolved;

    fn create_model(name: &str, verbose: bool) -> Self::Model {
        let model = Model::new().include_default_plugins().create_prob(name);
        let model = if verbose {
            model.show_output()
        } else {
            model.hide_output()
        };
        model.set_obj_sense(russcip::ObjSense::Minimize)
    }
}
