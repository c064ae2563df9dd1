use std::time::Duration;

use crate::branching::{self, BranchParams};
use crate::colgen::{self, ColGenParams};
use crate::collections::Indexed;
use crate::error::{Error, Result};
use crate::graph::Arc;
use crate::lp_model::LpSolver;
use crate::problem::{Commodity, Problem};
use crate::rmp::{Column, MasterModel};
use crate::solution::{PathFlowSolution, PrimalSolution};

/// Full branch-and-bound solve.
pub fn optimize<Solver: LpSolver>(
    problem: &Problem,
    cg_params: &ColGenParams,
    branch_params: &BranchParams,
) -> Result<PrimalSolution> {
    branching::optimize::<Solver>(problem, cg_params, branch_params, &[])
}

/// Like [`optimize`], warm-started from previously priced columns.
pub fn optimize_with_initial_columns<Solver: LpSolver>(
    problem: &Problem,
    cg_params: &ColGenParams,
    branch_params: &BranchParams,
    initial_columns: &[Column],
) -> Result<PrimalSolution> {
    branching::optimize::<Solver>(problem, cg_params, branch_params, initial_columns)
}

/// Direct arc-flow MIP without column generation or branching.
pub fn optimize_by_mip_solver<Solver: LpSolver>(
    problem: &Problem,
    time_limit: Option<Duration>,
) -> Result<PrimalSolution> {
    let mut master = MasterModel::<Solver>::new(problem, false, 6, 6, false);
    for (commodity, _) in problem.commodities() {
        for &arc in problem.network().arcs() {
            master.add_column(problem, Column::from_arc(problem, commodity, arc)?);
        }
    }
    master.solve(time_limit);
    if !master.has_solution() {
        return Err(Error::Solver {
            message: "exact solve produced no incumbent".to_string(),
        });
    }
    Ok(master.primal(problem))
}

/// LP relaxation, either through the column-generation loop or by loading
/// every arc column upfront.
pub fn optimize_linear_relaxation<Solver: LpSolver>(
    problem: &Problem,
    use_column_generation: bool,
) -> Result<PrimalSolution> {
    if use_column_generation {
        let outcome = colgen::solve_relaxation::<Solver>(problem, &ColGenParams::default(), &[])?;
        return Ok(outcome.primal);
    }
    let mut master = MasterModel::<Solver>::new(problem, true, 6, 6, false);
    for (commodity, _) in problem.commodities() {
        for &arc in problem.network().arcs() {
            master.add_column(problem, Column::from_arc(problem, commodity, arc)?);
        }
    }
    master.solve(None);
    Ok(master.primal(problem))
}

/// Removes every arc whose reduced-cost certificate exceeds `cutoff`. No
/// solution strictly better than the cutoff is lost.
pub fn filter_arcs_by_reduced_cost<Solver: LpSolver>(
    problem: &Problem,
    cutoff: f64,
) -> Result<Problem> {
    let outcome = colgen::solve_relaxation::<Solver>(problem, &ColGenParams::default(), &[])?;
    Ok(problem.filter_arcs(|arc| {
        outcome
            .min_obj
            .get(&arc)
            .copied()
            .unwrap_or(outcome.dual_bound)
            <= cutoff
    }))
}

/// Aggregated flow on `arc` over all commodities.
pub fn get_flow(solution: &PrimalSolution, arc: Arc) -> f64 {
    solution.flow(arc)
}

/// Flow of one commodity on `arc`.
pub fn get_commodity_flow(solution: &PrimalSolution, commodity: Commodity, arc: Arc) -> f64 {
    solution.commodity_flow(commodity, arc)
}

pub fn get_obj_val(problem: &Problem, solution: &PrimalSolution) -> f64 {
    solution.penalized_objective(problem)
}

/// Path decomposition of one commodity's arc flows.
pub fn get_path_to_flow_map(
    problem: &Problem,
    solution: &PrimalSolution,
    commodity: Commodity,
) -> Result<PathFlowSolution> {
    let arc_flow = solution
        .commodity_solution(commodity)
        .ok_or(Error::UnknownCommodity {
            commodity: commodity.index(),
        })?;
    arc_flow.decompose(problem)
}
