use std::time::Duration;

use log::info;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::colgen::{self, ColGenParams};
use crate::collections::Indexed;
use crate::error::{Error, Result};
use crate::graph::Arc;
use crate::lp_model::LpSolver;
use crate::problem::{ConstraintSense, Problem, SideConstraint};
use crate::rmp::Column;
use crate::solution::PrimalSolution;

/// Classifier assigning each arc to a branching family.
pub type ArcToFamily = Box<dyn Fn(&Problem, Arc) -> usize>;

pub struct BranchParams {
    /// Flow below this is treated as zero, both for the integrality test
    /// and for selecting unused families.
    pub feas_tol: f64,
    /// Solutions at or above this objective are not searched for.
    pub obj_cutoff: f64,
    /// Penalty on the artificial of the right-branch covering row.
    pub right_branch_penalty: f64,
    pub max_num_branching_levels: u32,
    pub mip_time_limit: Option<Duration>,
    /// Defaults to grouping arcs by head vertex.
    pub arc_to_family: Option<ArcToFamily>,
}

impl Default for BranchParams {
    fn default() -> Self {
        BranchParams {
            feas_tol: 1e-5,
            obj_cutoff: f64::INFINITY,
            right_branch_penalty: 1e3,
            max_num_branching_levels: 3,
            mip_time_limit: None,
            arc_to_family: None,
        }
    }
}

fn family_of(params: &BranchParams, problem: &Problem, arc: Arc) -> usize {
    match &params.arc_to_family {
        Some(classifier) => classifier(problem, arc),
        None => problem.pool().def(arc).head().index(),
    }
}

/// Full solve: LP relaxation by column generation, reduced-cost variable
/// fixing, then unbalanced branching on arc families with the exact solver
/// at the leaves.
pub fn optimize<Solver: LpSolver>(
    problem: &Problem,
    cg_params: &ColGenParams,
    params: &BranchParams,
    initial_columns: &[Column],
) -> Result<PrimalSolution> {
    if problem.num_commodities() == 0 {
        return Err(Error::NoCommodities);
    }
    if problem.network().arcs().is_empty() {
        return Ok(PrimalSolution::default());
    }
    let (solution, _) = branch_node::<Solver>(
        problem,
        cg_params,
        params,
        params.obj_cutoff,
        params.max_num_branching_levels,
        initial_columns,
        0,
    )?;
    Ok(solution)
}

fn branch_node<Solver: LpSolver>(
    problem: &Problem,
    cg_params: &ColGenParams,
    params: &BranchParams,
    obj_cutoff: f64,
    levels: u32,
    initial_columns: &[Column],
    depth: u32,
) -> Result<(PrimalSolution, f64)> {
    let outcome = colgen::solve_relaxation::<Solver>(problem, cg_params, initial_columns)?;

    // Reduced-cost variable fixing: an arc whose certificate exceeds the
    // cutoff cannot appear in any solution beating the cutoff.
    let filtered = problem.filter_arcs(|arc| {
        outcome
            .min_obj
            .get(&arc)
            .copied()
            .unwrap_or(outcome.dual_bound)
            <= obj_cutoff
    });

    if filtered.network().arcs().is_empty() {
        info!("branch depth {}: all arcs fixed out by cutoff {:.6}", depth, obj_cutoff);
        return Ok((PrimalSolution::default(), f64::INFINITY));
    }

    if outcome.primal.is_integral(&filtered, params.feas_tol) {
        let objective = outcome.primal.penalized_objective(&filtered);
        info!(
            "branch depth {}: relaxation integral at {:.6}",
            depth, objective
        );
        return Ok((outcome.primal, objective));
    }

    if levels == 0 {
        let solution = solve_exact::<Solver>(&filtered, params)?;
        let objective = solution.penalized_objective(&filtered);
        info!("branch depth {}: exact leaf at {:.6}", depth, objective);
        return Ok((solution, objective));
    }

    // Families with no flow at the fractional optimum form the branching
    // set: the left branch forbids them, the right branch forces at least
    // one unit through them.
    let mut family_flow: FxHashMap<usize, f64> = FxHashMap::default();
    for &arc in filtered.network().arcs() {
        *family_flow
            .entry(family_of(params, &filtered, arc))
            .or_insert(0.0) += outcome.primal.flow(arc);
    }
    let branching_set: FxHashSet<Arc> = filtered
        .network()
        .arcs()
        .iter()
        .copied()
        .filter(|&arc| family_flow[&family_of(params, &filtered, arc)] < params.feas_tol)
        .collect();

    if branching_set.is_empty() {
        let solution = solve_exact::<Solver>(&filtered, params)?;
        let objective = solution.penalized_objective(&filtered);
        info!(
            "branch depth {}: no unused family, exact solve at {:.6}",
            depth, objective
        );
        return Ok((solution, objective));
    }

    // Left branch: drop the branching set and solve exactly.
    let left_problem = filtered.filter_arcs(|arc| !branching_set.contains(&arc));
    let (left_solution, left_objective) = if left_problem.network().arcs().is_empty() {
        (PrimalSolution::default(), f64::INFINITY)
    } else {
        let solution = solve_exact::<Solver>(&left_problem, params)?;
        let objective = solution.penalized_objective(&left_problem);
        (solution, objective)
    };

    let cutoff = obj_cutoff.min(if filtered.has_integral_objective() {
        left_objective - 1.0
    } else {
        left_objective
    });

    // Right branch: force a unit through the branching set and recurse.
    let mut right_problem = filtered.clone();
    let num_constraints_before = right_problem.num_constraints();
    right_problem.push_constraint(SideConstraint {
        coefficients: branching_set.iter().map(|&arc| (arc, 1.0)).collect(),
        sense: ConstraintSense::Ge,
        rhs: 1.0,
        violation_penalty: params.right_branch_penalty,
    });
    let (right_solution, right_objective) = branch_node::<Solver>(
        &right_problem,
        cg_params,
        params,
        cutoff,
        levels - 1,
        &outcome.columns,
        depth + 1,
    )?;
    right_problem.pop_constraint();
    debug_assert_eq!(right_problem.num_constraints(), num_constraints_before);

    info!(
        "branch depth {}: set of {} arcs, left {:.6} right {:.6}",
        depth,
        branching_set.len(),
        left_objective,
        right_objective,
    );

    if left_objective <= right_objective {
        Ok((left_solution, left_objective))
    } else {
        Ok((right_solution, right_objective))
    }
}

/// Direct arc-flow MIP over the problem's current network and constraint
/// stack. A time-limited solve that found an incumbent is accepted.
pub fn solve_exact<Solver: LpSolver>(
    problem: &Problem,
    params: &BranchParams,
) -> Result<PrimalSolution> {
    crate::solver::optimize_by_mip_solver::<Solver>(problem, params.mip_time_limit)
}
