use log::info;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::graph::Arc;
use crate::lp_model::LpSolver;
use crate::pricing::{Pricer, PricingKind, PricingOutcome};
use crate::problem::Problem;
use crate::rmp::{BasisKind, Column, MasterModel};
use crate::solution::{DualSolution, PrimalSolution};

#[derive(Debug)]
pub struct ColGenParams {
    pub basis: BasisKind,
    pub pricing: PricingKind,
    /// Columns are only kept when their reduced cost is below this (small
    /// negative) tolerance; pricing above it terminates the loop.
    pub min_rc_to_stop: f64,
    /// Columns at value zero for more than this many consecutive iterations
    /// are deleted. Defaults to "never".
    pub num_zero_flow_iter_delete_column: usize,
    pub max_iterations: usize,
    pub primal_precision: u32,
    pub dual_precision: u32,
    pub verbose: bool,
}

impl Default for ColGenParams {
    fn default() -> Self {
        ColGenParams {
            basis: BasisKind::ArcFlow,
            pricing: PricingKind::MultiPath,
            min_rc_to_stop: -1e-6,
            num_zero_flow_iter_delete_column: usize::MAX,
            max_iterations: 10_000,
            primal_precision: 6,
            dual_precision: 6,
            verbose: false,
        }
    }
}

pub struct ColGenOutcome {
    pub primal: PrimalSolution,
    pub duals: DualSolution,
    /// Objective of the final restricted master LP, penalties included.
    pub objective: f64,
    /// Lagrangian lower bound from the last pricing round.
    pub dual_bound: f64,
    /// Per-arc objective certificates for reduced-cost variable fixing.
    pub min_obj: FxHashMap<Arc, f64>,
    /// Active master columns, reusable as a warm start deeper in the tree.
    pub columns: Vec<Column>,
}

/// Solves the LP relaxation by column generation: solve the restricted
/// master, extract duals, price, extend, repeat until pricing runs dry.
pub fn solve_relaxation<Solver: LpSolver>(
    problem: &Problem,
    params: &ColGenParams,
    initial_columns: &[Column],
) -> Result<ColGenOutcome> {
    let mut master = MasterModel::<Solver>::new(
        problem,
        true,
        params.primal_precision,
        params.dual_precision,
        params.verbose,
    );
    for column in initial_columns {
        master.add_column(problem, column.clone());
    }
    let mut pricer = Pricer::new(problem)?;

    let mut iteration = 0;
    let last: PricingOutcome = loop {
        iteration += 1;
        master.solve(None);
        let duals = master.duals(problem)?;
        let outcome = pricer.price(
            problem,
            &duals,
            params.basis,
            params.pricing,
            params.min_rc_to_stop,
        )?;

        info!(
            "cg iter {}: obj {:.6} dual bound {:.6} min rc {:.6} priced {}",
            iteration,
            master.objective_value(),
            outcome.dual_bound,
            outcome.min_reduced_cost,
            outcome.columns.len(),
        );

        if outcome.columns.is_empty() || iteration >= params.max_iterations {
            break outcome;
        }

        master.apply_retention(params.num_zero_flow_iter_delete_column);

        let mut added = 0;
        for column in &outcome.columns {
            if master.add_column(problem, column.clone()) {
                added += 1;
            }
        }
        if added == 0 {
            // Everything priced is already in the master: done.
            break outcome;
        }
    };

    // The master may have been edited (retention, duplicate-only round)
    // after its last solve; bring it back to a solved state for extraction.
    if !master.is_solved() {
        master.solve(None);
    }

    Ok(ColGenOutcome {
        primal: master.primal(problem),
        duals: master.duals(problem)?,
        objective: master.objective_value(),
        dual_bound: last.dual_bound,
        min_obj: last.min_obj,
        columns: master.active_columns(),
    })
}
