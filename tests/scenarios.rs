use hyperflow::lp_model::scip::ScipSolver;
use hyperflow::{
    get_commodity_flow, get_flow, get_obj_val, get_path_to_flow_map, optimize,
    optimize_by_mip_solver, optimize_linear_relaxation, BranchParams, ColGenParams,
    ProblemBuilder, VarType,
};

const TOL: f64 = 1e-4;

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < TOL,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

/// v1 -> v4 over the two-route diamond; the cheap chain takes everything.
#[test]
fn simple_min_cost_flow() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..4).map(|_| builder.new_vertex()).collect();
    let a1 = builder.new_arc(v[0], v[1]).unwrap();
    let a2 = builder.new_arc(v[0], v[2]).unwrap();
    let a3 = builder.new_arc(v[1], v[2]).unwrap();
    let a4 = builder.new_arc(v[1], v[3]).unwrap();
    let a5 = builder.new_arc(v[2], v[3]).unwrap();
    for &(arc, cost) in &[(a1, 1.0), (a2, 1.0), (a3, 1.0), (a4, 1.0), (a5, 20.0)] {
        builder.set_cost(arc, cost);
    }
    let c1 = builder.new_commodity(v[0], v[3], 5.0, 5.0).unwrap();
    let problem = builder.get_problem();

    let solution = optimize::<ScipSolver>(
        &problem,
        &ColGenParams::default(),
        &BranchParams::default(),
    )
    .unwrap();

    assert_close(get_commodity_flow(&solution, c1, a1), 5.0, "flow(c1, a1)");
    assert_close(get_commodity_flow(&solution, c1, a4), 5.0, "flow(c1, a4)");
    assert_close(get_commodity_flow(&solution, c1, a2), 0.0, "flow(c1, a2)");
    assert_close(get_commodity_flow(&solution, c1, a3), 0.0, "flow(c1, a3)");
    assert_close(get_commodity_flow(&solution, c1, a5), 0.0, "flow(c1, a5)");
    assert_close(get_obj_val(&problem, &solution), 10.0, "objective");
}

/// A second commodity saturates the cheap arc, rerouting the first.
#[test]
fn capacity_forced_rerouting() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..4).map(|_| builder.new_vertex()).collect();
    let a1 = builder.new_arc(v[0], v[1]).unwrap();
    let a2 = builder.new_arc(v[0], v[2]).unwrap();
    let a3 = builder.new_arc(v[1], v[2]).unwrap();
    let a4 = builder.new_arc(v[1], v[3]).unwrap();
    let a5 = builder.new_arc(v[2], v[3]).unwrap();
    for &(arc, cost) in &[(a1, 1.0), (a2, 1.0), (a3, 1.0), (a4, 1.0), (a5, 20.0)] {
        builder.set_cost(arc, cost);
    }
    builder.set_capacity(a4, 9.5);
    let c1 = builder.new_commodity(v[0], v[3], 5.0, 5.0).unwrap();
    let c2 = builder.new_commodity(v[1], v[3], 8.0, 8.0).unwrap();
    let problem = builder.get_problem();

    let solution = optimize::<ScipSolver>(
        &problem,
        &ColGenParams::default(),
        &BranchParams::default(),
    )
    .unwrap();

    assert_close(get_commodity_flow(&solution, c1, a1), 1.5, "flow(c1, a1)");
    assert_close(get_commodity_flow(&solution, c1, a2), 3.5, "flow(c1, a2)");
    assert_close(get_commodity_flow(&solution, c1, a4), 1.5, "flow(c1, a4)");
    assert_close(get_commodity_flow(&solution, c1, a5), 3.5, "flow(c1, a5)");
    assert_close(get_commodity_flow(&solution, c2, a4), 8.0, "flow(c2, a4)");
}

/// Side constraint plus one integer arc force the branch-and-bound through
/// its exact leaf.
#[test]
fn side_constraint_with_integrality() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..4).map(|_| builder.new_vertex()).collect();
    let a1 = builder.new_arc(v[0], v[1]).unwrap();
    let a2 = builder.new_arc(v[0], v[2]).unwrap();
    let a3 = builder.new_arc(v[1], v[2]).unwrap();
    let a4 = builder.new_arc(v[1], v[3]).unwrap();
    let a5 = builder.new_arc(v[2], v[3]).unwrap();
    for &(arc, cost) in &[(a1, 1.0), (a2, 1.0), (a3, 1.0), (a4, 1.0), (a5, 20.0)] {
        builder.set_cost(arc, cost);
    }
    builder.set_capacity(a4, 9.5);
    builder.set_var_type(a4, VarType::Integer);
    builder.new_commodity(v[0], v[3], 5.0, 5.0).unwrap();
    builder.new_commodity(v[1], v[3], 8.0, 8.0).unwrap();
    let row = builder.new_constraint(6.0, f64::INFINITY).unwrap();
    builder.set_constraint_coefficient(row, a1, 1.0);
    builder.set_constraint_coefficient(row, a3, 1.0);
    let problem = builder.get_problem();

    let solution = optimize::<ScipSolver>(
        &problem,
        &ColGenParams::default(),
        &BranchParams::default(),
    )
    .unwrap();

    assert_close(get_flow(&solution, a1), 3.5, "flow(a1)");
    assert_close(get_flow(&solution, a2), 1.5, "flow(a2)");
    assert_close(get_flow(&solution, a3), 2.5, "flow(a3)");
    assert_close(get_flow(&solution, a4), 9.0, "flow(a4)");
    assert_close(get_flow(&solution, a5), 4.0, "flow(a5)");
}

/// Multipliers compound upstream: delivering 10 units needs fractional flow
/// high up the chain.
#[test]
fn generalized_flow_chain() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..5).map(|_| builder.new_vertex()).collect();
    let a0 = builder.new_arc((v[0], 1000.0), v[1]).unwrap();
    let a1 = builder.new_arc((v[1], 0.5), v[2]).unwrap();
    let a2 = builder.new_arc((v[2], 0.5), v[3]).unwrap();
    let a3 = builder.new_arc((v[3], 5.0), v[4]).unwrap();
    for &arc in &[a0, a1, a2, a3] {
        builder.set_cost(arc, 1.0);
    }
    builder.new_commodity(v[0], v[4], 10.0, 10.0).unwrap();
    let problem = builder.get_problem();

    let solution = optimize::<ScipSolver>(
        &problem,
        &ColGenParams::default(),
        &BranchParams::default(),
    )
    .unwrap();

    assert_close(get_flow(&solution, a0), 12.5, "flow(a0)");
    assert_close(get_flow(&solution, a1), 25.0, "flow(a1)");
    assert_close(get_flow(&solution, a2), 50.0, "flow(a2)");
    assert_close(get_flow(&solution, a3), 10.0, "flow(a3)");
}

/// Hyper-arcs consume at every tail jointly; pricing runs forward-only.
#[test]
fn hyper_arc_network() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..7).map(|_| builder.new_vertex()).collect();
    let a1 = builder.new_arc(v[0], v[1]).unwrap();
    let a2 = builder.new_arc(v[0], v[2]).unwrap();
    let a3 = builder.new_arc(v[1], v[2]).unwrap();
    let a4 = builder
        .new_arc(vec![(v[1], 1.0), (v[2], 1.0)], v[3])
        .unwrap();
    let a5 = builder.new_arc(v[2], v[4]).unwrap();
    let a6 = builder
        .new_arc(vec![(v[3], 1.0), (v[4], 2.0)], v[5])
        .unwrap();
    let a7 = builder.new_arc(v[5], v[6]).unwrap();
    for &arc in &[a1, a2, a4, a5, a6, a7] {
        builder.set_cost(arc, 1.0);
    }
    builder.set_cost(a3, 100.0);
    builder.new_commodity(v[0], v[6], 10.0, 10.0).unwrap();
    let problem = builder.get_problem();
    assert!(problem.network().is_hyper_graph());

    let solution = optimize::<ScipSolver>(
        &problem,
        &ColGenParams::default(),
        &BranchParams::default(),
    )
    .unwrap();

    assert_close(get_flow(&solution, a1), 10.0, "flow(a1)");
    assert_close(get_flow(&solution, a2), 30.0, "flow(a2)");
    assert_close(get_flow(&solution, a3), 0.0, "flow(a3)");
    assert_close(get_flow(&solution, a4), 10.0, "flow(a4)");
    assert_close(get_flow(&solution, a5), 20.0, "flow(a5)");
    assert_close(get_flow(&solution, a6), 10.0, "flow(a6)");
    assert_close(get_flow(&solution, a7), 10.0, "flow(a7)");
}

/// Bin packing through the arc-flow reduction: capacity 100 and the nine
/// weights below pack into exactly three bins.
#[test]
fn bin_packing_reduction() {
    let capacity: usize = 100;
    let weights: [usize; 9] = [4, 6, 7, 24, 26, 32, 64, 68, 69];

    let mut builder = ProblemBuilder::new();
    let levels: Vec<_> = (0..=capacity).map(|_| builder.new_vertex()).collect();

    let mut item_arcs = vec![];
    for &weight in &weights {
        let row = builder.new_constraint(1.0, 1.0).unwrap();
        let mut arcs = vec![];
        for level in 0..=(capacity - weight) {
            let arc = builder
                .new_arc(levels[level], levels[level + weight])
                .unwrap();
            builder.set_var_type(arc, VarType::Integer);
            if level == 0 {
                builder.set_cost(arc, 1.0);
            }
            builder.set_constraint_coefficient(row, arc, 1.0);
            arcs.push(arc);
        }
        item_arcs.push(arcs);
    }
    for level in 1..capacity {
        let arc = builder.new_arc(levels[level], levels[capacity]).unwrap();
        builder.set_var_type(arc, VarType::Integer);
    }
    let commodity = builder
        .new_commodity(levels[0], levels[capacity], 0.0, weights.len() as f64)
        .unwrap();
    let problem = builder.get_problem();

    let solution = optimize::<ScipSolver>(
        &problem,
        &ColGenParams::default(),
        &BranchParams::default(),
    )
    .unwrap();

    // Three bins, each item placed exactly once.
    assert_close(get_obj_val(&problem, &solution), 3.0, "bins used");
    for (item, arcs) in item_arcs.iter().enumerate() {
        let placed: f64 = arcs.iter().map(|&arc| get_flow(&solution, arc)).sum();
        assert_close(placed, 1.0, &format!("placements of item {}", item));
    }

    // The bins can be read back off the path decomposition.
    let paths = get_path_to_flow_map(&problem, &solution, commodity).unwrap();
    let total_bins: f64 = paths.flows().map(|(_, flow)| flow).sum();
    assert_close(total_bins, 3.0, "decomposed bins");
}

/// The direct MIP entry point reproduces the integer optimum on its own,
/// and a branching budget of zero routes the full solve through the same
/// exact leaf.
#[test]
fn direct_mip_solver_matches_known_optimum() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..4).map(|_| builder.new_vertex()).collect();
    let a1 = builder.new_arc(v[0], v[1]).unwrap();
    let a2 = builder.new_arc(v[0], v[2]).unwrap();
    let a3 = builder.new_arc(v[1], v[2]).unwrap();
    let a4 = builder.new_arc(v[1], v[3]).unwrap();
    let a5 = builder.new_arc(v[2], v[3]).unwrap();
    for &(arc, cost) in &[(a1, 1.0), (a2, 1.0), (a3, 1.0), (a4, 1.0), (a5, 20.0)] {
        builder.set_cost(arc, cost);
    }
    builder.set_capacity(a4, 9.5);
    builder.set_var_type(a4, VarType::Integer);
    builder.new_commodity(v[0], v[3], 5.0, 5.0).unwrap();
    builder.new_commodity(v[1], v[3], 8.0, 8.0).unwrap();
    let row = builder.new_constraint(6.0, f64::INFINITY).unwrap();
    builder.set_constraint_coefficient(row, a1, 1.0);
    builder.set_constraint_coefficient(row, a3, 1.0);
    let problem = builder.get_problem();

    let direct = optimize_by_mip_solver::<ScipSolver>(&problem, None).unwrap();
    assert_close(get_flow(&direct, a1), 3.5, "mip flow(a1)");
    assert_close(get_flow(&direct, a2), 1.5, "mip flow(a2)");
    assert_close(get_flow(&direct, a3), 2.5, "mip flow(a3)");
    assert_close(get_flow(&direct, a4), 9.0, "mip flow(a4)");
    assert_close(get_flow(&direct, a5), 4.0, "mip flow(a5)");
    assert_close(get_obj_val(&problem, &direct), 96.5, "mip objective");

    let zero_levels = BranchParams {
        max_num_branching_levels: 0,
        ..BranchParams::default()
    };
    let via_leaf = optimize::<ScipSolver>(&problem, &ColGenParams::default(), &zero_levels)
        .unwrap();
    assert_close(get_flow(&via_leaf, a4), 9.0, "leaf flow(a4)");
    assert_close(get_obj_val(&problem, &via_leaf), 96.5, "leaf objective");
}

/// Lagrangian bound validity and reduced-cost arc filtering on the diamond
/// with integer arcs: the expensive detour is provably fixable.
#[test]
fn dual_bound_and_reduced_cost_filtering() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..4).map(|_| builder.new_vertex()).collect();
    let a1 = builder.new_arc(v[0], v[1]).unwrap();
    let a2 = builder.new_arc(v[0], v[2]).unwrap();
    let a3 = builder.new_arc(v[1], v[2]).unwrap();
    let a4 = builder.new_arc(v[1], v[3]).unwrap();
    let a5 = builder.new_arc(v[2], v[3]).unwrap();
    for &(arc, cost) in &[(a1, 1.0), (a2, 1.0), (a3, 1.0), (a4, 1.0), (a5, 20.0)] {
        builder.set_cost(arc, cost);
        builder.set_var_type(arc, VarType::Integer);
    }
    builder.new_commodity(v[0], v[3], 5.0, 5.0).unwrap();
    let problem = builder.get_problem();

    let outcome = hyperflow::colgen::solve_relaxation::<ScipSolver>(
        &problem,
        &ColGenParams::default(),
        &[],
    )
    .unwrap();
    assert!(outcome.dual_bound <= outcome.objective + TOL);
    assert_close(outcome.dual_bound, 10.0, "dual bound");

    // With a cutoff of 15, any route through v2 is certified too expensive,
    // while the optimal chain survives.
    let filtered = hyperflow::filter_arcs_by_reduced_cost::<ScipSolver>(&problem, 15.0).unwrap();
    assert!(filtered.network().contains_arc(a1));
    assert!(filtered.network().contains_arc(a4));
    assert!(!filtered.network().contains_arc(a2));
    assert!(!filtered.network().contains_arc(a3));
    assert!(!filtered.network().contains_arc(a5));

    let solution = optimize::<ScipSolver>(
        &filtered,
        &ColGenParams::default(),
        &BranchParams::default(),
    )
    .unwrap();
    assert_close(get_obj_val(&filtered, &solution), 10.0, "filtered optimum");
}

/// The LP relaxation alone already solves the purely continuous instances.
#[test]
fn linear_relaxation_matches_on_continuous_instance() {
    let mut builder = ProblemBuilder::new();
    let v: Vec<_> = (0..3).map(|_| builder.new_vertex()).collect();
    let a0 = builder.new_arc(v[0], v[1]).unwrap();
    let a1 = builder.new_arc(v[1], v[2]).unwrap();
    builder.set_cost(a0, 2.0);
    builder.set_cost(a1, 3.0);
    builder.new_commodity(v[0], v[2], 4.0, 4.0).unwrap();
    let problem = builder.get_problem();

    let by_cg = optimize_linear_relaxation::<ScipSolver>(&problem, true).unwrap();
    let direct = optimize_linear_relaxation::<ScipSolver>(&problem, false).unwrap();

    assert_close(get_flow(&by_cg, a0), 4.0, "cg flow(a0)");
    assert_close(get_flow(&by_cg, a1), 4.0, "cg flow(a1)");
    assert_close(
        get_obj_val(&problem, &by_cg),
        get_obj_val(&problem, &direct),
        "cg vs direct objective",
    );
}
