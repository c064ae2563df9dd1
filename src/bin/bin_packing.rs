use hyperflow::lp_model::scip::ScipSolver;
use hyperflow::{
    get_path_to_flow_map, optimize, BranchParams, ColGenParams, ProblemBuilder, VarType,
};
use log::LevelFilter;
use structopt::StructOpt;

/// Solves bin packing through the arc-flow reduction: one vertex per fill
/// level, an integer arc per (item weight, level), an item-demand row per
/// distinct weight, and a single source-to-sink commodity whose first-level
/// arcs carry cost 1 (one unit of cost per opened bin).
#[derive(StructOpt)]
struct Args {
    /// Bin capacity.
    capacity: u64,
    /// Item weights.
    weights: Vec<u64>,

    #[structopt(short, long)]
    verbose: bool,
}

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Relays the library's per-iteration and per-branch-level progress lines
/// to stderr, keeping stdout for the packing itself.
struct ProgressLogger {
    level: LevelFilter,
}

impl log::Log for ProgressLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level().as_str().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {}
}

fn main() {
    let args = Args::from_args();

    let level = if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    log::set_boxed_logger(Box::new(ProgressLogger { level })).unwrap();
    log::set_max_level(level);

    let capacity = args.capacity;
    let mut weights = args.weights.clone();
    weights.sort_unstable_by(|a, b| b.cmp(a));
    weights.retain(|&w| {
        if w == 0 || w > capacity {
            eprintln!("dropping weight {} outside (0, {}]", w, capacity);
            false
        } else {
            true
        }
    });

    let mut builder = ProblemBuilder::new();
    let levels: Vec<_> = (0..=capacity).map(|_| builder.new_vertex()).collect();

    // Demand row per distinct weight: exactly as many placements as items.
    let mut distinct: Vec<(u64, usize)> = vec![];
    for &w in &weights {
        match distinct.last_mut() {
            Some((weight, count)) if *weight == w => *count += 1,
            _ => distinct.push((w, 1)),
        }
    }

    let mut item_arc_weight = std::collections::HashMap::new();
    for &(weight, count) in &distinct {
        let row = builder.new_constraint(count as f64, count as f64).unwrap();
        for level in 0..=(capacity - weight) {
            let arc = builder
                .new_arc(levels[level as usize], levels[(level + weight) as usize])
                .unwrap();
            builder.set_var_type(arc, VarType::Integer);
            if level == 0 {
                builder.set_cost(arc, 1.0);
            }
            builder.set_constraint_coefficient(row, arc, 1.0);
            item_arc_weight.insert(arc, weight);
        }
    }

    // Loss arcs close every partially filled bin.
    for level in 1..capacity {
        let arc = builder
            .new_arc(levels[level as usize], levels[capacity as usize])
            .unwrap();
        builder.set_var_type(arc, VarType::Integer);
    }

    let num_items = weights.len();
    let commodity = builder
        .new_commodity(levels[0], levels[capacity as usize], 0.0, num_items as f64)
        .unwrap();
    let problem = builder.get_problem();

    log::info!(
        "bin packing: capacity {} items {} distinct weights {}",
        capacity,
        num_items,
        distinct.len()
    );

    let cg_params = ColGenParams {
        verbose: args.verbose,
        ..ColGenParams::default()
    };
    let branch_params = BranchParams::default();

    let solution = optimize::<ScipSolver>(&problem, &cg_params, &branch_params)
        .expect("bin packing solve failed");

    let paths = get_path_to_flow_map(&problem, &solution, commodity)
        .expect("path decomposition failed");

    let mut bins = 0;
    for (path, flow) in paths.flows() {
        let count = flow.round() as u64;
        if count == 0 {
            continue;
        }
        let items: Vec<u64> = path
            .arcs()
            .iter()
            .filter_map(|arc| item_arc_weight.get(arc).copied())
            .collect();
        for _ in 0..count {
            bins += 1;
            println!("bin {}: {:?}", bins, items);
        }
    }
    println!("total bins: {}", bins);
}
