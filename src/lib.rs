//! Multi-commodity generalized hyper-graph flow optimization: column
//! generation over a penalised restricted master, reduced-cost variable
//! fixing, and unbalanced branching, with the LP/MIP engine behind a narrow
//! trait boundary.

pub mod branching;
pub mod colgen;
pub mod collections;
pub mod error;
pub mod graph;
pub mod lp_model;
pub mod network;
pub mod pricing;
pub mod problem;
pub mod rmp;
pub mod shortest_path;
pub mod solution;
pub mod solver;

pub use branching::BranchParams;
pub use colgen::ColGenParams;
pub use error::{Error, Result};
pub use graph::{Arc, HyperTree, Path, Vertex};
pub use problem::{Commodity, Problem, ProblemBuilder, VarType};
pub use rmp::{BasisKind, Column};
pub use solution::{ArcFlowSolution, DualSolution, PathFlowSolution, PrimalSolution};
pub use solver::{
    filter_arcs_by_reduced_cost, get_commodity_flow, get_flow, get_obj_val,
    get_path_to_flow_map, optimize, optimize_by_mip_solver, optimize_linear_relaxation,
    optimize_with_initial_columns,
};
