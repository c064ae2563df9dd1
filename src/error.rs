pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("arc {arc} has an empty tail list")]
    EmptyTails { arc: usize },

    #[error("arc {arc} has non-positive multiplier {multiplier} at tail vertex {tail}")]
    NonPositiveMultiplier {
        arc: usize,
        tail: usize,
        multiplier: f64,
    },

    #[error("commodity {commodity} has invalid demand/capacity pair ({demand}, {capacity})")]
    InvalidCommodityBounds {
        commodity: usize,
        demand: f64,
        capacity: f64,
    },

    #[error("constraint {constraint} has invalid bounds ({lb}, {ub})")]
    InvalidConstraintBounds { constraint: usize, lb: f64, ub: f64 },

    #[error("arc {arc} does not continue the path: its tail is {tail} but the previous head is {expected}")]
    BrokenArcChain {
        arc: usize,
        tail: usize,
        expected: usize,
    },

    #[error("arc sequence contains hyper-arc {arc}, paths are built from simple arcs")]
    HyperArcInPath { arc: usize },

    #[error("hyper-tree is unbalanced: vertex {vertex} has balance {balance}, expected {expected}")]
    UnbalancedHyperTree {
        vertex: usize,
        balance: f64,
        expected: f64,
    },

    #[error("cycle detected through vertex {vertex}, the network must be acyclic")]
    CyclicNetwork { vertex: usize },

    #[error("{operation} is not available on hyper-graphs")]
    HyperGraphUnsupported { operation: &'static str },

    #[error("label walk revisited vertex {vertex}, shortest-path labels are inconsistent")]
    LabelWalkCycle { vertex: usize },

    #[error("no source-to-sink unit flow routes through arc {arc}")]
    UnreachableArc { arc: usize },

    #[error("vertex {vertex} carries no label")]
    UnreachableVertex { vertex: usize },

    #[error("problem has no commodities")]
    NoCommodities,

    #[error("dual values are only defined for the linear relaxation")]
    DualsUnavailable,

    #[error("solution carries no flows for commodity {commodity}")]
    UnknownCommodity { commodity: usize },

    #[error("LP engine failed: {message}")]
    Solver { message: String },
}
