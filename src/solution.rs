use rustc_hash::FxHashMap;

use crate::collections::Indexed;
use crate::error::{Error, Result};
use crate::graph::{Arc, Path, Vertex};
use crate::problem::{Commodity, ConstraintSense, Problem, VarType};

const FLOW_TOL: f64 = 1e-9;

/// Per-commodity flow expressed on arcs.
#[derive(Clone, Debug)]
pub struct ArcFlowSolution {
    pub commodity: Commodity,
    pub source: Vertex,
    pub sink: Vertex,
    flows: FxHashMap<Arc, f64>,
}

impl ArcFlowSolution {
    pub fn new(commodity: Commodity, source: Vertex, sink: Vertex) -> Self {
        ArcFlowSolution {
            commodity,
            source,
            sink,
            flows: FxHashMap::default(),
        }
    }

    pub fn flow(&self, arc: Arc) -> f64 {
        self.flows.get(&arc).copied().unwrap_or(0.0)
    }

    pub fn add_flow(&mut self, arc: Arc, amount: f64) {
        *self.flows.entry(arc).or_insert(0.0) += amount;
    }

    pub fn set_flow(&mut self, arc: Arc, amount: f64) {
        self.flows.insert(arc, amount);
    }

    pub fn flows(&self) -> impl Iterator<Item = (Arc, f64)> + '_ {
        self.flows.iter().map(|(&arc, &flow)| (arc, flow))
    }

    pub fn objective(&self, problem: &Problem) -> f64 {
        self.flows
            .iter()
            .map(|(&arc, &flow)| problem.cost(arc) * flow)
            .sum()
    }

    /// Net inflow at `vertex`: arriving flow minus multiplier-weighted
    /// departing flow.
    pub fn balance(&self, problem: &Problem, vertex: Vertex) -> f64 {
        let pool = problem.pool();
        let mut balance = 0.0;
        for (&arc, &flow) in &self.flows {
            let def = pool.def(arc);
            if def.head() == vertex {
                balance += flow;
            }
            for &(tail, multiplier) in def.tails() {
                if tail == vertex {
                    balance -= multiplier * flow;
                }
            }
        }
        balance
    }

    /// Flow conservation at every vertex except the commodity endpoints.
    pub fn is_conserving(&self, problem: &Problem, tolerance: f64) -> bool {
        problem
            .network()
            .vertices()
            .iter()
            .filter(|&&v| v != self.source && v != self.sink)
            .all(|&v| self.balance(problem, v).abs() <= tolerance)
    }

    /// Units delivered at the sink.
    pub fn delivered(&self, problem: &Problem) -> f64 {
        self.balance(problem, self.sink)
    }

    /// Decomposes the arc flows into sink-delivering paths. Each iteration
    /// walks a positive-flow chain from source to sink and peels off the
    /// largest flow the chain supports under the arc multipliers.
    pub fn decompose(&self, problem: &Problem) -> Result<PathFlowSolution> {
        if problem.network().is_hyper_graph() {
            return Err(Error::HyperGraphUnsupported {
                operation: "flow decomposition",
            });
        }
        let (source, sink) = (self.source, self.sink);

        let pool = problem.pool();
        let mut residual = self.flows.clone();
        residual.retain(|_, flow| *flow > FLOW_TOL);
        let mut paths: FxHashMap<Path, f64> = FxHashMap::default();

        loop {
            // Walk forward along positive-flow arcs.
            let mut cursor = source;
            let mut chain = vec![];
            while cursor != sink {
                let next = problem
                    .network()
                    .outgoing(cursor)
                    .find(|arc| residual.get(arc).copied().unwrap_or(0.0) > FLOW_TOL);
                let Some(arc) = next else { break };
                chain.push(arc);
                cursor = pool.def(arc).head();
                if chain.len() > problem.network().num_arcs() {
                    return Err(Error::LabelWalkCycle {
                        vertex: cursor.index(),
                    });
                }
            }
            if cursor != sink || chain.is_empty() {
                break;
            }

            let path = Path::from_arcs(pool, chain)?;
            let bottleneck = path
                .tree()
                .arcs()
                .iter()
                .map(|&(arc, multiplicity)| residual[&arc] / multiplicity)
                .fold(f64::INFINITY, f64::min);

            for &(arc, multiplicity) in path.tree().arcs() {
                let remaining = residual.get_mut(&arc).unwrap();
                *remaining -= bottleneck * multiplicity;
                if *remaining <= FLOW_TOL {
                    residual.remove(&arc);
                }
            }
            *paths.entry(path).or_insert(0.0) += bottleneck;
        }

        Ok(PathFlowSolution {
            source,
            sink,
            flows: paths,
        })
    }
}

/// Flow expressed on paths.
#[derive(Clone, Debug)]
pub struct PathFlowSolution {
    pub source: Vertex,
    pub sink: Vertex,
    flows: FxHashMap<Path, f64>,
}

impl PathFlowSolution {
    pub fn flows(&self) -> impl Iterator<Item = (&Path, f64)> + '_ {
        self.flows.iter().map(|(path, &flow)| (path, flow))
    }

    pub fn objective(&self, problem: &Problem) -> f64 {
        self.flows
            .iter()
            .map(|(path, &flow)| {
                flow * path
                    .tree()
                    .cost(problem.pool(), &|arc| problem.cost(arc), &|_| 0.0)
            })
            .sum()
    }

    /// Aggregated flow on `arc` over all paths.
    pub fn arc_flow(&self, arc: Arc) -> f64 {
        self.flows
            .iter()
            .map(|(path, &flow)| flow * path.tree().multiplicity(arc))
            .sum()
    }
}

/// One arc-flow solution per commodity.
#[derive(Clone, Debug, Default)]
pub struct PrimalSolution {
    solutions: FxHashMap<Commodity, ArcFlowSolution>,
}

impl PrimalSolution {
    pub fn insert(&mut self, commodity: Commodity, solution: ArcFlowSolution) {
        self.solutions.insert(commodity, solution);
    }

    pub fn commodity_solution(&self, commodity: Commodity) -> Option<&ArcFlowSolution> {
        self.solutions.get(&commodity)
    }

    pub fn solutions(&self) -> impl Iterator<Item = (Commodity, &ArcFlowSolution)> {
        self.solutions.iter().map(|(&c, s)| (c, s))
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    /// Flow of one commodity on one arc.
    pub fn commodity_flow(&self, commodity: Commodity, arc: Arc) -> f64 {
        self.solutions
            .get(&commodity)
            .map(|s| s.flow(arc))
            .unwrap_or(0.0)
    }

    /// Aggregated flow on `arc` over all commodities.
    pub fn flow(&self, arc: Arc) -> f64 {
        self.solutions.values().map(|s| s.flow(arc)).sum()
    }

    pub fn objective(&self, problem: &Problem) -> f64 {
        self.solutions.values().map(|s| s.objective(problem)).sum()
    }

    /// Objective plus violation penalties for unmet demand, exceeded
    /// capacities and violated side constraints.
    pub fn penalized_objective(&self, problem: &Problem) -> f64 {
        let mut objective = self.objective(problem);

        for (commodity, def) in problem.commodities() {
            let delivered = self
                .solutions
                .get(&commodity)
                .map(|s| s.delivered(problem))
                .unwrap_or(0.0);
            objective += (def.demand - delivered).max(0.0) * def.violation_penalty;
            objective += (delivered - def.capacity).max(0.0) * def.violation_penalty;
        }

        for (_, constraint) in problem.constraints() {
            let activity: f64 = constraint
                .coefficients
                .iter()
                .map(|&(arc, coeff)| coeff * self.flow(arc))
                .sum();
            let violation = match constraint.sense {
                ConstraintSense::Ge => (constraint.rhs - activity).max(0.0),
                ConstraintSense::Le => (activity - constraint.rhs).max(0.0),
                ConstraintSense::Eq => (activity - constraint.rhs).abs(),
            };
            objective += violation * constraint.violation_penalty;
        }

        objective
    }

    /// Integer feasibility with respect to the arc variable domains: every
    /// commodity's flow on an integer arc must sit on the grid.
    pub fn is_integral(&self, problem: &Problem, tolerance: f64) -> bool {
        self.solutions.values().all(|solution| {
            solution.flows().all(|(arc, flow)| {
                problem.var_type(arc) == VarType::Continuous
                    || (flow - flow.round()).abs() <= tolerance
            })
        })
    }
}

/// Row duals of the restricted master problem, keyed by the objects the rows
/// were created for.
#[derive(Clone, Debug, Default)]
pub struct DualSolution {
    pub demand: FxHashMap<Commodity, f64>,
    pub capacity: FxHashMap<Commodity, f64>,
    pub side: FxHashMap<usize, f64>,
    pub arc_capacity: FxHashMap<Arc, f64>,
}

impl DualSolution {
    pub fn demand_dual(&self, commodity: Commodity) -> f64 {
        self.demand.get(&commodity).copied().unwrap_or(0.0)
    }

    pub fn capacity_dual(&self, commodity: Commodity) -> f64 {
        self.capacity.get(&commodity).copied().unwrap_or(0.0)
    }

    pub fn side_dual(&self, constraint: usize) -> f64 {
        self.side.get(&constraint).copied().unwrap_or(0.0)
    }

    pub fn arc_capacity_dual(&self, arc: Arc) -> f64 {
        self.arc_capacity.get(&arc).copied().unwrap_or(0.0)
    }

    /// Dual objective restricted to the non-commodity rows; the Lagrangian
    /// bound adds the commodity terms from the pricing values.
    pub fn objective_excluding_commodities(&self, problem: &Problem) -> f64 {
        let side: f64 = self
            .side
            .iter()
            .map(|(&idx, &dual)| dual * problem.constraint(idx).rhs)
            .sum();
        let arcs: f64 = self
            .arc_capacity
            .iter()
            .map(|(&arc, &dual)| dual * problem.capacity(arc))
            .sum();
        side + arcs
    }
}

/// Rounds to a fixed number of decimals; duals and primal values coming out
/// of the engine are snapped to this grid for stability.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemBuilder;

    fn chain_problem() -> (Problem, Commodity, Vec<Arc>, Vec<Vertex>) {
        // v0 -> v1 -> v2 plus a parallel v0 -> v2 arc.
        let mut builder = ProblemBuilder::new();
        let v0 = builder.new_vertex();
        let v1 = builder.new_vertex();
        let v2 = builder.new_vertex();
        let a0 = builder.new_arc((v0, 2.0), v1).unwrap();
        let a1 = builder.new_arc((v1, 0.5), v2).unwrap();
        let a2 = builder.new_arc(v0, v2).unwrap();
        builder.set_cost(a0, 1.0);
        builder.set_cost(a1, 1.0);
        builder.set_cost(a2, 4.0);
        let commodity = builder.new_commodity(v0, v2, 3.0, 3.0).unwrap();
        (builder.get_problem(), commodity, vec![a0, a1, a2], vec![v0, v1, v2])
    }

    #[test]
    fn conservation_accounts_for_multipliers() {
        let (problem, commodity, arcs, vertices) = chain_problem();
        let mut sol = ArcFlowSolution::new(commodity, vertices[0], vertices[2]);
        // 2 units at the sink via the chain: a1 carries 2, a0 carries 1.
        sol.set_flow(arcs[1], 2.0);
        sol.set_flow(arcs[0], 1.0);
        sol.set_flow(arcs[2], 1.0);

        assert!(sol.is_conserving(&problem, 1e-9));
        assert_eq!(sol.delivered(&problem), 3.0);
        assert_eq!(sol.objective(&problem), 1.0 + 2.0 + 4.0);

        // Disturb the intermediate vertex.
        sol.set_flow(arcs[0], 2.0);
        assert!(!sol.is_conserving(&problem, 1e-9));
    }

    #[test]
    fn decomposition_preserves_objective_and_arc_flows() {
        let (problem, commodity, arcs, vertices) = chain_problem();
        let mut sol = ArcFlowSolution::new(commodity, vertices[0], vertices[2]);
        sol.set_flow(arcs[1], 2.0);
        sol.set_flow(arcs[0], 1.0);
        sol.set_flow(arcs[2], 1.0);

        let paths = sol.decompose(&problem).unwrap();
        assert_eq!(paths.flows().count(), 2);
        assert!((paths.objective(&problem) - sol.objective(&problem)).abs() < 1e-9);
        for &arc in &arcs {
            assert!((paths.arc_flow(arc) - sol.flow(arc)).abs() < 1e-9);
        }
    }

    #[test]
    fn penalized_objective_prices_demand_shortfall() {
        let (problem, commodity, _, vertices) = chain_problem();
        let mut primal = PrimalSolution::default();
        primal.insert(
            commodity,
            ArcFlowSolution::new(commodity, vertices[0], vertices[2]),
        );
        // Nothing delivered against a demand of 3 at the default penalty.
        assert_eq!(primal.objective(&problem), 0.0);
        assert_eq!(primal.penalized_objective(&problem), 3.0 * 1e3);
    }

    #[test]
    fn integrality_check_follows_var_types() {
        let mut builder = ProblemBuilder::new();
        let v0 = builder.new_vertex();
        let v1 = builder.new_vertex();
        let a0 = builder.new_arc(v0, v1).unwrap();
        let commodity = builder.new_commodity(v0, v1, 1.0, 2.0).unwrap();
        builder.set_var_type(a0, VarType::Integer);
        let problem = builder.get_problem();

        let mut sol = ArcFlowSolution::new(commodity, v0, v1);
        sol.set_flow(a0, 1.5);
        let mut primal = PrimalSolution::default();
        primal.insert(commodity, sol.clone());
        assert!(!primal.is_integral(&problem, 1e-6));

        sol.set_flow(a0, 2.0 - 1e-9);
        primal.insert(commodity, sol);
        assert!(primal.is_integral(&problem, 1e-6));
    }

    #[test]
    fn round_to_snaps_small_noise() {
        assert_eq!(round_to(0.30000000004, 6), 0.3);
        assert_eq!(round_to(-1.9999999, 6), -2.0);
    }
}
