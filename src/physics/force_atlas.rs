//! ForceAtlas2-flavoured solvers
//!
//! Both terms scale with node degree, so hubs push harder and are pulled
//! harder toward the center.

use super::barnes_hut::{BarnesHutTree, SeededJitter, separation};
use super::{ForceSolver, Particle, PhysicsBody};
use crate::graph::Graph;
use crate::options::{ModelOptions, Point};

/// Degree-weighted inverse-distance repulsion over a Barnes-Hut tree
#[derive(Debug, Clone)]
pub struct ForceAtlas2RepulsionSolver {
    theta_inversed: f64,
    gravitational_constant: f64,
    overlap_avoidance_factor: f64,
    jitter: SeededJitter,
}

impl ForceAtlas2RepulsionSolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            theta_inversed: 1.0 / model.theta,
            gravitational_constant: model.gravitational_constant,
            overlap_avoidance_factor: model.overlap_avoidance_factor(),
            jitter: SeededJitter::default(),
        }
    }

    fn force_on(&self, tree: &BarnesHutTree, particle: &Particle) -> (f64, f64) {
        let degree = (particle.degree + 1) as f64;
        let (mut fx, mut fy) = (0.0, 0.0);
        tree.for_each_interaction(particle, self.theta_inversed, |interaction| {
            let (dx, dy, distance) =
                separation(&interaction, particle.radius, self.overlap_avoidance_factor);
            let gravity_force = self.gravitational_constant * interaction.mass * particle.mass
                * degree
                / distance.powi(2);
            fx += dx * gravity_force;
            fy += dy * gravity_force;
        });
        (fx, fy)
    }
}

impl ForceSolver for ForceAtlas2RepulsionSolver {
    fn name(&self) -> &'static str {
        "forceAtlas2Repulsion"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        if self.gravitational_constant == 0.0 || body.is_empty() {
            return;
        }
        let mut particles = body.particles(graph);
        let tree = BarnesHutTree::build(&mut particles, &mut self.jitter);

        for particle in particles.iter().filter(|p| p.mass > 0.0) {
            let (fx, fy) = self.force_on(&tree, particle);
            body.add_force(particle.slot, fx, fy);
        }
    }
}

/// Constant-magnitude pull toward the center, scaled by degree and mass
#[derive(Debug, Clone)]
pub struct ForceAtlas2GravitySolver {
    central_gravity: f64,
    center: Point,
}

impl ForceAtlas2GravitySolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            central_gravity: model.central_gravity,
            center: model.center,
        }
    }
}

impl ForceSolver for ForceAtlas2GravitySolver {
    fn name(&self) -> &'static str {
        "forceAtlas2Gravity"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        for particle in body.particles(graph) {
            let dx = self.center.x - particle.x;
            let dy = self.center.y - particle.y;
            let distance = (dx * dx + dy * dy).sqrt();
            let gravity_force = if distance > 0.0 {
                self.central_gravity * (particle.degree + 1) as f64 * particle.mass
            } else {
                0.0
            };
            body.add_force(particle.slot, dx * gravity_force, dy * gravity_force);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PhysicsEdge, PhysicsNode};
    use crate::options::{SimulationOptions, SolverKind};
    use crate::physics::Force;

    fn model() -> ModelOptions {
        SimulationOptions {
            solver: SolverKind::ForceAtlas2Based,
            ..Default::default()
        }
        .model_options()
    }

    fn star() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("hub"));
        graph.add_node(PhysicsNode::new("a").with_position(10.0, 0.0));
        graph.add_node(PhysicsNode::new("b").with_position(-10.0, 0.0));
        graph.add_node(PhysicsNode::new("c").with_position(0.0, 10.0));
        graph.add_edge(PhysicsEdge::new("ha", "hub", "a"));
        graph.add_edge(PhysicsEdge::new("hb", "hub", "b"));
        graph.add_edge(PhysicsEdge::new("hc", "hub", "c"));
        graph.refresh_connectivity();
        graph
    }

    #[test]
    fn repulsion_scales_with_degree() {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a"));
        graph.add_node(PhysicsNode::new("b").with_position(10.0, 0.0));
        graph.add_node(PhysicsNode::new("c").with_position(20.0, 0.0));
        graph.add_edge(PhysicsEdge::new("bc", "b", "c"));
        graph.refresh_connectivity();
        let mut body = PhysicsBody::rebuild(&graph);
        let mut model = model();
        model.theta = 0.0;

        ForceAtlas2RepulsionSolver::new(&model).solve(&graph, &mut body);

        // a (degree 0): pushed by b at 10 and c at 20
        let expected = -50.0 * (10.0 / 100.0 + 20.0 / 400.0);
        assert!((body.forces[0].x - expected).abs() < 1e-9);

        // c has degree 1, so the same pair pushes it twice as hard as a
        let c_from_a = -(-50.0 * 2.0 * 20.0 / 400.0);
        let c_from_b = -(-50.0 * 2.0 * 10.0 / 100.0);
        assert!((body.forces[2].x - (c_from_a + c_from_b)).abs() < 1e-9);
    }

    #[test]
    fn gravity_weights_hubs() {
        let mut graph = star();
        graph.node_by_id_mut("hub").unwrap().x = 5.0;
        let mut body = PhysicsBody::rebuild(&graph);

        ForceAtlas2GravitySolver::new(&model()).solve(&graph, &mut body);

        // hub: degree 3 -> 0.01 * 4 * dx
        assert!((body.forces[0].x - 0.01 * 4.0 * -5.0).abs() < 1e-12);
        // a: degree 1 -> 0.01 * 2 * dx
        assert!((body.forces[1].x - 0.01 * 2.0 * -10.0).abs() < 1e-12);
    }

    #[test]
    fn gravity_ignores_node_at_center() {
        let graph = star();
        let mut body = PhysicsBody::rebuild(&graph);

        ForceAtlas2GravitySolver::new(&model()).solve(&graph, &mut body);

        assert_eq!(body.forces[0], Force::default());
    }
}
