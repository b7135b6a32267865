//! Direct pairwise repulsion with a finite range
//!
//! Every pair is evaluated. The force is a constant 1 inside half the node
//! distance, falls off linearly from there and reaches zero at twice the node
//! distance.

use super::{ForceSolver, PhysicsBody};
use crate::graph::Graph;
use crate::options::ModelOptions;

#[derive(Debug, Clone)]
pub struct RepulsionSolver {
    node_distance: f64,
    avoid_overlap: f64,
}

impl RepulsionSolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            node_distance: model.node_distance,
            avoid_overlap: model.avoid_overlap.clamp(0.0, 1.0),
        }
    }
}

impl ForceSolver for RepulsionSolver {
    fn name(&self) -> &'static str {
        "repulsion"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        let particles = body.particles(graph);
        for (i, node1) in particles.iter().enumerate() {
            for node2 in &particles[i + 1..] {
                let mut dx = node2.x - node1.x;
                let dy = node2.y - node1.y;
                let mut distance = (dx * dx + dy * dy).sqrt();
                if distance == 0.0 {
                    distance = 0.1;
                    dx = distance;
                }

                let spacing =
                    self.node_distance + self.avoid_overlap * (node1.radius + node2.radius);
                if distance >= 2.0 * spacing {
                    continue;
                }

                let a = -2.0 / 3.0 / spacing;
                let b = 4.0 / 3.0;
                let repulsing_force = if distance < 0.5 * spacing {
                    1.0
                } else {
                    a * distance + b
                };
                let repulsing_force = repulsing_force / distance;

                let fx = dx * repulsing_force;
                let fy = dy * repulsing_force;
                body.add_force(node1.slot, -fx, -fy);
                body.add_force(node2.slot, fx, fy);
            }
        }
    }
}
