//! Central gravity

use super::{ForceSolver, PhysicsBody};
use crate::graph::Graph;
use crate::options::{ModelOptions, Point};

/// Pull toward the center with a magnitude independent of distance
#[derive(Debug, Clone)]
pub struct CentralGravitySolver {
    central_gravity: f64,
    center: Point,
}

impl CentralGravitySolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            central_gravity: model.central_gravity,
            center: model.center,
        }
    }
}

impl ForceSolver for CentralGravitySolver {
    fn name(&self) -> &'static str {
        "centralGravity"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        if self.central_gravity == 0.0 {
            return;
        }
        for particle in body.particles(graph) {
            let dx = self.center.x - particle.x;
            let dy = self.center.y - particle.y;
            let distance = (dx * dx + dy * dy).sqrt();
            let gravity_force = if distance == 0.0 {
                0.0
            } else {
                self.central_gravity / distance
            };
            body.add_force(particle.slot, dx * gravity_force, dy * gravity_force);
        }
    }
}
