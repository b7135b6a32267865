//! Semi-implicit Euler integration

use crate::adaptive::StepSnapshots;
use crate::graph::{Graph, PhysicsNode};
use crate::options::Point;
use crate::physics::{Force, PhysicsBody};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    pub damping: f64,
    pub timestep: f64,
    /// Cap on each velocity component
    pub max_velocity: f64,
}

/// Speeds observed over one step of all nodes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveSummary {
    pub max_velocity: f64,
    pub average_velocity: f64,
}

impl Integrator {
    pub fn new(damping: f64, timestep: f64, max_velocity: f64) -> Self {
        Self {
            damping,
            timestep,
            max_velocity,
        }
    }

    /// Advance one velocity component
    pub fn component_velocity(&self, v: f64, f: f64, m: f64) -> f64 {
        let damping_force = self.damping * v;
        let acceleration = (f - damping_force) / m;
        let v = v + acceleration * self.timestep;
        v.clamp(-self.max_velocity, self.max_velocity)
    }

    /// Advance one node and return its new speed
    ///
    /// Wind is added to the force first. A fixed axis has its force and
    /// velocity zeroed and keeps its position.
    pub fn step_node(&self, node: &mut PhysicsNode, force: &mut Force, wind: Point) -> f64 {
        force.x += wind.x;
        force.y += wind.y;

        if node.fixed.x {
            force.x = 0.0;
            node.vx = 0.0;
        } else {
            node.vx = self.component_velocity(node.vx, force.x, node.mass());
            node.x += node.vx * self.timestep;
        }

        if node.fixed.y {
            force.y = 0.0;
            node.vy = 0.0;
        } else {
            node.vy = self.component_velocity(node.vy, force.y, node.mass());
            node.y += node.vy * self.timestep;
        }

        node.speed()
    }

    /// Advance every node of the physics index, snapshotting each one first
    pub fn move_nodes(
        &self,
        graph: &mut Graph,
        body: &mut PhysicsBody,
        wind: Point,
        snapshots: &mut StepSnapshots,
    ) -> MoveSummary {
        let mut summary = MoveSummary::default();
        let mut total = 0.0;
        let mut moved = 0usize;

        for (slot, key) in body.node_keys.iter().enumerate() {
            let Some(node) = graph.node_mut(*key) else {
                continue;
            };
            snapshots.record(*key, node);
            let speed = self.step_node(node, &mut body.forces[slot], wind);
            summary.max_velocity = summary.max_velocity.max(speed);
            total += speed;
            moved += 1;
        }

        if moved > 0 {
            summary.average_velocity = total / moved as f64;
        }
        summary
    }
}
