//! Solvers for layered (hierarchical) layouts
//!
//! Repulsion only acts inside a level, so levels do not push each other apart
//! vertically. Springs are clamped and re-centered to keep the layout from
//! drifting, and children sitting above their parent are pulled back down.

use super::spring::{SpringModel, edge_spring, spring_force};
use super::{Force, ForceSolver, PhysicsBody};
use crate::graph::Graph;
use crate::options::ModelOptions;

/// Steepness of the quadratic repulsion profile
const STEEPNESS: f64 = 0.05;

/// Per-axis cap on the summed spring force of a node
const MAX_SPRING_FORCE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct HierarchicalRepulsionSolver {
    node_distance: f64,
    avoid_overlap: f64,
}

impl HierarchicalRepulsionSolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            node_distance: model.node_distance,
            avoid_overlap: model.avoid_overlap.clamp(0.0, 1.0),
        }
    }
}

impl ForceSolver for HierarchicalRepulsionSolver {
    fn name(&self) -> &'static str {
        "hierarchicalRepulsion"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        let particles = body.particles(graph);
        for (i, node1) in particles.iter().enumerate() {
            for node2 in &particles[i + 1..] {
                // Nodes without a level all share one
                if node1.level != node2.level {
                    continue;
                }
                let spacing =
                    self.node_distance + self.avoid_overlap * (node1.radius + node2.radius);
                let mut dx = node2.x - node1.x;
                let dy = node2.y - node1.y;
                let mut distance = (dx * dx + dy * dy).sqrt();
                if distance == 0.0 {
                    distance = 0.1;
                    dx = distance;
                }
                if distance >= spacing {
                    continue;
                }

                let repulsing_force =
                    ((STEEPNESS * spacing).powi(2) - (STEEPNESS * distance).powi(2)) / distance;
                let fx = dx * repulsing_force;
                let fy = dy * repulsing_force;
                body.add_force(node1.slot, -fx, -fy);
                body.add_force(node2.slot, fx, fy);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct HierarchicalSpringSolver {
    model: SpringModel,
}

impl HierarchicalSpringSolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            model: SpringModel {
                spring_length: model.spring_length,
                spring_constant: model.spring_constant,
            },
        }
    }
}

impl ForceSolver for HierarchicalSpringSolver {
    fn name(&self) -> &'static str {
        "hierarchicalSpring"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        if body.is_empty() {
            return;
        }
        let mut spring_forces = vec![Force::default(); body.len()];

        for link in &body.edges {
            let (length, constant) = edge_spring(graph, link, &self.model);
            let Some((fx, fy)) = spring_force(graph, link, length, constant) else {
                continue;
            };
            let from_slot = body.slot_of(link.from);
            let to_slot = body.slot_of(link.to);

            if let Some(slot) = from_slot {
                spring_forces[slot].x += fx;
                spring_forces[slot].y += fy;
            }
            if let Some(slot) = to_slot {
                spring_forces[slot].x -= fx;
                spring_forces[slot].y -= fy;
            }

            // Pull a child that sits above its parent back below it
            let (Some(from), Some(to)) = (graph.node(link.from), graph.node(link.to)) else {
                continue;
            };
            let (Some(from_level), Some(to_level)) = (from.level, to.level) else {
                continue;
            };
            let (child, parent, child_slot, parent_slot) = match from_level.cmp(&to_level) {
                std::cmp::Ordering::Greater => (from, to, from_slot, to_slot),
                std::cmp::Ordering::Less => (to, from, to_slot, from_slot),
                std::cmp::Ordering::Equal => continue,
            };
            if child.y >= parent.y {
                continue;
            }
            let pull = constant * (parent.y - child.y);
            if let Some(slot) = child_slot {
                spring_forces[slot].y += pull;
            }
            if let Some(slot) = parent_slot {
                spring_forces[slot].y -= pull;
            }
        }

        for (slot, spring) in spring_forces.iter().enumerate() {
            body.add_force(
                slot,
                spring.x.clamp(-MAX_SPRING_FORCE, MAX_SPRING_FORCE),
                spring.y.clamp(-MAX_SPRING_FORCE, MAX_SPRING_FORCE),
            );
        }

        // Keep the net force at zero
        let count = body.len() as f64;
        let (total_x, total_y) = body
            .forces
            .iter()
            .fold((0.0, 0.0), |(x, y), f| (x + f.x, y + f.y));
        let (correction_x, correction_y) = (total_x / count, total_y / count);
        for force in &mut body.forces {
            force.x -= correction_x;
            force.y -= correction_y;
        }
    }
}
