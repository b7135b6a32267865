//! Hooke springs along edges

use super::{EdgeLink, ForceSolver, PhysicsBody};
use crate::graph::Graph;
use crate::options::ModelOptions;

/// Rest length and stiffness of one edge, with per-edge overrides applied
pub(crate) fn edge_spring(graph: &Graph, link: &EdgeLink, model: &SpringModel) -> (f64, f64) {
    let edge = graph.edge(link.key);
    let length = edge.and_then(|e| e.length).unwrap_or(model.spring_length);
    let constant = edge
        .and_then(|e| e.spring_constant)
        .unwrap_or(model.spring_constant);
    (length, constant)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SpringModel {
    pub spring_length: f64,
    pub spring_constant: f64,
}

/// Force pulling `from` toward `to` (and the reverse on `to`), or `None` for a self-loop
/// or a removed endpoint
pub(crate) fn spring_force(
    graph: &Graph,
    link: &EdgeLink,
    length: f64,
    constant: f64,
) -> Option<(f64, f64)> {
    if link.from == link.to {
        return None;
    }
    let from = graph.node(link.from)?;
    let to = graph.node(link.to)?;

    let dx = from.x - to.x;
    let dy = from.y - to.y;
    let distance = (dx * dx + dy * dy).sqrt().max(0.01);
    let spring_force = constant * (length - distance) / distance;
    Some((dx * spring_force, dy * spring_force))
}

#[derive(Debug, Clone)]
pub struct SpringSolver {
    model: SpringModel,
}

impl SpringSolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            model: SpringModel {
                spring_length: model.spring_length,
                spring_constant: model.spring_constant,
            },
        }
    }
}

impl ForceSolver for SpringSolver {
    fn name(&self) -> &'static str {
        "spring"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        for i in 0..body.edges.len() {
            let link = body.edges[i];
            let (length, constant) = edge_spring(graph, &link, &self.model);
            let Some((fx, fy)) = spring_force(graph, &link, length, constant) else {
                continue;
            };
            if let Some(slot) = body.slot_of(link.from) {
                body.add_force(slot, fx, fy);
            }
            if let Some(slot) = body.slot_of(link.to) {
                body.add_force(slot, -fx, -fy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PhysicsEdge, PhysicsNode};
    use crate::options::SimulationOptions;

    fn pair(distance: f64, edge: PhysicsEdge) -> Graph {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a"));
        graph.add_node(PhysicsNode::new("b").with_position(distance, 0.0));
        graph.add_edge(edge);
        graph.refresh_connectivity();
        graph
    }

    fn solve(graph: &Graph) -> PhysicsBody {
        let mut body = PhysicsBody::rebuild(graph);
        let model = SimulationOptions::default().model_options();
        SpringSolver::new(&model).solve(graph, &mut body);
        body
    }

    #[test]
    fn stretched_spring_pulls_together() {
        let graph = pair(195.0, PhysicsEdge::new("ab", "a", "b"));
        let body = solve(&graph);

        // k * (L - d) = 0.04 * (95 - 195)
        assert!((body.forces[0].x - 4.0).abs() < 1e-9);
        assert!((body.forces[1].x + 4.0).abs() < 1e-9);
    }

    #[test]
    fn compressed_spring_pushes_apart() {
        let graph = pair(45.0, PhysicsEdge::new("ab", "a", "b"));
        let body = solve(&graph);

        assert!((body.forces[0].x + 2.0).abs() < 1e-9);
        assert!((body.forces[1].x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn edge_overrides_length_and_constant() {
        let edge = PhysicsEdge::new("ab", "a", "b")
            .with_length(50.0)
            .with_spring_constant(0.5);
        let graph = pair(50.0, edge.clone());
        assert_eq!(solve(&graph).forces[0].x, 0.0);

        let graph = pair(60.0, edge);
        assert!((solve(&graph).forces[1].x + 5.0).abs() < 1e-9);
    }

    #[test]
    fn self_loops_are_ignored() {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a").with_position(3.0, 3.0));
        graph.add_edge(PhysicsEdge::new("aa", "a", "a"));
        graph.refresh_connectivity();

        let body = solve(&graph);

        assert_eq!(body.forces[0].x, 0.0);
        assert_eq!(body.forces[0].y, 0.0);
    }

    #[test]
    fn non_physics_endpoint_receives_nothing() {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a"));
        graph.add_node(PhysicsNode::new("b").with_position(195.0, 0.0).without_physics());
        graph.add_edge(PhysicsEdge::new("ab", "a", "b"));
        graph.refresh_connectivity();

        let body = solve(&graph);

        assert_eq!(body.len(), 1);
        assert!((body.forces[0].x - 4.0).abs() < 1e-9);
    }
}
