//! Adaptive timestep control
//!
//! Every few ticks the engine takes an exploratory step at twice the current
//! timestep, reverts it, and then takes two ordinary steps. Comparing where
//! the nodes ended up against where the exploratory step put them tells
//! whether the timestep can grow.

use std::collections::HashMap;

use crate::graph::{Graph, NodeKey, PhysicsNode};
use crate::options::Point;
use crate::physics::PhysicsBody;

/// Ticks between adaptive checks
pub const ADAPTIVE_INTERVAL: i64 = 3;

/// Timestep multiplier on a good check
pub const TIMESTEP_GROWTH: f64 = 1.2;

/// Largest per-axis difference accepted by the quality check
pub const POSITION_THRESHOLD: f64 = 0.3;

/// Average speed below which the adaptive timestep may run
pub const ADAPTIVE_VELOCITY_THRESHOLD: f64 = 5.0;

/// Position and velocity of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeState {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

impl NodeState {
    pub fn of(node: &PhysicsNode) -> Self {
        Self {
            x: node.x,
            y: node.y,
            vx: node.vx,
            vy: node.vy,
        }
    }
}

/// State before the last step, and positions recorded by the last revert
#[derive(Debug, Clone, Default)]
pub struct StepSnapshots {
    previous: HashMap<NodeKey, NodeState>,
    reference: HashMap<NodeKey, Point>,
}

impl StepSnapshots {
    pub fn record(&mut self, key: NodeKey, node: &PhysicsNode) {
        self.previous.insert(key, NodeState::of(node));
    }

    pub fn previous(&self, key: NodeKey) -> Option<NodeState> {
        self.previous.get(&key).copied()
    }

    pub fn reference(&self, key: NodeKey) -> Option<Point> {
        self.reference.get(&key).copied()
    }

    /// Restore every node to its state before the last step
    ///
    /// The positions being discarded become the new reference for
    /// [`StepSnapshots::quality_ok`]. Snapshots of vanished nodes are dropped.
    pub fn revert(&mut self, graph: &mut Graph) {
        self.reference.clear();
        self.previous.retain(|key, _| graph.node(*key).is_some());
        for (key, state) in &self.previous {
            let Some(node) = graph.node_mut(*key) else {
                continue;
            };
            if !node.physics {
                continue;
            }
            self.reference.insert(*key, Point::new(node.x, node.y));
            node.x = state.x;
            node.y = state.y;
            node.vx = state.vx;
            node.vy = state.vy;
        }
    }

    /// Whether every referenced node ended within [`POSITION_THRESHOLD`] of its reference
    pub fn quality_ok(&self, graph: &Graph) -> bool {
        self.reference.iter().all(|(key, reference)| {
            graph.node(*key).is_none_or(|node| {
                (node.x - reference.x).hypot(node.y - reference.y) <= POSITION_THRESHOLD
            })
        })
    }

    /// Drop snapshots of nodes no longer in the physics index
    pub fn prune(&mut self, body: &PhysicsBody) {
        self.previous.retain(|key, _| body.slot_of(*key).is_some());
        self.reference.retain(|key, _| body.slot_of(*key).is_some());
    }

    pub fn clear(&mut self) {
        self.previous.clear();
        self.reference.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.reference.is_empty()
    }
}

/// Interval counter and switches for the adaptive timestep
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveTimestep {
    /// Requested for the current run (stabilization only)
    pub active: bool,
    /// Permitted by the last step's average speed
    pub enabled: bool,
    pub counter: i64,
    pub interval: i64,
}

impl Default for AdaptiveTimestep {
    fn default() -> Self {
        Self::new(false)
    }
}

impl AdaptiveTimestep {
    pub fn new(active: bool) -> Self {
        Self {
            active,
            enabled: false,
            counter: 0,
            interval: ADAPTIVE_INTERVAL,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active && self.enabled
    }

    /// Whether this tick carries the exploratory double step
    pub fn is_due(&self) -> bool {
        self.counter % self.interval == 0
    }

    /// New timestep after a check
    ///
    /// Grows on success. On failure shrinks toward `base`; if it is still above
    /// `base`, the next tick is skipped so the check runs on a settled state.
    pub fn adjust(&mut self, timestep: f64, base: f64, quality_ok: bool) -> f64 {
        if quality_ok {
            timestep * TIMESTEP_GROWTH
        } else if timestep / TIMESTEP_GROWTH < base {
            base
        } else {
            self.counter = -1;
            base.max(timestep / TIMESTEP_GROWTH)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving_graph() -> (Graph, NodeKey) {
        let mut graph = Graph::new();
        let key = graph.add_node(PhysicsNode::new("a").with_position(1.0, 2.0));
        (graph, key)
    }

    #[test]
    fn revert_restores_and_records_reference() {
        let (mut graph, key) = moving_graph();
        let mut snapshots = StepSnapshots::default();
        snapshots.record(key, graph.node(key).unwrap());
        {
            let node = graph.node_mut(key).unwrap();
            node.x = 5.0;
            node.vx = 3.0;
        }

        snapshots.revert(&mut graph);

        let node = graph.node(key).unwrap();
        assert_eq!((node.x, node.y, node.vx), (1.0, 2.0, 0.0));
        assert_eq!(snapshots.reference(key), Some(Point::new(5.0, 2.0)));
    }

    #[test]
    fn quality_uses_distance_threshold() {
        let (mut graph, key) = moving_graph();
        let mut snapshots = StepSnapshots::default();
        snapshots.record(key, graph.node(key).unwrap());
        graph.node_mut(key).unwrap().x = 1.25;
        snapshots.revert(&mut graph);

        graph.node_mut(key).unwrap().x = 1.0;
        assert!(snapshots.quality_ok(&graph));
        graph.node_mut(key).unwrap().x = 0.9;
        assert!(!snapshots.quality_ok(&graph));
    }

    #[test]
    fn diagonal_drift_fails_quality() {
        let mut graph = Graph::new();
        let key = graph.add_node(PhysicsNode::new("a").with_position(0.0, 0.0));
        let mut snapshots = StepSnapshots::default();
        snapshots.record(key, graph.node(key).unwrap());
        {
            let node = graph.node_mut(key).unwrap();
            node.x = 0.25;
            node.y = 0.25;
        }

        // Each axis is within the threshold, the distance (~0.354) is not
        snapshots.revert(&mut graph);
        assert!(!snapshots.quality_ok(&graph));

        graph.node_mut(key).unwrap().x = 0.2;
        graph.node_mut(key).unwrap().y = 0.1;
        assert!(snapshots.quality_ok(&graph));
    }

    #[test]
    fn revert_drops_vanished_nodes() {
        let (mut graph, key) = moving_graph();
        let mut snapshots = StepSnapshots::default();
        snapshots.record(key, graph.node(key).unwrap());
        graph.remove_node("a");

        snapshots.revert(&mut graph);

        assert!(snapshots.previous(key).is_none());
        assert!(snapshots.is_empty());
    }

    #[test]
    fn adjust_grows_and_shrinks() {
        let mut adaptive = AdaptiveTimestep::new(true);

        assert!((adaptive.adjust(0.5, 0.5, true) - 0.6).abs() < 1e-12);
        // Shrinking below the base snaps to it
        assert_eq!(adaptive.adjust(0.55, 0.5, false), 0.5);
        assert_eq!(adaptive.counter, 0);

        let shrunk = adaptive.adjust(1.2, 0.5, false);
        assert!((shrunk - 1.0).abs() < 1e-12);
        assert_eq!(adaptive.counter, -1);
        assert!(!adaptive.is_due());
    }
}
