//! Node/edge index consumed by the physics engine
//!
//! The graph owns every node and edge, visible or not. Storage is slot based:
//! removing a node empties its slot instead of shifting the others, so a
//! [`NodeKey`] captured by the physics index keeps pointing at the same slot
//! and simply resolves to nothing once the node is gone.

use std::collections::HashMap;

use tracing::warn;

use crate::cluster::ClusterRecord;

/// Default node mass
pub const DEFAULT_NODE_MASS: f64 = 1.0;

/// Default node radius, used by the avoid-overlap terms
pub const DEFAULT_NODE_RADIUS: f64 = 8.0;

/// Stable handle to a node slot in a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl NodeKey {
    /// Slot index inside the owning graph
    pub fn index(self) -> usize {
        self.0
    }
}

/// Stable handle to an edge slot in a [`Graph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey(usize);

impl EdgeKey {
    /// Slot index inside the owning graph
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-axis position locks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedAxes {
    pub x: bool,
    pub y: bool,
}

impl FixedAxes {
    pub const NONE: Self = Self { x: false, y: false };
    pub const BOTH: Self = Self { x: true, y: true };

    pub fn is_fully_fixed(self) -> bool {
        self.x && self.y
    }
}

/// A node as seen by the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsNode {
    /// Node ID (unique within the graph)
    pub id: String,
    /// Position in 2D space
    pub x: f64,
    pub y: f64,
    /// Velocity, persisted across ticks
    pub vx: f64,
    pub vy: f64,
    /// Always > 0, see [`PhysicsNode::set_mass`]
    mass: f64,
    /// Visual radius
    pub radius: f64,
    pub fixed: FixedAxes,
    /// Whether the node takes part in the simulation at all
    pub physics: bool,
    pub hidden: bool,
    /// Hierarchy level, used by the hierarchical solvers
    pub level: Option<u32>,
    /// The position was supplied by the user rather than generated
    pub positioned: bool,
    /// Cluster currently representing this node
    pub(crate) cluster: Option<String>,
}

impl PhysicsNode {
    /// Create a node at the origin
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            mass: DEFAULT_NODE_MASS,
            radius: DEFAULT_NODE_RADIUS,
            fixed: FixedAxes::NONE,
            physics: true,
            hidden: false,
            level: None,
            positioned: false,
            cluster: None,
        }
    }

    /// Place the node at a user-supplied position
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self.positioned = true;
        self
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.set_mass(mass);
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius.max(0.0);
        self
    }

    pub fn with_fixed(mut self, fixed: FixedAxes) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Exclude the node from the simulation (it stays visible)
    pub fn without_physics(mut self) -> Self {
        self.physics = false;
        self
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Set the mass. Non-positive or non-finite values fall back to the default.
    pub fn set_mass(&mut self, mass: f64) {
        if mass.is_finite() && mass > 0.0 {
            self.mass = mass;
        } else {
            warn!(node = %self.id, mass, "invalid node mass, using default");
            self.mass = DEFAULT_NODE_MASS;
        }
    }

    /// ID of the cluster this node is absorbed into, if any
    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// Not hidden and not absorbed into a cluster
    pub fn is_visible(&self) -> bool {
        !self.hidden && self.cluster.is_none()
    }

    /// Visible with physics enabled
    pub fn is_physics_relevant(&self) -> bool {
        self.physics && self.is_visible()
    }

    pub fn speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

/// An edge as seen by the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsEdge {
    pub id: String,
    /// Source node ID
    pub from: String,
    /// Target node ID
    pub to: String,
    /// Rest length; the solver's spring length when unset
    pub length: Option<f64>,
    /// Spring constant; the solver's constant when unset
    pub spring_constant: Option<f64>,
    pub physics: bool,
    pub hidden: bool,
    /// Contained in or replaced by a cluster
    pub(crate) clustered: bool,
    /// Both endpoints present and visible, refreshed by [`Graph::refresh_connectivity`]
    pub(crate) connected: bool,
}

impl PhysicsEdge {
    pub fn new(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            length: None,
            spring_constant: None,
            physics: true,
            hidden: false,
            clustered: false,
            connected: false,
        }
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_spring_constant(mut self, spring_constant: f64) -> Self {
        self.spring_constant = Some(spring_constant);
        self
    }

    pub fn without_physics(mut self) -> Self {
        self.physics = false;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    /// Connected, visible, not clustered, physics enabled
    pub fn is_physics_relevant(&self) -> bool {
        self.physics && self.is_visible()
    }

    pub(crate) fn is_visible(&self) -> bool {
        self.connected && !self.hidden && !self.clustered
    }
}

/// Slot storage for nodes and edges
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<PhysicsNode>>,
    node_lookup: HashMap<String, NodeKey>,
    edges: Vec<Option<PhysicsEdge>>,
    edge_lookup: HashMap<String, EdgeKey>,
    pub(crate) clusters: HashMap<String, ClusterRecord>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, replacing any node with the same ID in place
    pub fn add_node(&mut self, node: PhysicsNode) -> NodeKey {
        if let Some(&key) = self.node_lookup.get(&node.id) {
            self.nodes[key.0] = Some(node);
            return key;
        }
        let key = NodeKey(self.nodes.len());
        self.node_lookup.insert(node.id.clone(), key);
        self.nodes.push(Some(node));
        key
    }

    /// Remove a node. Its slot stays empty; edges pointing at it disconnect on
    /// the next [`Graph::refresh_connectivity`].
    pub fn remove_node(&mut self, id: &str) -> Option<PhysicsNode> {
        let key = self.node_lookup.remove(id)?;
        self.nodes[key.0].take()
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.node_lookup.get(id).copied()
    }

    pub fn node(&self, key: NodeKey) -> Option<&PhysicsNode> {
        self.nodes.get(key.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut PhysicsNode> {
        self.nodes.get_mut(key.0).and_then(Option::as_mut)
    }

    pub fn node_by_id(&self, id: &str) -> Option<&PhysicsNode> {
        self.key_of(id).and_then(|key| self.node(key))
    }

    pub fn node_by_id_mut(&mut self, id: &str) -> Option<&mut PhysicsNode> {
        let key = self.key_of(id)?;
        self.node_mut(key)
    }

    /// Live nodes in slot order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &PhysicsNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|n| (NodeKey(i), n)))
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut PhysicsNode> {
        self.nodes.iter_mut().filter_map(Option::as_mut)
    }

    pub fn node_count(&self) -> usize {
        self.node_lookup.len()
    }

    /// Number of node slots, including emptied ones
    pub fn node_capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Insert an edge, replacing any edge with the same ID in place
    pub fn add_edge(&mut self, edge: PhysicsEdge) -> EdgeKey {
        if let Some(&key) = self.edge_lookup.get(&edge.id) {
            self.edges[key.0] = Some(edge);
            return key;
        }
        let key = EdgeKey(self.edges.len());
        self.edge_lookup.insert(edge.id.clone(), key);
        self.edges.push(Some(edge));
        key
    }

    pub fn remove_edge(&mut self, id: &str) -> Option<PhysicsEdge> {
        let key = self.edge_lookup.remove(id)?;
        self.edges[key.0].take()
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&PhysicsEdge> {
        self.edges.get(key.0).and_then(Option::as_ref)
    }

    pub fn edge_by_id(&self, id: &str) -> Option<&PhysicsEdge> {
        let key = self.edge_lookup.get(id)?;
        self.edge(*key)
    }

    pub(crate) fn edge_by_id_mut(&mut self, id: &str) -> Option<&mut PhysicsEdge> {
        let key = *self.edge_lookup.get(id)?;
        self.edges.get_mut(key.0).and_then(Option::as_mut)
    }

    /// Live edges in slot order
    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, &PhysicsEdge)> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (EdgeKey(i), e)))
    }

    pub fn edge_count(&self) -> usize {
        self.edge_lookup.len()
    }

    /// Recompute every edge's `connected` flag: both endpoints exist and are visible
    pub fn refresh_connectivity(&mut self) {
        let visible = |id: &str| {
            self.node_lookup
                .get(id)
                .and_then(|key| self.nodes[key.0].as_ref())
                .is_some_and(PhysicsNode::is_visible)
        };
        let flags: Vec<bool> = self
            .edges
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .is_some_and(|e| visible(&e.from) && visible(&e.to))
            })
            .collect();
        for (slot, connected) in self.edges.iter_mut().zip(flags) {
            if let Some(edge) = slot {
                edge.connected = connected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a"));
        graph.add_node(PhysicsNode::new("b").with_position(10.0, 0.0));
        graph.add_edge(PhysicsEdge::new("ab", "a", "b"));
        graph
    }

    #[test]
    fn add_node_replaces_in_place() {
        let mut graph = two_node_graph();
        let key = graph.key_of("a").unwrap();
        let replaced = graph.add_node(PhysicsNode::new("a").with_position(5.0, 5.0));

        assert_eq!(key, replaced);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.node(key).unwrap().x, 5.0);
    }

    #[test]
    fn removed_node_leaves_stale_key_unresolved() {
        let mut graph = two_node_graph();
        let key = graph.key_of("b").unwrap();

        assert!(graph.remove_node("b").is_some());
        assert!(graph.node(key).is_none());
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node_capacity(), 2);

        // A new node never reuses the emptied slot
        let c = graph.add_node(PhysicsNode::new("c"));
        assert_ne!(c, key);
    }

    #[test]
    fn connectivity_tracks_endpoint_visibility() {
        let mut graph = two_node_graph();
        graph.refresh_connectivity();
        assert!(graph.edge_by_id("ab").unwrap().is_connected());

        graph.node_by_id_mut("b").unwrap().hidden = true;
        graph.refresh_connectivity();
        assert!(!graph.edge_by_id("ab").unwrap().is_connected());

        graph.node_by_id_mut("b").unwrap().hidden = false;
        graph.remove_node("a");
        graph.refresh_connectivity();
        assert!(!graph.edge_by_id("ab").unwrap().is_connected());
    }

    #[test]
    fn invalid_mass_falls_back_to_default() {
        let node = PhysicsNode::new("n").with_mass(0.0);
        assert_eq!(node.mass(), DEFAULT_NODE_MASS);

        let node = PhysicsNode::new("n").with_mass(f64::NAN);
        assert_eq!(node.mass(), DEFAULT_NODE_MASS);

        let node = PhysicsNode::new("n").with_mass(3.5);
        assert_eq!(node.mass(), 3.5);
    }

    #[test]
    fn physics_relevance_respects_flags() {
        let node = PhysicsNode::new("n");
        assert!(node.is_physics_relevant());
        assert!(!node.clone().without_physics().is_physics_relevant());

        let mut hidden = node.clone();
        hidden.hidden = true;
        assert!(!hidden.is_physics_relevant());

        let mut clustered = node;
        clustered.cluster = Some("c".to_string());
        assert!(!clustered.is_physics_relevant());
    }
}
