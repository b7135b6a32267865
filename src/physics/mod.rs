//! Force solvers and the physics index they operate on
//!
//! Every solver implements [`ForceSolver`]: it reads positions and masses from
//! the [`Graph`] and *adds* its contribution into the force accumulators held
//! by [`PhysicsBody`]. The engine zeroes the accumulators once per step before
//! running the solvers in order gravity → repulsion → springs.
//!
//! # Solvers
//!
//! - **Barnes-Hut**: quadtree-approximated inverse-square repulsion
//! - **Repulsion**: direct pairwise repulsion with a finite range
//! - **Hierarchical**: level-aware repulsion and clamped springs
//! - **ForceAtlas2**: degree-weighted repulsion and gravity
//! - **Spring / gravity**: edge attraction and pull toward the center

pub mod barnes_hut;
pub mod force_atlas;
pub mod gravity;
pub mod hierarchical;
pub mod repulsion;
pub mod spring;

use tracing::debug;

use crate::graph::{EdgeKey, Graph, NodeKey};
use crate::options::{ModelOptions, SolverKind};

pub use barnes_hut::{BarnesHutSolver, BarnesHutTree};
pub use force_atlas::{ForceAtlas2GravitySolver, ForceAtlas2RepulsionSolver};
pub use gravity::CentralGravitySolver;
pub use hierarchical::{HierarchicalRepulsionSolver, HierarchicalSpringSolver};
pub use repulsion::RepulsionSolver;
pub use spring::SpringSolver;

/// Accumulated force on one node
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Force {
    pub x: f64,
    pub y: f64,
}

/// An edge with endpoints resolved to node keys
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeLink {
    pub key: EdgeKey,
    pub from: NodeKey,
    pub to: NodeKey,
}

/// Physics-relevant subset of the graph plus per-node force accumulators
///
/// Rebuilt on every data change. `forces[i]` and `degrees[i]` belong to
/// `node_keys[i]`.
#[derive(Debug, Clone, Default)]
pub struct PhysicsBody {
    pub node_keys: Vec<NodeKey>,
    pub edges: Vec<EdgeLink>,
    pub forces: Vec<Force>,
    /// Visible edges touching each node
    pub degrees: Vec<usize>,
    /// Node slot -> index into `node_keys`
    slots: Vec<Option<usize>>,
}

impl PhysicsBody {
    /// Index the physics-relevant nodes and edges of `graph`
    ///
    /// Edge connectivity must be current, see [`Graph::refresh_connectivity`].
    pub fn rebuild(graph: &Graph) -> Self {
        let mut slots = vec![None; graph.node_capacity()];
        let mut node_keys = Vec::new();
        for (key, node) in graph.nodes() {
            if node.is_physics_relevant() {
                slots[key.index()] = Some(node_keys.len());
                node_keys.push(key);
            }
        }

        let mut degrees = vec![0; node_keys.len()];
        let mut edges = Vec::new();
        for (key, edge) in graph.edges() {
            if !edge.is_visible() {
                continue;
            }
            let (Some(from), Some(to)) = (graph.key_of(&edge.from), graph.key_of(&edge.to)) else {
                continue;
            };
            for endpoint in [from, to] {
                if let Some(slot) = slots[endpoint.index()] {
                    degrees[slot] += 1;
                }
            }
            if edge.physics {
                edges.push(EdgeLink { key, from, to });
            }
        }

        debug!(
            nodes = node_keys.len(),
            edges = edges.len(),
            "rebuilt physics index"
        );

        Self {
            forces: vec![Force::default(); node_keys.len()],
            node_keys,
            edges,
            degrees,
            slots,
        }
    }

    /// Position of a node inside the index, if it is physics-relevant
    pub fn slot_of(&self, key: NodeKey) -> Option<usize> {
        self.slots.get(key.index()).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.node_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_keys.is_empty()
    }

    pub fn reset_forces(&mut self) {
        self.forces.fill(Force::default());
    }

    pub fn add_force(&mut self, slot: usize, fx: f64, fy: f64) {
        let force = &mut self.forces[slot];
        force.x += fx;
        force.y += fy;
    }

    /// Snapshot of the live physics nodes for a solver pass
    ///
    /// Nodes removed since the last rebuild are skipped.
    pub fn particles(&self, graph: &Graph) -> Vec<Particle> {
        self.node_keys
            .iter()
            .enumerate()
            .filter_map(|(slot, key)| {
                graph.node(*key).map(|node| Particle {
                    slot,
                    x: node.x,
                    y: node.y,
                    mass: node.mass(),
                    radius: node.radius,
                    degree: self.degrees[slot],
                    level: node.level,
                })
            })
            .collect()
    }
}

/// Read-only copy of a node's physical properties, taken at the start of a solver pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Index into [`PhysicsBody::forces`]
    pub slot: usize,
    pub x: f64,
    pub y: f64,
    pub mass: f64,
    pub radius: f64,
    pub degree: usize,
    pub level: Option<u32>,
}

/// A force contribution strategy
pub trait ForceSolver {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Add this solver's forces into `body.forces`
    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody);
}

/// The three solvers run each step, selected by [`SolverKind`]
pub struct SolverSet {
    pub gravity: Box<dyn ForceSolver>,
    pub nodes: Box<dyn ForceSolver>,
    pub edges: Box<dyn ForceSolver>,
}

impl SolverSet {
    pub fn new(kind: SolverKind, model: &ModelOptions) -> Self {
        let set = match kind {
            SolverKind::BarnesHut => Self {
                gravity: Box::new(CentralGravitySolver::new(model)),
                nodes: Box::new(BarnesHutSolver::new(model)),
                edges: Box::new(SpringSolver::new(model)),
            },
            SolverKind::Repulsion => Self {
                gravity: Box::new(CentralGravitySolver::new(model)),
                nodes: Box::new(RepulsionSolver::new(model)),
                edges: Box::new(SpringSolver::new(model)),
            },
            SolverKind::HierarchicalRepulsion => Self {
                gravity: Box::new(CentralGravitySolver::new(model)),
                nodes: Box::new(HierarchicalRepulsionSolver::new(model)),
                edges: Box::new(HierarchicalSpringSolver::new(model)),
            },
            SolverKind::ForceAtlas2Based => Self {
                gravity: Box::new(ForceAtlas2GravitySolver::new(model)),
                nodes: Box::new(ForceAtlas2RepulsionSolver::new(model)),
                edges: Box::new(SpringSolver::new(model)),
            },
        };
        debug!(
            gravity = set.gravity.name(),
            nodes = set.nodes.name(),
            edges = set.edges.name(),
            "configured force solvers"
        );
        set
    }

    /// Run all solvers in order
    pub fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        self.gravity.solve(graph, body);
        self.nodes.solve(graph, body);
        self.edges.solve(graph, body);
    }
}
