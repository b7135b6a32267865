//! netlayout - force-directed physics layout for network graphs
//!
//! The engine moves the nodes of a [`graph::Graph`] under repulsion, edge
//! springs and central gravity until the fastest node slows below a
//! threshold, then reports through a [`events::NotificationSink`].
//!
//! ```
//! use netlayout::engine::PhysicsEngine;
//! use netlayout::events::PhysicsEvent;
//! use netlayout::graph::{Graph, PhysicsEdge, PhysicsNode};
//! use netlayout::options::SimulationOptions;
//!
//! let mut graph = Graph::new();
//! graph.add_node(PhysicsNode::new("a").with_position(-50.0, 0.0));
//! graph.add_node(PhysicsNode::new("b").with_position(50.0, 0.0));
//! graph.add_edge(PhysicsEdge::new("ab", "a", "b"));
//!
//! let mut engine = PhysicsEngine::new(SimulationOptions::default());
//! let mut events: Vec<PhysicsEvent> = Vec::new();
//! engine.update_physics_data(&mut graph);
//! engine.stabilize(None, &mut graph, &mut events);
//! let outcome = engine.run_to_stable(&mut graph, &mut events);
//!
//! assert!(outcome.is_some());
//! ```

pub mod adaptive;
pub mod cluster;
pub mod engine;
pub mod events;
pub mod graph;
pub mod integrator;
pub mod io;
pub mod options;
pub mod physics;
pub mod stabilization;

pub use engine::PhysicsEngine;
pub use events::{NotificationSink, PhysicsCommand, PhysicsEvent};
pub use graph::{Graph, PhysicsEdge, PhysicsNode};
pub use options::{SimulationOptions, SolverKind};
pub use stabilization::{EnginePhase, StabilizationOutcome};
