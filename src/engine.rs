//! The physics engine
//!
//! [`PhysicsEngine`] owns the solver set, the physics index and all run state,
//! and mutates node positions and velocities in a [`Graph`] it is handed on
//! each call. Nothing is scheduled internally: the host calls
//! [`PhysicsEngine::poll`] from its own loop (or [`PhysicsEngine::run_to_stable`]
//! to block until a stabilization run is done).
//!
//! # Tick
//!
//! One tick computes forces (gravity, then repulsion, then springs) and moves
//! every physics node. During stabilization every third tick additionally
//! probes a doubled timestep to decide whether the timestep can grow, see
//! [`crate::adaptive`].

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::adaptive::{ADAPTIVE_VELOCITY_THRESHOLD, AdaptiveTimestep, StepSnapshots};
use crate::events::{NotificationSink, PhysicsCommand, PhysicsEvent};
use crate::graph::{FixedAxes, Graph, NodeKey};
use crate::integrator::Integrator;
use crate::options::{ModelOptions, SimulationOptions};
use crate::physics::{PhysicsBody, SolverSet};
use crate::stabilization::{EnginePhase, StabilizationOutcome, StabilizationState};

/// Mutable run state shared by the tick, the adaptive controller and the
/// stabilization state machine
#[derive(Debug, Clone, Default)]
pub struct EngineContext {
    /// Current (possibly adapted) timestep
    pub timestep: f64,
    pub adaptive: AdaptiveTimestep,
    pub snapshots: StepSnapshots,
    pub stabilization: StabilizationState,
    /// Original fixed axes of nodes pinned for an only-dynamic-edges run
    pub frozen: HashMap<NodeKey, FixedAxes>,
    /// Notifications delivered at the start of the next poll
    pub(crate) deferred: VecDeque<PhysicsEvent>,
}

pub struct PhysicsEngine {
    options: SimulationOptions,
    model: ModelOptions,
    solvers: SolverSet,
    body: PhysicsBody,
    physics_enabled: bool,
    pub(crate) context: EngineContext,
}

impl PhysicsEngine {
    pub fn new(options: SimulationOptions) -> Self {
        let options = options.normalized();
        let model = options.model_options();
        let solvers = SolverSet::new(options.solver, &model);
        let context = EngineContext {
            timestep: options.timestep,
            adaptive: AdaptiveTimestep::new(options.adaptive_timestep),
            ..Default::default()
        };
        Self {
            physics_enabled: options.enabled,
            options,
            model,
            solvers,
            body: PhysicsBody::default(),
            context,
        }
    }

    /// Replace the options; disabling physics stops the simulation
    pub fn set_options(
        &mut self,
        options: SimulationOptions,
        graph: &mut Graph,
        sink: &mut dyn NotificationSink,
    ) {
        self.apply_options(options);
        if !self.physics_enabled {
            self.stop(true, graph, sink);
        }
    }

    fn apply_options(&mut self, options: SimulationOptions) {
        let options = options.normalized();
        self.model = options.model_options();
        self.solvers = SolverSet::new(options.solver, &self.model);
        self.physics_enabled = options.enabled;
        self.context.timestep = options.timestep;
        self.options = options;
    }

    /// Switch physics on or off without touching the options
    pub fn set_enabled(&mut self, enabled: bool, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        self.physics_enabled = enabled;
        if !enabled {
            self.stop(true, graph, sink);
        }
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn model_options(&self) -> &ModelOptions {
        &self.model
    }

    pub fn is_enabled(&self) -> bool {
        self.physics_enabled && self.options.enabled
    }

    pub fn timestep(&self) -> f64 {
        self.context.timestep
    }

    pub fn phase(&self) -> EnginePhase {
        self.context.stabilization.phase
    }

    pub fn is_stabilized(&self) -> bool {
        self.context.stabilization.stabilized
    }

    pub fn is_ready(&self) -> bool {
        self.context.stabilization.ready
    }

    pub fn stabilization_iterations(&self) -> usize {
        self.context.stabilization.iterations
    }

    pub fn last_outcome(&self) -> Option<StabilizationOutcome> {
        self.context.stabilization.last_outcome
    }

    pub fn body(&self) -> &PhysicsBody {
        &self.body
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Re-index the physics-relevant nodes and edges after a data change
    pub fn update_physics_data(&mut self, graph: &mut Graph) {
        graph.refresh_connectivity();
        self.body = PhysicsBody::rebuild(graph);
        self.context.snapshots.prune(&self.body);
        self.context.frozen.retain(|key, _| graph.node(*key).is_some());
    }

    /// Start-up after the initial data load
    pub fn init_physics(&mut self, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        if self.is_enabled() {
            if self.options.stabilization.enabled {
                self.stabilize(None, graph, sink);
            } else {
                self.context.stabilization.stabilized = false;
                self.context.stabilization.ready = true;
                sink.notify(PhysicsEvent::Fit);
                self.start_simulation(sink);
            }
        } else {
            self.context.stabilization.ready = true;
            sink.notify(PhysicsEvent::Fit);
        }
    }

    /// Advance whatever is running by one unit of work
    ///
    /// Deferred notifications from the previous poll are delivered first.
    pub fn poll(&mut self, graph: &mut Graph, sink: &mut dyn NotificationSink) -> EnginePhase {
        self.flush_deferred(sink);
        match self.phase() {
            EnginePhase::Stabilizing => self.stabilization_batch(graph, sink),
            EnginePhase::Simulating => self.simulation_step(graph, sink),
            EnginePhase::Idle => {}
        }
        self.phase()
    }

    /// Poll until the pending stabilization run ends and deliver everything it emitted
    pub fn run_to_stable(
        &mut self,
        graph: &mut Graph,
        sink: &mut dyn NotificationSink,
    ) -> Option<StabilizationOutcome> {
        while self.phase() == EnginePhase::Stabilizing {
            self.poll(graph, sink);
        }
        self.flush_deferred(sink);
        self.last_outcome()
    }

    fn flush_deferred(&mut self, sink: &mut dyn NotificationSink) {
        while let Some(event) = self.context.deferred.pop_front() {
            sink.notify(event);
        }
    }

    /// Enter live simulation
    pub fn start_simulation(&mut self, sink: &mut dyn NotificationSink) {
        if !self.is_enabled() {
            sink.notify(PhysicsEvent::Redraw);
            return;
        }
        self.context.stabilization.stabilized = false;
        // Live ticks always use the base timestep
        self.context.adaptive.active = false;
        if self.phase() != EnginePhase::Simulating {
            self.context.stabilization.phase = EnginePhase::Simulating;
            sink.notify(PhysicsEvent::StartRendering);
        }
    }

    /// Stop live simulation or cancel a pending stabilization run
    pub fn stop_simulation(&mut self, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        self.stop(true, graph, sink);
    }

    pub(crate) fn stop(&mut self, emit: bool, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        self.context.stabilization.stabilized = true;
        if emit {
            self.emit_stabilized();
        }
        match self.phase() {
            EnginePhase::Simulating => {
                self.context.stabilization.phase = EnginePhase::Idle;
                if emit {
                    sink.notify(PhysicsEvent::StopRendering);
                }
            }
            EnginePhase::Stabilizing => {
                debug!(
                    iterations = self.context.stabilization.iterations,
                    "cancelled pending stabilization"
                );
                self.context.stabilization.phase = EnginePhase::Idle;
                self.restore_frozen_nodes(graph);
                if emit {
                    sink.notify(PhysicsEvent::AllowRedraw);
                }
            }
            EnginePhase::Idle => {}
        }
    }

    /// One live tick; stops once the layout is stable
    pub fn simulation_step(&mut self, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        self.physics_tick(graph, sink);
        if self.is_stabilized() {
            self.stop(true, graph, sink);
        }
    }

    /// One tick, with an adaptive probe when one is due
    pub fn physics_tick(&mut self, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        self.start_stabilizing(sink);
        if self.is_stabilized() {
            return;
        }

        if self.context.adaptive.is_running() {
            if self.context.adaptive.is_due() {
                self.context.timestep *= 2.0;
                self.step(graph);
                self.revert(graph);

                self.context.timestep *= 0.5;
                self.step(graph);
                self.step(graph);

                let quality_ok = self.context.snapshots.quality_ok(graph);
                let previous = self.context.timestep;
                let adapted = self
                    .context
                    .adaptive
                    .adjust(previous, self.options.timestep, quality_ok);
                if adapted != previous {
                    debug!(from = previous, to = adapted, quality_ok, "adapted timestep");
                }
                self.context.timestep = adapted;
            } else {
                self.step(graph);
            }
            self.context.adaptive.counter += 1;
        } else {
            self.context.timestep = self.options.timestep;
            self.step(graph);
        }

        if self.is_stabilized() {
            self.revert(graph);
        }
        self.context.stabilization.iterations += 1;
    }

    /// Compute forces and move nodes once at the current timestep
    fn step(&mut self, graph: &mut Graph) {
        self.body.reset_forces();
        self.solvers.solve(graph, &mut self.body);

        let integrator = Integrator::new(
            self.model.damping,
            self.context.timestep,
            self.options.velocity_limit(),
        );
        let summary = integrator.move_nodes(
            graph,
            &mut self.body,
            self.options.wind,
            &mut self.context.snapshots,
        );
        self.context.adaptive.enabled = summary.average_velocity < ADAPTIVE_VELOCITY_THRESHOLD;
        self.context.stabilization.stabilized = summary.max_velocity < self.options.min_velocity;
    }

    /// Restore every node to its state before the last step
    pub fn revert(&mut self, graph: &mut Graph) {
        self.context.snapshots.revert(graph);
    }

    /// Apply an input notification
    pub fn handle(
        &mut self,
        command: PhysicsCommand,
        graph: &mut Graph,
        sink: &mut dyn NotificationSink,
    ) {
        debug!(?command, "physics command");
        match command {
            PhysicsCommand::DataChanged => self.update_physics_data(graph),
            PhysicsCommand::InitPhysics => self.init_physics(graph, sink),
            PhysicsCommand::Reset => {
                self.stop(true, graph, sink);
                self.context.stabilization.ready = false;
            }
            PhysicsCommand::Disable => {
                self.physics_enabled = false;
                self.stop(true, graph, sink);
            }
            PhysicsCommand::Restore => {
                self.apply_options(self.options.clone());
                if self.is_ready() {
                    self.start_simulation(sink);
                }
            }
            PhysicsCommand::Start => {
                if self.is_ready() {
                    self.start_simulation(sink);
                }
            }
            PhysicsCommand::Stop => self.stop(true, graph, sink),
            PhysicsCommand::Destroy => self.destroy(graph),
        }
    }

    /// Stop silently and clear all per-node physics state
    pub fn destroy(&mut self, graph: &mut Graph) {
        let mut discarded = Vec::new();
        self.stop(false, graph, &mut discarded);
        self.restore_frozen_nodes(graph);

        for node in graph.nodes_mut() {
            node.vx = 0.0;
            node.vy = 0.0;
        }
        self.body.reset_forces();
        self.context.snapshots.clear();
        self.context.deferred.clear();
        self.context.adaptive = AdaptiveTimestep::new(self.options.adaptive_timestep);
        self.context.timestep = self.options.timestep;
        debug!("physics state destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PhysicsEdge, PhysicsNode};
    use crate::options::SolverKind;

    /// Two nodes held exactly at rest length with every other force off
    fn resting_pair() -> (Graph, SimulationOptions) {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a").with_position(-100.0, 0.0));
        graph.add_node(PhysicsNode::new("b").with_position(100.0, 0.0));
        graph.add_edge(PhysicsEdge::new("ab", "a", "b"));

        let mut options = SimulationOptions {
            solver: SolverKind::Repulsion,
            min_velocity: 0.0,
            ..Default::default()
        };
        options.repulsion.central_gravity = 0.0;
        options.stabilization.update_interval = 1;
        (graph, options)
    }

    #[test]
    fn timestep_grows_every_interval_while_stable() {
        let (mut graph, options) = resting_pair();
        let mut engine = PhysicsEngine::new(options);
        engine.update_physics_data(&mut graph);
        let mut events = Vec::new();

        engine.stabilize(Some(8), &mut graph, &mut events);
        let mut timesteps = Vec::new();
        for _ in 0..8 {
            engine.poll(&mut graph, &mut events);
            timesteps.push(engine.timestep());
        }

        let expected = [0.5, 0.6, 0.6, 0.6, 0.72, 0.72, 0.72, 0.864];
        for (actual, expected) in timesteps.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-9, "{timesteps:?}");
        }
    }

    #[test]
    fn live_ticks_use_base_timestep() {
        let (mut graph, options) = resting_pair();
        let mut engine = PhysicsEngine::new(options);
        engine.update_physics_data(&mut graph);
        let mut events = Vec::new();

        engine.start_simulation(&mut events);
        for _ in 0..6 {
            engine.poll(&mut graph, &mut events);
        }

        assert_eq!(engine.timestep(), 0.5);
        assert_eq!(engine.phase(), EnginePhase::Simulating);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a"));
        graph.add_node(PhysicsNode::new("b").with_position(30.0, 0.0));
        let mut engine = PhysicsEngine::new(SimulationOptions::default());
        engine.update_physics_data(&mut graph);
        let mut events = Vec::new();

        engine.start_simulation(&mut events);
        engine.poll(&mut graph, &mut events);
        engine.poll(&mut graph, &mut events);
        engine.stop_simulation(&mut graph, &mut events);
        engine.poll(&mut graph, &mut events);

        let before = events.len();
        engine.stop_simulation(&mut graph, &mut events);
        engine.poll(&mut graph, &mut events);

        assert_eq!(events.len(), before);
        let stabilized = events
            .iter()
            .filter(|e| matches!(e, PhysicsEvent::Stabilized { .. }))
            .count();
        assert_eq!(stabilized, 1);
    }

    #[test]
    fn disable_and_restore() {
        let (mut graph, options) = resting_pair();
        let mut engine = PhysicsEngine::new(options);
        let mut events = Vec::new();
        engine.handle(PhysicsCommand::DataChanged, &mut graph, &mut events);
        engine.handle(PhysicsCommand::InitPhysics, &mut graph, &mut events);
        engine.run_to_stable(&mut graph, &mut events);
        assert!(engine.is_ready());

        engine.handle(PhysicsCommand::Disable, &mut graph, &mut events);
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert!(!engine.is_enabled());

        events.clear();
        engine.handle(PhysicsCommand::Start, &mut graph, &mut events);
        assert_eq!(events, vec![PhysicsEvent::Redraw]);

        engine.handle(PhysicsCommand::Restore, &mut graph, &mut events);
        assert_eq!(engine.phase(), EnginePhase::Simulating);
    }

    #[test]
    fn reset_clears_readiness() {
        let (mut graph, options) = resting_pair();
        let mut engine = PhysicsEngine::new(options);
        let mut events = Vec::new();
        engine.update_physics_data(&mut graph);
        engine.init_physics(&mut graph, &mut events);
        engine.run_to_stable(&mut graph, &mut events);

        engine.handle(PhysicsCommand::Reset, &mut graph, &mut events);
        engine.handle(PhysicsCommand::Start, &mut graph, &mut events);

        assert!(!engine.is_ready());
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[test]
    fn destroy_clears_node_state() {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a"));
        graph.add_node(PhysicsNode::new("b").with_position(5.0, 0.0));
        let mut engine = PhysicsEngine::new(SimulationOptions::default());
        engine.update_physics_data(&mut graph);
        let mut events = Vec::new();
        engine.start_simulation(&mut events);
        engine.poll(&mut graph, &mut events);
        assert!(graph.nodes().any(|(_, n)| n.speed() > 0.0));

        events.clear();
        engine.handle(PhysicsCommand::Destroy, &mut graph, &mut events);

        assert!(events.is_empty());
        assert!(graph.nodes().all(|(_, n)| n.speed() == 0.0));
        assert!(engine.context().snapshots.is_empty());
        assert_eq!(engine.phase(), EnginePhase::Idle);
    }

    #[test]
    fn removed_node_is_skipped_until_reindexed() {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a"));
        graph.add_node(PhysicsNode::new("b").with_position(40.0, 0.0));
        graph.add_node(PhysicsNode::new("c").with_position(0.0, 40.0));
        graph.add_edge(PhysicsEdge::new("ab", "a", "b"));
        let mut engine = PhysicsEngine::new(SimulationOptions::default());
        engine.update_physics_data(&mut graph);
        let mut events = Vec::new();
        engine.start_simulation(&mut events);

        graph.remove_node("b");
        engine.poll(&mut graph, &mut events);
        assert_eq!(engine.body().len(), 3);

        engine.handle(PhysicsCommand::DataChanged, &mut graph, &mut events);
        assert_eq!(engine.body().len(), 2);
        assert!(engine.body().edges.is_empty());
    }
}
