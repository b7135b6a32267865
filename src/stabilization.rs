//! Stabilization run: batched ticks until convergence or the budget runs out
//!
//! A run is entered with [`PhysicsEngine::stabilize`] and then advanced one
//! batch per [`PhysicsEngine::poll`]. Each batch runs at most
//! `stabilization.updateInterval` ticks and reports progress, which leaves the
//! host free to do other work between batches. When the run ends the engine
//! either settles (converged) or hands off to live simulation (budget
//! exhausted).

use tracing::{debug, info, trace};

use crate::engine::PhysicsEngine;
use crate::events::{NotificationSink, PhysicsEvent};
use crate::graph::{FixedAxes, Graph};

/// What the engine is currently driving
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnginePhase {
    #[default]
    Idle,
    /// A stabilization run is pending; each poll runs one batch
    Stabilizing,
    /// Live simulation; each poll runs one tick
    Simulating,
}

/// How a stabilization run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizationOutcome {
    /// The fastest node fell below `minVelocity`
    Converged { iterations: usize },
    /// The iteration budget ran out first
    BudgetExhausted { iterations: usize },
}

impl StabilizationOutcome {
    pub fn iterations(self) -> usize {
        match self {
            Self::Converged { iterations } | Self::BudgetExhausted { iterations } => iterations,
        }
    }

    pub fn is_converged(self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Counters and flags of the current (or last) run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StabilizationState {
    pub phase: EnginePhase,
    /// The fastest node moved slower than `minVelocity` on the last step
    pub stabilized: bool,
    /// `startStabilizing` was emitted and no `stabilized` has followed yet
    pub started: bool,
    pub iterations: usize,
    pub target_iterations: usize,
    /// Initial stabilization finished; live simulation may be started
    pub ready: bool,
    pub last_outcome: Option<StabilizationOutcome>,
}

impl StabilizationState {
    /// More ticks are needed
    pub fn is_running(&self) -> bool {
        !self.stabilized && self.iterations < self.target_iterations
    }
}

impl PhysicsEngine {
    /// Begin a stabilization run of at most `iterations` ticks
    ///
    /// `None` uses `stabilization.iterations`. Ignored while a run is already
    /// pending. With nothing to move the run completes immediately as converged.
    pub fn stabilize(
        &mut self,
        iterations: Option<usize>,
        graph: &mut Graph,
        sink: &mut dyn NotificationSink,
    ) {
        if self.phase() == EnginePhase::Stabilizing {
            debug!("stabilization already running, ignoring request");
            return;
        }
        let target = iterations.unwrap_or(self.options().stabilization.iterations);

        if self.nothing_to_move(graph) {
            info!("no movable nodes, stabilization is trivially complete");
            let was_simulating = self.phase() == EnginePhase::Simulating;
            self.stop(false, graph, sink);
            if was_simulating {
                sink.notify(PhysicsEvent::StopRendering);
            }
            let state = &mut self.context.stabilization;
            state.started = false;
            state.ready = true;
            state.stabilized = true;
            state.iterations = 0;
            state.target_iterations = target;
            state.last_outcome = Some(StabilizationOutcome::Converged { iterations: 0 });
            sink.notify(PhysicsEvent::StabilizationIterationsDone {
                iterations: 0,
                total: target,
                converged: true,
            });
            self.context
                .deferred
                .push_back(PhysicsEvent::Stabilized { iterations: 0 });
            return;
        }

        self.context.adaptive.active = self.options().adaptive_timestep;
        self.stop(true, graph, sink);
        self.context.stabilization.stabilized = false;
        sink.notify(PhysicsEvent::BlockRedraw);
        self.context.stabilization.target_iterations = target;
        if self.options().stabilization.only_dynamic_edges {
            self.freeze_nodes(graph);
        }
        self.context.stabilization.iterations = 0;
        self.context.stabilization.phase = EnginePhase::Stabilizing;

        info!(
            target,
            nodes = self.body().len(),
            solver = ?self.options().solver,
            "stabilization started"
        );
    }

    /// Emit `startStabilizing` once per run
    pub(crate) fn start_stabilizing(&mut self, sink: &mut dyn NotificationSink) -> bool {
        if self.context.stabilization.started {
            return false;
        }
        sink.notify(PhysicsEvent::StartStabilizing);
        self.context.stabilization.started = true;
        true
    }

    /// Run up to one batch of ticks, finishing the run when it stops
    pub(crate) fn stabilization_batch(&mut self, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        if self.start_stabilizing(sink) {
            self.send_progress(sink);
        }

        let batch = self.options().stabilization.update_interval;
        let mut count = 0;
        while self.context.stabilization.is_running() && count < batch {
            self.physics_tick(graph, sink);
            count += 1;
        }
        self.send_progress(sink);
        trace!(
            ticks = count,
            iterations = self.context.stabilization.iterations,
            timestep = self.context.timestep,
            "stabilization batch"
        );

        if !self.context.stabilization.is_running() {
            self.finalize_stabilization(graph, sink);
        }
    }

    fn send_progress(&self, sink: &mut dyn NotificationSink) {
        let state = &self.context.stabilization;
        sink.notify(PhysicsEvent::StabilizationProgress {
            iterations: state.iterations,
            total: state.target_iterations,
        });
    }

    fn finalize_stabilization(&mut self, graph: &mut Graph, sink: &mut dyn NotificationSink) {
        self.context.stabilization.phase = EnginePhase::Idle;
        sink.notify(PhysicsEvent::AllowRedraw);
        if self.options().stabilization.fit {
            sink.notify(PhysicsEvent::Fit);
        }
        self.restore_frozen_nodes(graph);

        let state = &self.context.stabilization;
        let (iterations, total, converged) =
            (state.iterations, state.target_iterations, state.stabilized);
        sink.notify(PhysicsEvent::StabilizationIterationsDone {
            iterations,
            total,
            converged,
        });
        sink.notify(PhysicsEvent::RequestRedraw);

        let outcome = if converged {
            self.emit_stabilized();
            StabilizationOutcome::Converged { iterations }
        } else {
            self.start_simulation(sink);
            StabilizationOutcome::BudgetExhausted { iterations }
        };
        self.context.stabilization.ready = true;
        self.context.stabilization.last_outcome = Some(outcome);

        info!(iterations, total, converged, "stabilization finished");
    }

    /// Queue the `stabilized` notification for the next poll
    ///
    /// Only a run that actually ticked reports, and the counters reset right
    /// away so a repeated stop stays silent.
    pub(crate) fn emit_stabilized(&mut self) {
        let state = &mut self.context.stabilization;
        if state.iterations > 1 || state.started {
            self.context.deferred.push_back(PhysicsEvent::Stabilized {
                iterations: state.iterations,
            });
            state.started = false;
            state.iterations = 0;
        }
    }

    /// No physics node, or every physics node is fixed on both axes
    fn nothing_to_move(&self, graph: &Graph) -> bool {
        self.body()
            .node_keys
            .iter()
            .filter_map(|key| graph.node(*key))
            .all(|node| node.fixed.is_fully_fixed())
    }

    /// Pin every user-positioned node for an only-dynamic-edges run
    fn freeze_nodes(&mut self, graph: &mut Graph) {
        for (key, node) in graph.nodes() {
            if node.positioned {
                self.context.frozen.entry(key).or_insert(node.fixed);
            }
        }
        for key in self.context.frozen.keys() {
            if let Some(node) = graph.node_mut(*key) {
                node.fixed = FixedAxes::BOTH;
            }
        }
        debug!(frozen = self.context.frozen.len(), "froze positioned nodes");
    }

    pub(crate) fn restore_frozen_nodes(&mut self, graph: &mut Graph) {
        for (key, fixed) in self.context.frozen.drain() {
            if let Some(node) = graph.node_mut(key) {
                node.fixed = fixed;
            }
        }
    }
}
