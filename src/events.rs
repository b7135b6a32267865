//! Notifications in and out of the engine
//!
//! The engine never owns a channel. Hosts pass a [`NotificationSink`] into
//! every call that can emit, and feed input notifications through
//! [`PhysicsCommand`].

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, trace};

/// Notification emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PhysicsEvent {
    StartStabilizing,
    /// Sent once per stabilization batch
    StabilizationProgress { iterations: usize, total: usize },
    /// Sent exactly once per stabilization run
    StabilizationIterationsDone {
        iterations: usize,
        total: usize,
        converged: bool,
    },
    /// Deferred until the next poll
    Stabilized { iterations: usize },
    Fit,
    BlockRedraw,
    AllowRedraw,
    RequestRedraw,
    Redraw,
    StartRendering,
    StopRendering,
}

impl fmt::Display for PhysicsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartStabilizing => write!(f, "startStabilizing"),
            Self::StabilizationProgress { iterations, total } => {
                write!(f, "stabilizationProgress {iterations}/{total}")
            }
            Self::StabilizationIterationsDone {
                iterations, total, ..
            } => write!(f, "stabilizationIterationsDone {iterations}/{total}"),
            Self::Stabilized { iterations } => write!(f, "stabilized {iterations}"),
            Self::Fit => write!(f, "fit"),
            Self::BlockRedraw => write!(f, "blockRedraw"),
            Self::AllowRedraw => write!(f, "allowRedraw"),
            Self::RequestRedraw => write!(f, "requestRedraw"),
            Self::Redraw => write!(f, "redraw"),
            Self::StartRendering => write!(f, "startRendering"),
            Self::StopRendering => write!(f, "stopRendering"),
        }
    }
}

/// Input notification handled by [`crate::engine::PhysicsEngine::handle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsCommand {
    /// Nodes or edges were added, removed, hidden or clustered
    DataChanged,
    /// Initial data load finished
    InitPhysics,
    /// Stop and forget readiness
    Reset,
    /// Turn physics off until restored
    Disable,
    /// Re-apply the current options and resume if ready
    Restore,
    Start,
    Stop,
    /// Stop silently and clear all per-node physics state
    Destroy,
}

/// Receiver of engine notifications
pub trait NotificationSink {
    fn notify(&mut self, event: PhysicsEvent);
}

impl NotificationSink for Vec<PhysicsEvent> {
    fn notify(&mut self, event: PhysicsEvent) {
        self.push(event);
    }
}

/// Adapts a closure into a [`NotificationSink`]
pub struct FnSink<F>(pub F);

impl<F: FnMut(PhysicsEvent)> NotificationSink for FnSink<F> {
    fn notify(&mut self, event: PhysicsEvent) {
        (self.0)(event);
    }
}

/// Forwards notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&mut self, event: PhysicsEvent) {
        match event {
            PhysicsEvent::StabilizationProgress { iterations, total } => {
                trace!(iterations, total, "stabilization progress");
            }
            PhysicsEvent::StabilizationIterationsDone {
                iterations,
                total,
                converged,
            } => {
                info!(iterations, total, converged, "stabilization iterations done");
            }
            PhysicsEvent::Stabilized { iterations } => info!(iterations, "stabilized"),
            other => debug!(event = %other, "physics event"),
        }
    }
}
