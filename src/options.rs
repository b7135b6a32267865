//! Simulation configuration
//!
//! Option names follow the camelCase keys used in options files, e.g.
//! `barnesHut.gravitationalConstant` or `stabilization.updateInterval`.

use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// Default Constants
// =============================================================================

/// Default integration timestep
pub const DEFAULT_TIMESTEP: f64 = 0.5;

/// Default velocity cap
pub const DEFAULT_MAX_VELOCITY: f64 = 50.0;

/// Default convergence threshold (max node speed)
pub const DEFAULT_MIN_VELOCITY: f64 = 0.75;

/// Velocity cap used when `maxVelocity` is unset or invalid
pub const UNBOUNDED_VELOCITY: f64 = 1e9;

/// Default stabilization budget
pub const DEFAULT_STABILIZATION_ITERATIONS: usize = 1000;

/// Default number of ticks per stabilization batch
pub const DEFAULT_UPDATE_INTERVAL: usize = 50;

/// Default Barnes-Hut theta (0 = exact)
pub const DEFAULT_THETA: f64 = 0.5;

/// Force solver family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolverKind {
    #[default]
    BarnesHut,
    Repulsion,
    HierarchicalRepulsion,
    ForceAtlas2Based,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BarnesHutOptions {
    pub theta: f64,
    /// Negative = repulsion
    pub gravitational_constant: f64,
    pub central_gravity: f64,
    pub spring_length: f64,
    pub spring_constant: f64,
    pub damping: f64,
    pub avoid_overlap: f64,
}

impl Default for BarnesHutOptions {
    fn default() -> Self {
        Self {
            theta: DEFAULT_THETA,
            gravitational_constant: -2000.0,
            central_gravity: 0.3,
            spring_length: 95.0,
            spring_constant: 0.04,
            damping: 0.09,
            avoid_overlap: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForceAtlas2Options {
    pub theta: f64,
    pub gravitational_constant: f64,
    pub central_gravity: f64,
    pub spring_length: f64,
    pub spring_constant: f64,
    pub damping: f64,
    pub avoid_overlap: f64,
}

impl Default for ForceAtlas2Options {
    fn default() -> Self {
        Self {
            theta: DEFAULT_THETA,
            gravitational_constant: -50.0,
            central_gravity: 0.01,
            spring_length: 100.0,
            spring_constant: 0.08,
            damping: 0.4,
            avoid_overlap: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RepulsionOptions {
    pub central_gravity: f64,
    pub spring_length: f64,
    pub spring_constant: f64,
    /// Range of the repulsion field
    pub node_distance: f64,
    pub damping: f64,
    pub avoid_overlap: f64,
}

impl Default for RepulsionOptions {
    fn default() -> Self {
        Self {
            central_gravity: 0.2,
            spring_length: 200.0,
            spring_constant: 0.05,
            node_distance: 100.0,
            damping: 0.09,
            avoid_overlap: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HierarchicalRepulsionOptions {
    pub central_gravity: f64,
    pub spring_length: f64,
    pub spring_constant: f64,
    pub node_distance: f64,
    pub damping: f64,
    pub avoid_overlap: f64,
}

impl Default for HierarchicalRepulsionOptions {
    fn default() -> Self {
        Self {
            central_gravity: 0.0,
            spring_length: 100.0,
            spring_constant: 0.01,
            node_distance: 120.0,
            damping: 0.09,
            avoid_overlap: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StabilizationOptions {
    pub enabled: bool,
    /// Iteration budget
    pub iterations: usize,
    /// Ticks per batch between progress notifications
    pub update_interval: usize,
    /// Freeze user-positioned nodes while stabilizing
    pub only_dynamic_edges: bool,
    /// Request a camera fit when done
    pub fit: bool,
}

impl Default for StabilizationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            iterations: DEFAULT_STABILIZATION_ITERATIONS,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            only_dynamic_edges: false,
            fit: true,
        }
    }
}

/// A 2D point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Complete simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationOptions {
    pub enabled: bool,
    pub solver: SolverKind,
    pub barnes_hut: BarnesHutOptions,
    pub force_atlas2_based: ForceAtlas2Options,
    pub repulsion: RepulsionOptions,
    pub hierarchical_repulsion: HierarchicalRepulsionOptions,
    /// Velocity cap; `0` disables it
    pub max_velocity: f64,
    /// Convergence threshold on the fastest node
    pub min_velocity: f64,
    pub timestep: f64,
    pub adaptive_timestep: bool,
    pub stabilization: StabilizationOptions,
    /// Constant force added to every node
    pub wind: Point,
    /// Target of central gravity; the origin when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<Point>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            solver: SolverKind::default(),
            barnes_hut: BarnesHutOptions::default(),
            force_atlas2_based: ForceAtlas2Options::default(),
            repulsion: RepulsionOptions::default(),
            hierarchical_repulsion: HierarchicalRepulsionOptions::default(),
            max_velocity: DEFAULT_MAX_VELOCITY,
            min_velocity: DEFAULT_MIN_VELOCITY,
            timestep: DEFAULT_TIMESTEP,
            adaptive_timestep: true,
            stabilization: StabilizationOptions::default(),
            wind: Point::default(),
            center: None,
        }
    }
}

impl SimulationOptions {
    /// Replace invalid numbers with safe defaults
    pub fn normalized(mut self) -> Self {
        if self.wind.x.is_nan() {
            warn!("wind.x is NaN, using 0");
            self.wind.x = 0.0;
        }
        if self.wind.y.is_nan() {
            warn!("wind.y is NaN, using 0");
            self.wind.y = 0.0;
        }
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            warn!(timestep = self.timestep, "invalid timestep, using default");
            self.timestep = DEFAULT_TIMESTEP;
        }
        if self.min_velocity.is_nan() {
            warn!("minVelocity is NaN, using default");
            self.min_velocity = DEFAULT_MIN_VELOCITY;
        }
        if self.stabilization.update_interval == 0 {
            warn!("stabilization.updateInterval is 0, using default");
            self.stabilization.update_interval = DEFAULT_UPDATE_INTERVAL;
        }
        if !self.barnes_hut.theta.is_finite() || self.barnes_hut.theta < 0.0 {
            warn!(theta = self.barnes_hut.theta, "invalid barnesHut.theta, using default");
            self.barnes_hut.theta = DEFAULT_THETA;
        }
        if !self.force_atlas2_based.theta.is_finite() || self.force_atlas2_based.theta < 0.0 {
            warn!(
                theta = self.force_atlas2_based.theta,
                "invalid forceAtlas2Based.theta, using default"
            );
            self.force_atlas2_based.theta = DEFAULT_THETA;
        }
        self
    }

    /// Effective velocity cap
    pub fn velocity_limit(&self) -> f64 {
        if self.max_velocity.is_finite() && self.max_velocity > 0.0 {
            self.max_velocity
        } else {
            UNBOUNDED_VELOCITY
        }
    }

    /// Parameters of the selected solver
    pub fn model_options(&self) -> ModelOptions {
        let center = self.center.unwrap_or_default();
        match self.solver {
            SolverKind::BarnesHut => {
                let o = &self.barnes_hut;
                ModelOptions {
                    theta: o.theta,
                    gravitational_constant: o.gravitational_constant,
                    central_gravity: o.central_gravity,
                    spring_length: o.spring_length,
                    spring_constant: o.spring_constant,
                    damping: o.damping,
                    avoid_overlap: o.avoid_overlap,
                    node_distance: 0.0,
                    center,
                }
            }
            SolverKind::ForceAtlas2Based => {
                let o = &self.force_atlas2_based;
                ModelOptions {
                    theta: o.theta,
                    gravitational_constant: o.gravitational_constant,
                    central_gravity: o.central_gravity,
                    spring_length: o.spring_length,
                    spring_constant: o.spring_constant,
                    damping: o.damping,
                    avoid_overlap: o.avoid_overlap,
                    node_distance: 0.0,
                    center,
                }
            }
            SolverKind::Repulsion => {
                let o = &self.repulsion;
                ModelOptions {
                    theta: 0.0,
                    gravitational_constant: 0.0,
                    central_gravity: o.central_gravity,
                    spring_length: o.spring_length,
                    spring_constant: o.spring_constant,
                    damping: o.damping,
                    avoid_overlap: o.avoid_overlap,
                    node_distance: o.node_distance,
                    center,
                }
            }
            SolverKind::HierarchicalRepulsion => {
                let o = &self.hierarchical_repulsion;
                ModelOptions {
                    theta: 0.0,
                    gravitational_constant: 0.0,
                    central_gravity: o.central_gravity,
                    spring_length: o.spring_length,
                    spring_constant: o.spring_constant,
                    damping: o.damping,
                    avoid_overlap: o.avoid_overlap,
                    node_distance: o.node_distance,
                    center,
                }
            }
        }
    }
}

/// Flattened parameters of the active solver, handed to every force solver
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub theta: f64,
    pub gravitational_constant: f64,
    pub central_gravity: f64,
    pub spring_length: f64,
    pub spring_constant: f64,
    pub damping: f64,
    pub avoid_overlap: f64,
    pub node_distance: f64,
    pub center: Point,
}

impl ModelOptions {
    /// 1 when overlap avoidance is off, 0 when it is at full strength
    pub fn overlap_avoidance_factor(&self) -> f64 {
        1.0 - self.avoid_overlap.clamp(0.0, 1.0)
    }
}
