//! Barnes-Hut quadtree and repulsion solver
//!
//! The quadtree recursively subdivides a square around all massed nodes. Each
//! branch stores the total mass and center of mass of its subtree. When a
//! branch is small compared to its distance from a node (`size / distance <
//! theta`) it is treated as a single point mass, reducing the pairwise
//! repulsion to O(n log n).
//!
//! The tree is rebuilt from current positions on every solver pass and dropped
//! afterwards.

use super::{ForceSolver, Particle, PhysicsBody};
use crate::graph::Graph;
use crate::options::ModelOptions;

/// Smallest root edge length, keeps a single-node tree non-degenerate
const MINIMUM_TREE_SIZE: f64 = 1e-5;

/// Depth at which two occupants are treated as coincident
const MAX_TREE_DEPTH: u32 = 96;

const ROOT: usize = 0;

/// Axis-aligned square covered by a branch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// What a branch holds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contents {
    Empty,
    Leaf(Particle),
    /// Children in NW, NE, SW, SE order
    Split([usize; 4]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub center_x: f64,
    pub center_y: f64,
    pub mass: f64,
    pub range: Range,
    pub size: f64,
    /// `1 / size`
    pub calc_size: f64,
    pub level: u32,
    pub contents: Contents,
}

impl Branch {
    fn new(range: Range, size: f64, level: u32) -> Self {
        Self {
            center_x: 0.0,
            center_y: 0.0,
            mass: 0.0,
            range,
            size,
            calc_size: 1.0 / size,
            level,
            contents: Contents::Empty,
        }
    }
}

/// Deterministic nudge sequence used to separate coincident nodes
#[derive(Debug, Clone)]
pub struct SeededJitter {
    seed: f64,
}

impl Default for SeededJitter {
    fn default() -> Self {
        Self { seed: 5.0 }
    }
}

impl SeededJitter {
    /// Next value in `[0, 1)`
    pub fn next_value(&mut self) -> f64 {
        let x = self.seed.sin() * 10000.0;
        self.seed += 1.0;
        x - x.floor()
    }
}

/// One branch (or leaf) acting on a particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    /// Vector from the particle to the branch's center of mass
    pub dx: f64,
    pub dy: f64,
    pub distance: f64,
    /// Mass of the branch
    pub mass: f64,
}

/// A quadtree over particle positions
#[derive(Debug, Clone)]
pub struct BarnesHutTree {
    branches: Vec<Branch>,
}

impl BarnesHutTree {
    /// Build the tree over all particles with positive mass
    ///
    /// Coincident particles are nudged apart in place, so callers must use the
    /// same slice afterwards when querying forces.
    pub fn build(particles: &mut [Particle], jitter: &mut SeededJitter) -> Self {
        let mut bounds: Option<Range> = None;
        for p in particles.iter().filter(|p| p.mass > 0.0) {
            bounds = Some(match bounds {
                None => Range {
                    min_x: p.x,
                    max_x: p.x,
                    min_y: p.y,
                    max_y: p.y,
                },
                Some(r) => Range {
                    min_x: r.min_x.min(p.x),
                    max_x: r.max_x.max(p.x),
                    min_y: r.min_y.min(p.y),
                    max_y: r.max_y.max(p.y),
                },
            });
        }
        let Range {
            mut min_x,
            mut max_x,
            mut min_y,
            mut max_y,
        } = bounds.unwrap_or(Range {
            min_x: 0.0,
            max_x: 0.0,
            min_y: 0.0,
            max_y: 0.0,
        });

        // Make it square
        let size_diff = (max_x - min_x).abs() - (max_y - min_y).abs();
        if size_diff > 0.0 {
            min_y -= 0.5 * size_diff;
            max_y += 0.5 * size_diff;
        } else {
            min_x += 0.5 * size_diff;
            max_x -= 0.5 * size_diff;
        }

        let root_size = MINIMUM_TREE_SIZE.max((max_x - min_x).abs());
        let half = 0.5 * root_size;
        let center_x = 0.5 * (min_x + max_x);
        let center_y = 0.5 * (min_y + max_y);
        let root = Branch::new(
            Range {
                min_x: center_x - half,
                max_x: center_x + half,
                min_y: center_y - half,
                max_y: center_y + half,
            },
            root_size,
            0,
        );

        let mut tree = Self {
            branches: Vec::with_capacity(particles.len() * 4 + 5),
        };
        tree.branches.push(root);
        tree.split(ROOT);

        for particle in particles.iter_mut().filter(|p| p.mass > 0.0) {
            tree.insert(particle, jitter);
        }
        tree.accumulate(ROOT);
        tree
    }

    pub fn root(&self) -> &Branch {
        &self.branches[ROOT]
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Number of occupied leaves
    pub fn leaf_count(&self) -> usize {
        self.branches
            .iter()
            .filter(|b| matches!(b.contents, Contents::Leaf(_)))
            .count()
    }

    /// Visit every branch that acts on `particle`
    ///
    /// A branch is taken as a whole when `distance / size > theta_inversed`;
    /// otherwise its children are visited. The particle's own leaf is skipped.
    pub fn for_each_interaction(
        &self,
        particle: &Particle,
        theta_inversed: f64,
        mut visit: impl FnMut(Interaction),
    ) {
        let mut stack: Vec<usize> = Vec::with_capacity(32);
        if let Contents::Split(children) = self.root().contents {
            stack.extend(children.iter().rev());
        }

        while let Some(idx) = stack.pop() {
            let branch = &self.branches[idx];
            if matches!(branch.contents, Contents::Empty) {
                continue;
            }

            let dx = branch.center_x - particle.x;
            let dy = branch.center_y - particle.y;
            let distance = (dx * dx + dy * dy).sqrt();
            let interaction = Interaction {
                dx,
                dy,
                distance,
                mass: branch.mass,
            };

            if distance * branch.calc_size > theta_inversed {
                visit(interaction);
                continue;
            }
            match branch.contents {
                Contents::Split(children) => stack.extend(children.iter().rev()),
                Contents::Leaf(occupant) if occupant.slot != particle.slot => visit(interaction),
                _ => {}
            }
        }
    }

    fn insert(&mut self, particle: &mut Particle, jitter: &mut SeededJitter) {
        let mut branch = ROOT;
        loop {
            let child = self.region_for(branch, particle);
            let contents = self.branches[child].contents;
            match contents {
                Contents::Empty => {
                    self.branches[child].contents = Contents::Leaf(*particle);
                    return;
                }
                Contents::Split(_) => branch = child,
                Contents::Leaf(occupant) => {
                    let coincident = occupant.x == particle.x && occupant.y == particle.y;
                    if coincident || self.branches[child].level >= MAX_TREE_DEPTH {
                        particle.x += jitter.next_value();
                        particle.y += jitter.next_value();
                        branch = ROOT;
                    } else {
                        self.split(child);
                        branch = child;
                    }
                }
            }
        }
    }

    /// Turn a branch into four children, moving its occupant down one level
    fn split(&mut self, idx: usize) {
        let Branch {
            range, size, level, ..
        } = self.branches[idx];
        let occupant = match self.branches[idx].contents {
            Contents::Leaf(p) => Some(p),
            _ => None,
        };

        let child_size = 0.5 * size;
        let mid_x = range.min_x + child_size;
        let mid_y = range.min_y + child_size;
        let quadrants = [
            // NW
            Range {
                min_x: range.min_x,
                max_x: mid_x,
                min_y: range.min_y,
                max_y: mid_y,
            },
            // NE
            Range {
                min_x: mid_x,
                max_x: range.max_x,
                min_y: range.min_y,
                max_y: mid_y,
            },
            // SW
            Range {
                min_x: range.min_x,
                max_x: mid_x,
                min_y: mid_y,
                max_y: range.max_y,
            },
            // SE
            Range {
                min_x: mid_x,
                max_x: range.max_x,
                min_y: mid_y,
                max_y: range.max_y,
            },
        ];

        let mut children = [0; 4];
        for (slot, quadrant) in children.iter_mut().zip(quadrants) {
            *slot = self.branches.len();
            self.branches
                .push(Branch::new(quadrant, child_size, level + 1));
        }
        self.branches[idx].contents = Contents::Split(children);

        if let Some(p) = occupant {
            let child = self.region_for(idx, &p);
            self.branches[child].contents = Contents::Leaf(p);
        }
    }

    /// Child of a split branch that `particle` falls into
    fn region_for(&self, idx: usize, particle: &Particle) -> usize {
        let Contents::Split(children) = self.branches[idx].contents else {
            unreachable!("region lookup on an unsplit branch");
        };
        let nw = self.branches[children[0]].range;
        let quadrant = match (nw.max_x > particle.x, nw.max_y > particle.y) {
            (true, true) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (false, false) => 3,
        };
        children[quadrant]
    }

    /// Fill in mass and center of mass bottom-up
    fn accumulate(&mut self, idx: usize) -> (f64, f64, f64) {
        let (mass, x, y) = match self.branches[idx].contents {
            Contents::Empty => (0.0, 0.0, 0.0),
            Contents::Leaf(p) => (p.mass, p.x, p.y),
            Contents::Split(children) => {
                let (mut mass, mut sum_x, mut sum_y) = (0.0, 0.0, 0.0);
                for child in children {
                    let (m, x, y) = self.accumulate(child);
                    mass += m;
                    sum_x += x * m;
                    sum_y += y * m;
                }
                if mass > 0.0 {
                    (mass, sum_x / mass, sum_y / mass)
                } else {
                    (0.0, 0.0, 0.0)
                }
            }
        };
        let branch = &mut self.branches[idx];
        branch.mass = mass;
        branch.center_x = x;
        branch.center_y = y;
        (mass, x, y)
    }
}

/// Separation used by the force laws: a zero distance becomes 0.1 along x,
/// and with overlap avoidance the node radius is taken off the distance.
pub(crate) fn separation(
    interaction: &Interaction,
    radius: f64,
    overlap_avoidance_factor: f64,
) -> (f64, f64, f64) {
    let (mut dx, dy, mut distance) = (interaction.dx, interaction.dy, interaction.distance);
    if distance == 0.0 {
        distance = 0.1;
        dx = distance;
    }
    if overlap_avoidance_factor < 1.0 && radius > 0.0 {
        distance = (0.1 + overlap_avoidance_factor * radius).max(distance - radius);
    }
    (dx, dy, distance)
}

/// Inverse-square repulsion over a Barnes-Hut tree
#[derive(Debug, Clone)]
pub struct BarnesHutSolver {
    theta_inversed: f64,
    gravitational_constant: f64,
    overlap_avoidance_factor: f64,
    jitter: SeededJitter,
}

impl BarnesHutSolver {
    pub fn new(model: &ModelOptions) -> Self {
        Self {
            theta_inversed: 1.0 / model.theta,
            gravitational_constant: model.gravitational_constant,
            overlap_avoidance_factor: model.overlap_avoidance_factor(),
            jitter: SeededJitter::default(),
        }
    }

    fn force_on(&self, tree: &BarnesHutTree, particle: &Particle) -> (f64, f64) {
        let (mut fx, mut fy) = (0.0, 0.0);
        tree.for_each_interaction(particle, self.theta_inversed, |interaction| {
            let (dx, dy, distance) =
                separation(&interaction, particle.radius, self.overlap_avoidance_factor);
            let gravity_force = self.gravitational_constant * interaction.mass * particle.mass
                / distance.powi(3);
            fx += dx * gravity_force;
            fy += dy * gravity_force;
        });
        (fx, fy)
    }
}

impl ForceSolver for BarnesHutSolver {
    fn name(&self) -> &'static str {
        "barnesHut"
    }

    fn solve(&mut self, graph: &Graph, body: &mut PhysicsBody) {
        if self.gravitational_constant == 0.0 || body.is_empty() {
            return;
        }
        let mut particles = body.particles(graph);
        let tree = BarnesHutTree::build(&mut particles, &mut self.jitter);

        for particle in particles.iter().filter(|p| p.mass > 0.0) {
            let (fx, fy) = self.force_on(&tree, particle);
            body.add_force(particle.slot, fx, fy);
        }
    }
}
