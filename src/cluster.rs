//! Cluster bookkeeping
//!
//! Clustering replaces a set of nodes with one ordinary massed node. The
//! members stay in the graph but are flagged as absorbed, so the physics index
//! skips them. Edges between members are marked as contained; edges from a
//! member to the outside are hidden and mirrored by an edge from the cluster.
//!
//! ```
//! use netlayout::graph::{Graph, PhysicsEdge, PhysicsNode};
//!
//! let mut graph = Graph::new();
//! graph.add_node(PhysicsNode::new("a").with_mass(2.0));
//! graph.add_node(PhysicsNode::new("b").with_position(30.0, 0.0));
//! graph.add_edge(PhysicsEdge::new("ab", "a", "b"));
//!
//! graph.cluster("ab-cluster", &["a", "b"]).unwrap();
//! let cluster = graph.node_by_id("ab-cluster").unwrap();
//! assert_eq!(cluster.mass(), 3.0);
//! assert_eq!(cluster.x, 10.0);
//!
//! graph.open_cluster("ab-cluster").unwrap();
//! assert_eq!(graph.node_by_id("b").unwrap().x, 30.0);
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::graph::{Graph, NodeKey, PhysicsEdge, PhysicsNode};

/// Errors from clustering operations
#[derive(Error, Debug, PartialEq)]
pub enum ClusterError {
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("A node with id '{0}' already exists")]
    DuplicateId(String),

    #[error("Cluster '{0}' has no members")]
    EmptyCluster(String),

    #[error("Node '{node}' is already part of cluster '{cluster}'")]
    AlreadyClustered { node: String, cluster: String },

    #[error("'{0}' is not a cluster")]
    NotACluster(String),

    #[error("Cluster '{cluster}' is contained in cluster '{parent}'")]
    Nested { cluster: String, parent: String },
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// What a cluster absorbed, kept so it can be opened again
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterRecord {
    /// Member ID and its offset from the cluster position at creation
    pub(crate) members: Vec<(String, f64, f64)>,
    /// Edges between two members
    pub(crate) contained_edges: Vec<String>,
    /// Edges from a member to the outside
    pub(crate) replaced_edges: Vec<String>,
    /// Edges created to stand in for `replaced_edges`
    pub(crate) cluster_edges: Vec<String>,
}

impl Graph {
    /// Collapse `members` into a new node `cluster_id`
    pub fn cluster(&mut self, cluster_id: &str, members: &[&str]) -> ClusterResult<NodeKey> {
        if self.key_of(cluster_id).is_some() {
            return Err(ClusterError::DuplicateId(cluster_id.to_string()));
        }
        let mut seen = HashSet::new();
        let member_ids: Vec<&str> = members.iter().copied().filter(|id| seen.insert(*id)).collect();
        if member_ids.is_empty() {
            return Err(ClusterError::EmptyCluster(cluster_id.to_string()));
        }

        let mut absorbed = Vec::with_capacity(member_ids.len());
        for id in &member_ids {
            let node = self
                .node_by_id(id)
                .ok_or_else(|| ClusterError::UnknownNode(id.to_string()))?;
            if let Some(cluster) = node.cluster() {
                return Err(ClusterError::AlreadyClustered {
                    node: id.to_string(),
                    cluster: cluster.to_string(),
                });
            }
            absorbed.push(node);
        }

        let mass: f64 = absorbed.iter().map(|n| n.mass()).sum();
        let center_x = absorbed.iter().map(|n| n.x * n.mass()).sum::<f64>() / mass;
        let center_y = absorbed.iter().map(|n| n.y * n.mass()).sum::<f64>() / mass;
        let velocity_x = absorbed.iter().map(|n| n.vx * n.mass()).sum::<f64>() / mass;
        let velocity_y = absorbed.iter().map(|n| n.vy * n.mass()).sum::<f64>() / mass;
        let radius = absorbed.iter().map(|n| n.radius).fold(0.0, f64::max);
        let level = absorbed.iter().filter_map(|n| n.level).min();

        let mut record = ClusterRecord {
            members: absorbed
                .iter()
                .map(|n| (n.id.clone(), n.x - center_x, n.y - center_y))
                .collect(),
            ..Default::default()
        };

        let member_set: HashSet<&str> = member_ids.iter().copied().collect();
        let mut new_edges = Vec::new();
        for (_, edge) in self.edges() {
            if edge.is_clustered() {
                continue;
            }
            let from_inside = member_set.contains(edge.from.as_str());
            let to_inside = member_set.contains(edge.to.as_str());
            match (from_inside, to_inside) {
                (true, true) => record.contained_edges.push(edge.id.clone()),
                (false, false) => {}
                _ => {
                    record.replaced_edges.push(edge.id.clone());
                    let mut replacement = PhysicsEdge::new(
                        format!("{cluster_id}:{}", edge.id),
                        if from_inside { cluster_id } else { edge.from.as_str() },
                        if to_inside { cluster_id } else { edge.to.as_str() },
                    );
                    replacement.length = edge.length;
                    replacement.spring_constant = edge.spring_constant;
                    replacement.physics = edge.physics;
                    replacement.hidden = edge.hidden;
                    new_edges.push(replacement);
                }
            }
        }

        let mut cluster = PhysicsNode::new(cluster_id)
            .with_mass(mass)
            .with_radius(radius);
        cluster.x = center_x;
        cluster.y = center_y;
        cluster.vx = velocity_x;
        cluster.vy = velocity_y;
        cluster.level = level;
        let key = self.add_node(cluster);

        for id in &member_ids {
            if let Some(node) = self.node_by_id_mut(id) {
                node.cluster = Some(cluster_id.to_string());
            }
        }
        for id in record.contained_edges.iter().chain(&record.replaced_edges) {
            if let Some(edge) = self.edge_by_id_mut(id) {
                edge.clustered = true;
            }
        }
        for edge in new_edges {
            record.cluster_edges.push(edge.id.clone());
            self.add_edge(edge);
        }

        debug!(
            cluster = cluster_id,
            members = member_ids.len(),
            contained = record.contained_edges.len(),
            replaced = record.replaced_edges.len(),
            "created cluster"
        );
        self.clusters.insert(cluster_id.to_string(), record);
        self.refresh_connectivity();
        Ok(key)
    }

    /// Release the members of a cluster and remove the cluster node
    ///
    /// Members return to the cluster's current position plus their offset at
    /// creation time and inherit its velocity. Fixed axes are left untouched.
    pub fn open_cluster(&mut self, cluster_id: &str) -> ClusterResult<()> {
        let node = self
            .node_by_id(cluster_id)
            .filter(|_| self.is_cluster(cluster_id))
            .ok_or_else(|| ClusterError::NotACluster(cluster_id.to_string()))?;
        if let Some(parent) = node.cluster() {
            return Err(ClusterError::Nested {
                cluster: cluster_id.to_string(),
                parent: parent.to_string(),
            });
        }
        let (x, y, vx, vy) = (node.x, node.y, node.vx, node.vy);
        let Some(record) = self.clusters.remove(cluster_id) else {
            return Err(ClusterError::NotACluster(cluster_id.to_string()));
        };

        for (id, offset_x, offset_y) in &record.members {
            let Some(member) = self.node_by_id_mut(id) else {
                continue;
            };
            member.cluster = None;
            if !member.fixed.x {
                member.x = x + offset_x;
                member.vx = vx;
            }
            if !member.fixed.y {
                member.y = y + offset_y;
                member.vy = vy;
            }
        }
        for id in &record.cluster_edges {
            self.remove_edge(id);
        }
        for id in record.contained_edges.iter().chain(&record.replaced_edges) {
            if let Some(edge) = self.edge_by_id_mut(id) {
                edge.clustered = false;
            }
        }
        self.remove_node(cluster_id);

        debug!(cluster = cluster_id, members = record.members.len(), "opened cluster");
        self.refresh_connectivity();
        Ok(())
    }

    pub fn is_cluster(&self, id: &str) -> bool {
        self.clusters.contains_key(id)
    }

    /// IDs of the direct members of a cluster
    pub fn nodes_in_cluster(&self, cluster_id: &str) -> ClusterResult<Vec<String>> {
        self.clusters
            .get(cluster_id)
            .map(|record| record.members.iter().map(|(id, _, _)| id.clone()).collect())
            .ok_or_else(|| ClusterError::NotACluster(cluster_id.to_string()))
    }

    /// Chain of clusters containing a node, outermost first, ending with the node itself
    ///
    /// Empty when the node does not exist.
    pub fn find_node(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.node_by_id(id);
        while let Some(node) = current {
            chain.push(node.id.clone());
            current = node.cluster().and_then(|cluster| self.node_by_id(cluster));
        }
        chain.reverse();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FixedAxes;

    /// a - b - c - d, with a-b clustered in most tests
    fn chain() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(PhysicsNode::new("a").with_position(0.0, 0.0));
        graph.add_node(PhysicsNode::new("b").with_position(20.0, 0.0).with_mass(3.0));
        graph.add_node(PhysicsNode::new("c").with_position(100.0, 0.0).with_radius(12.0));
        graph.add_node(PhysicsNode::new("d").with_position(200.0, 0.0));
        graph.add_edge(PhysicsEdge::new("ab", "a", "b"));
        graph.add_edge(PhysicsEdge::new("bc", "b", "c").with_length(40.0));
        graph.add_edge(PhysicsEdge::new("cd", "c", "d"));
        graph.refresh_connectivity();
        graph
    }

    #[test]
    fn cluster_aggregates_members() {
        let mut graph = chain();
        graph.cluster("ab", &["a", "b"]).unwrap();

        let cluster = graph.node_by_id("ab").unwrap();
        assert_eq!(cluster.mass(), 4.0);
        assert_eq!(cluster.x, 15.0);
        assert!(cluster.is_physics_relevant());
        assert!(!graph.node_by_id("a").unwrap().is_physics_relevant());
        assert_eq!(graph.node_by_id("a").unwrap().cluster(), Some("ab"));
    }

    #[test]
    fn cluster_rewires_external_edges() {
        let mut graph = chain();
        graph.cluster("ab", &["a", "b"]).unwrap();

        assert!(graph.edge_by_id("ab").unwrap().is_clustered());
        assert!(graph.edge_by_id("bc").unwrap().is_clustered());
        let replacement = graph.edge_by_id("ab:bc").unwrap();
        assert_eq!(replacement.from, "ab");
        assert_eq!(replacement.to, "c");
        assert_eq!(replacement.length, Some(40.0));
        assert!(replacement.is_physics_relevant());
    }

    #[test]
    fn open_restores_offsets_and_edges() {
        let mut graph = chain();
        graph.cluster("ab", &["a", "b"]).unwrap();
        {
            let cluster = graph.node_by_id_mut("ab").unwrap();
            cluster.x += 100.0;
            cluster.vx = 2.0;
        }

        graph.open_cluster("ab").unwrap();

        let a = graph.node_by_id("a").unwrap();
        let b = graph.node_by_id("b").unwrap();
        assert_eq!((a.x, b.x), (100.0, 120.0));
        assert_eq!(a.vx, 2.0);
        assert!(a.is_physics_relevant());
        assert!(graph.node_by_id("ab").is_none());
        assert!(graph.edge_by_id("ab:bc").is_none());
        assert!(graph.edge_by_id("bc").unwrap().is_physics_relevant());
        assert!(!graph.is_cluster("ab"));
    }

    #[test]
    fn open_leaves_fixed_axes_alone() {
        let mut graph = chain();
        graph.node_by_id_mut("a").unwrap().fixed = FixedAxes::BOTH;
        graph.cluster("ab", &["a", "b"]).unwrap();
        graph.node_by_id_mut("ab").unwrap().x = 500.0;

        graph.open_cluster("ab").unwrap();

        assert_eq!(graph.node_by_id("a").unwrap().x, 0.0);
        assert_eq!(graph.node_by_id("b").unwrap().x, 505.0);
    }

    #[test]
    fn nested_clusters() {
        let mut graph = chain();
        graph.cluster("ab", &["a", "b"]).unwrap();
        graph.cluster("abc", &["ab", "c"]).unwrap();

        assert_eq!(graph.find_node("a"), vec!["abc", "ab", "a"]);
        assert_eq!(graph.nodes_in_cluster("abc").unwrap(), vec!["ab", "c"]);
        assert_eq!(
            graph.open_cluster("ab"),
            Err(ClusterError::Nested {
                cluster: "ab".to_string(),
                parent: "abc".to_string(),
            })
        );
        // The outer cluster carries the replacement of the replacement
        assert!(graph.edge_by_id("abc:cd").is_some());

        graph.open_cluster("abc").unwrap();
        graph.open_cluster("ab").unwrap();
        assert!(graph.edge_by_id("ab").unwrap().is_physics_relevant());
        assert!(graph.edge_by_id("cd").unwrap().is_physics_relevant());
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn cluster_errors() {
        let mut graph = chain();
        assert_eq!(
            graph.cluster("a", &["b"]),
            Err(ClusterError::DuplicateId("a".to_string()))
        );
        assert_eq!(
            graph.cluster("x", &[]),
            Err(ClusterError::EmptyCluster("x".to_string()))
        );
        assert_eq!(
            graph.cluster("x", &["a", "zzz"]),
            Err(ClusterError::UnknownNode("zzz".to_string()))
        );
        assert_eq!(
            graph.open_cluster("a"),
            Err(ClusterError::NotACluster("a".to_string()))
        );

        graph.cluster("ab", &["a", "b"]).unwrap();
        assert!(matches!(
            graph.cluster("again", &["a"]),
            Err(ClusterError::AlreadyClustered { .. })
        ));
        assert!(graph.find_node("missing").is_empty());
    }
}
