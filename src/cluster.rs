/*!
 * Types and functions for working with clusters.
 *
 * A cluster is a dense group of stop events, made by any number of vessels, that marks a likely
 * port or anchorage.
 */
use crate::stop::StopEvent;
use std::fmt::{self, Display};

pub use engine::{cluster_stops, label_stops, ClusterParams};
pub use polygon::{build_polygon, Boundary, ClusterPolygon};
pub use summary::{summarize_cluster, ClusterSummary};

mod engine;
mod polygon;
mod summary;

/// The result of clustering a single stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterLabel {
    /// Member of the cluster with this id.
    Cluster(u32),
    /// Not dense enough to belong to any cluster.
    Noise,
    /// Clustering failed, so this stop could not be labeled.
    Failed,
}

impl ClusterLabel {
    /// Integer code used in exported tables, `-1` for noise and `-2` for a failed run.
    pub fn code(self) -> i64 {
        match self {
            Self::Cluster(id) => i64::from(id),
            Self::Noise => -1,
            Self::Failed => -2,
        }
    }

    /// Inverse of [ClusterLabel::code], unrecognized negative codes are treated as failures.
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => Self::Noise,
            c if c >= 0 && c <= i64::from(u32::MAX) => Self::Cluster(c as u32),
            _ => Self::Failed,
        }
    }

    /// The cluster id, if this stop belongs to a cluster.
    pub fn cluster_id(self) -> Option<u32> {
        match self {
            Self::Cluster(id) => Some(id),
            Self::Noise | Self::Failed => None,
        }
    }
}

impl Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Self::Cluster(id) => write!(f, "cluster {}", id),
            Self::Noise => write!(f, "noise"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A stop event joined with its cluster label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledStop {
    pub stop: StopEvent,
    pub label: ClusterLabel,
}
