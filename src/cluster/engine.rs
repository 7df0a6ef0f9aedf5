//! Density based clustering (DBSCAN) of stop events on the sphere.
use super::ClusterLabel;
use crate::{
    error::PortsError,
    geo::{haversine_angle, km_to_radians, BoundingBox, Hilbert2DRTreeView},
    stop::StopEvent,
};
use log::{debug, error, info, warn};
use std::{cmp::Ordering, collections::VecDeque};

/// Tuning for the density based clustering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Neighborhood radius in kilometers along the surface of the Earth.
    pub eps_km: f64,
    /// Neighbors (counting the point itself) needed to make a core point.
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            eps_km: 1.0,
            min_samples: 7,
        }
    }
}

impl ClusterParams {
    /// The neighborhood radius as an angle in radians.
    pub fn eps_radians(&self) -> f64 {
        km_to_radians(self.eps_km)
    }

    fn validate(&self) -> Result<(), PortsError> {
        if !(self.eps_km.is_finite() && self.eps_km > 0.0) {
            return Err(PortsError::InvalidParameter(format!(
                "eps_km must be a positive number, got {}",
                self.eps_km
            )));
        }

        if self.min_samples == 0 {
            return Err(PortsError::InvalidParameter(
                "min_samples must be at least 1".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Label every stop, one label per stop in the same order.
///
/// This never fails. With fewer stops than `min_samples` every stop is [ClusterLabel::Noise] and
/// the clustering is skipped. If the clustering itself fails every stop is labeled
/// [ClusterLabel::Failed] and the error is logged.
pub fn label_stops(stops: &[StopEvent], params: &ClusterParams) -> Vec<ClusterLabel> {
    if stops.is_empty() {
        return vec![];
    }

    if stops.len() < params.min_samples {
        warn!(
            "only {} stops, need at least {} to form a cluster, marking all as noise",
            stops.len(),
            params.min_samples
        );
        return vec![ClusterLabel::Noise; stops.len()];
    }

    match cluster_stops(stops, params) {
        Ok(labels) => labels,
        Err(err) => {
            error!("{}", err);
            vec![ClusterLabel::Failed; stops.len()]
        }
    }
}

/// Run DBSCAN over the stop centroids with the haversine distance.
///
/// Cluster ids are assigned in order of discovery while visiting the stops sorted by vessel id,
/// start time, and end time, so the labels do not depend on the order of `stops`.
pub fn cluster_stops(
    stops: &[StopEvent],
    params: &ClusterParams,
) -> Result<Vec<ClusterLabel>, PortsError> {
    params.validate()?;

    if stops.is_empty() {
        return Ok(vec![]);
    }

    if let Some(bad) = stops.iter().find(|s| !s.centroid.is_valid()) {
        return Err(PortsError::Clustering(format!(
            "vessel {} has a stop at an invalid position {}",
            bad.vessel_id, bad.centroid
        )));
    }

    let order = canonical_order(stops);
    let mut rank = vec![0; stops.len()];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }

    let tree = Hilbert2DRTreeView::build_for(stops, None)
        .ok_or_else(|| PortsError::Clustering("unable to build spatial index".to_owned()))?;
    debug!("spatial index built over {} stops", tree.len());

    let neighbors = Neighborhoods {
        stops,
        tree,
        rank,
        eps: params.eps_radians(),
        buffer: Vec::with_capacity(64),
    };

    let labels = dbscan(&order, neighbors, params.min_samples);

    let num_clusters = labels
        .iter()
        .filter_map(|l| l.cluster_id())
        .max()
        .map(|id| id + 1)
        .unwrap_or(0);
    let num_noise = labels.iter().filter(|&&l| l == ClusterLabel::Noise).count();
    info!(
        "found {} clusters among {} stops, {} stops are noise",
        num_clusters,
        stops.len(),
        num_noise
    );

    Ok(labels)
}

/// Indexes of `stops` sorted by vessel, start time, end time, then position.
fn canonical_order(stops: &[StopEvent]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..stops.len()).collect();
    order.sort_by(|&a, &b| compare_stops(&stops[a], &stops[b]).then(a.cmp(&b)));
    order
}

fn compare_stops(a: &StopEvent, b: &StopEvent) -> Ordering {
    a.vessel_id
        .cmp(&b.vessel_id)
        .then(a.start.cmp(&b.start))
        .then(a.end.cmp(&b.end))
}

/// Finds the epsilon neighborhood of a stop using the spatial index.
struct Neighborhoods<'a> {
    stops: &'a [StopEvent],
    tree: Hilbert2DRTreeView<'a, StopEvent>,
    rank: Vec<usize>,
    eps: f64,
    buffer: Vec<usize>,
}

impl<'a> Neighborhoods<'a> {
    /// All stops within eps of stop `i`, including itself, sorted by canonical rank.
    fn of(&mut self, i: usize) -> Vec<usize> {
        let center = self.stops[i].centroid;
        let window = BoundingBox::around(center, self.eps);
        self.tree.indexes_in(window, &mut self.buffer);

        let (lat1, lon1) = (center.lat.to_radians(), center.lon.to_radians());
        let stops = self.stops;
        let eps = self.eps;

        let mut found: Vec<usize> = self
            .buffer
            .iter()
            .copied()
            .filter(|&j| {
                let other = stops[j].centroid;
                haversine_angle(lat1, lon1, other.lat.to_radians(), other.lon.to_radians()) <= eps
            })
            .collect();

        let rank = &self.rank;
        found.sort_unstable_by_key(|&j| rank[j]);
        found
    }
}

fn dbscan(order: &[usize], mut neighbors: Neighborhoods, min_samples: usize) -> Vec<ClusterLabel> {
    let (labels, queued) = expand_clusters(order, &mut neighbors, min_samples);
    debug!("{} stops queued during cluster expansion", queued);
    labels
}

/// Labels every stop and counts how many entries went through the expansion queue.
///
/// A stop is labeled the moment it is queued, so it is queued at most once.
fn expand_clusters(
    order: &[usize],
    neighbors: &mut Neighborhoods,
    min_samples: usize,
) -> (Vec<ClusterLabel>, usize) {
    // None means not visited yet.
    let mut labels: Vec<Option<ClusterLabel>> = vec![None; order.len()];
    let mut next_id: u32 = 0;
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut queued = 0;

    for &p in order {
        if labels[p].is_some() {
            continue;
        }

        let seeds = neighbors.of(p);
        if seeds.len() < min_samples {
            // May still be claimed later as a border point.
            labels[p] = Some(ClusterLabel::Noise);
            continue;
        }

        let id = next_id;
        next_id += 1;
        labels[p] = Some(ClusterLabel::Cluster(id));

        queue.clear();
        queued += claim(&seeds, id, &mut labels, &mut queue);

        while let Some(q) = queue.pop_front() {
            let expansion = neighbors.of(q);
            if expansion.len() >= min_samples {
                queued += claim(&expansion, id, &mut labels, &mut queue);
            }
        }
    }

    let labels = labels
        .into_iter()
        .map(|l| l.unwrap_or(ClusterLabel::Noise))
        .collect();

    (labels, queued)
}

/// Pull the neighbors of a core point into cluster `id`.
///
/// Unvisited stops are queued for expansion. Noise stops become border points and are not queued,
/// they were already found not to be core points.
fn claim(
    found: &[usize],
    id: u32,
    labels: &mut [Option<ClusterLabel>],
    queue: &mut VecDeque<usize>,
) -> usize {
    let mut queued = 0;
    for &r in found {
        match labels[r] {
            None => {
                labels[r] = Some(ClusterLabel::Cluster(id));
                queue.push_back(r);
                queued += 1;
            }
            Some(ClusterLabel::Noise) => labels[r] = Some(ClusterLabel::Cluster(id)),
            Some(_) => {}
        }
    }
    queued
}
