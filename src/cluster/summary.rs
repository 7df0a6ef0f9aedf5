//! Descriptive statistics of the stops in a cluster.
use crate::{
    geo::Coord,
    stop::{StopEvent, UNKNOWN},
};
use chrono::Duration;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// Aggregate description of one cluster, a candidate port.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster_id: u32,
    /// Mean of the member stop centroids.
    pub centroid: Coord,
    pub unique_vessel_count: usize,
    pub mean_duration: Duration,
    pub total_duration: Duration,
    pub stop_count: usize,
    pub dominant_ship_type: String,
    pub dominant_nav_status: String,
    /// Ship type counts like `"Cargo: 3, Tanker: 1"`, most common first.
    pub ship_type_histogram: String,
}

/// Summarize the stops that make up a cluster.
///
/// Members are considered in order of vessel id then start time, which decides ties for the
/// dominant values and the histogram. An empty member list gives zero counts, zero durations, and
/// a NaN centroid.
pub fn summarize_cluster(cluster_id: u32, members: &[&StopEvent]) -> ClusterSummary {
    let mut members: Vec<&StopEvent> = members.to_vec();
    members.sort_by(|a, b| a.vessel_id.cmp(&b.vessel_id).then(a.start.cmp(&b.start)));

    let stop_count = members.len();

    let (sum_lat, sum_lon) = members.iter().fold((0.0, 0.0), |(lat, lon), s| {
        (lat + s.centroid.lat, lon + s.centroid.lon)
    });
    let centroid = Coord {
        lat: sum_lat / stop_count as f64,
        lon: sum_lon / stop_count as f64,
    };

    let unique_vessel_count = members
        .iter()
        .map(|s| s.vessel_id)
        .collect::<HashSet<u64>>()
        .len();

    let total_duration = members
        .iter()
        .fold(Duration::zero(), |acc, s| acc + s.duration());
    let mean_duration = if stop_count > 0 {
        total_duration / stop_count as i32
    } else {
        Duration::zero()
    };

    let ship_types = ValueCounts::tally(members.iter().map(|s| s.ship_type.as_str()));
    let nav_statuses = ValueCounts::tally(members.iter().map(|s| s.nav_status.as_str()));

    ClusterSummary {
        cluster_id,
        centroid,
        unique_vessel_count,
        mean_duration,
        total_duration,
        stop_count,
        dominant_ship_type: ship_types.mode().to_owned(),
        dominant_nav_status: nav_statuses.mode().to_owned(),
        ship_type_histogram: ship_types.histogram(),
    }
}

/// Counts of categorical values, most common first with ties in order of first appearance.
struct ValueCounts<'a>(Vec<(&'a str, usize)>);

impl<'a> ValueCounts<'a> {
    fn tally<I: Iterator<Item = &'a str>>(values: I) -> Self {
        let mut positions: HashMap<&str, usize> = HashMap::default();
        let mut counts: Vec<(&str, usize)> = vec![];

        for value in values {
            let pos = *positions.entry(value).or_insert_with(|| {
                counts.push((value, 0));
                counts.len() - 1
            });
            counts[pos].1 += 1;
        }

        // Stable, so equal counts stay in encounter order.
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        ValueCounts(counts)
    }

    fn mode(&self) -> &'a str {
        self.0.first().map(|(value, _)| *value).unwrap_or(UNKNOWN)
    }

    fn histogram(&self) -> String {
        self.0
            .iter()
            .map(|(value, count)| format!("{}: {}", value, count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
