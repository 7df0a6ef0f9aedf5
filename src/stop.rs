/*!
 * Stop detection.
 *
 * Split the time ordered pings of a single vessel into segments wherever the vessel went quiet for
 * too long, and keep the segments that lasted long enough to count as a stop.
 */
use crate::{
    geo::{BoundingBox, Coord, Geo},
    ping::Ping,
};
use chrono::{DateTime, Duration, Utc};
use std::ops::Range;

/// Value used for a categorical field when no ping in a stop reported it.
pub const UNKNOWN: &str = "unknown";

/// Thresholds for segmenting pings into stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopParams {
    /// A segment must last at least this long to be kept. The boundary is inclusive.
    pub min_duration: Duration,
    /// A gap between consecutive pings strictly longer than this starts a new segment.
    pub max_gap: Duration,
}

impl Default for StopParams {
    fn default() -> Self {
        StopParams {
            min_duration: Duration::hours(1),
            max_gap: Duration::minutes(15),
        }
    }
}

/// A period during which a single vessel was effectively stationary.
#[derive(Debug, Clone, PartialEq)]
pub struct StopEvent {
    pub vessel_id: u64,
    /// Mean position of the pings in the stop.
    pub centroid: Coord,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub ping_count: usize,
    pub ship_type: String,
    pub nav_status: String,
}

impl StopEvent {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl Geo for StopEvent {
    fn centroid(&self) -> Coord {
        self.centroid
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_coord(self.centroid)
    }
}

/// Partition pings into contiguous index ranges.
///
/// A new range starts at the first ping and wherever the gap from the previous ping is strictly
/// greater than `max_gap`. The pings must already be sorted by time. Every ping lands in exactly
/// one range.
pub fn segment_ranges(pings: &[Ping], max_gap: Duration) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    if pings.is_empty() {
        return ranges;
    }

    let mut start = 0;
    for (i, pair) in pings.windows(2).enumerate() {
        if pair[1].timestamp - pair[0].timestamp > max_gap {
            ranges.push(start..(i + 1));
            start = i + 1;
        }
    }
    ranges.push(start..pings.len());

    ranges
}

/// Find the stops made by a single vessel.
///
/// `pings` must all belong to `vessel_id` and be sorted ascending by time. Segments shorter than
/// `params.min_duration` are discarded.
pub fn detect_stops(vessel_id: u64, pings: &[Ping], params: &StopParams) -> Vec<StopEvent> {
    segment_ranges(pings, params.max_gap)
        .into_iter()
        .map(|range| &pings[range])
        .filter(|segment| segment_duration(segment) >= params.min_duration)
        .map(|segment| build_stop(vessel_id, segment))
        .collect()
}

fn segment_duration(segment: &[Ping]) -> Duration {
    match (segment.first(), segment.last()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => Duration::zero(),
    }
}

fn first_present<'a, F>(segment: &'a [Ping], field: F) -> String
where
    F: Fn(&'a Ping) -> Option<&'a String>,
{
    segment
        .iter()
        .find_map(field)
        .map(String::clone)
        .unwrap_or_else(|| UNKNOWN.to_owned())
}

/// Only called with non-empty segments.
fn build_stop(vessel_id: u64, segment: &[Ping]) -> StopEvent {
    let n = segment.len();
    let (sum_lat, sum_lon) = segment
        .iter()
        .fold((0.0, 0.0), |(lat, lon), ping| (lat + ping.lat, lon + ping.lon));

    let start = segment[0].timestamp;
    let end = segment[n - 1].timestamp;

    StopEvent {
        vessel_id,
        centroid: Coord {
            lat: sum_lat / n as f64,
            lon: sum_lon / n as f64,
        },
        start,
        end,
        ping_count: n,
        ship_type: first_present(segment, |p| p.ship_type.as_ref()),
        nav_status: first_present(segment, |p| p.nav_status.as_ref()),
    }
}
