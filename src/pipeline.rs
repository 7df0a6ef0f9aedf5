/*!
 * Wire the stages together: pings to stops, stops to clusters, clusters to ports.
 */
use crate::{
    cluster::{
        build_polygon, label_stops, summarize_cluster, Boundary, ClusterLabel, ClusterParams,
        ClusterPolygon, ClusterSummary, LabeledStop,
    },
    database::PortsDatabase,
    error::PortsError,
    geo::great_circle_distance,
    kml::save_ports_kml,
    ping::Ping,
    pool::WorkerPool,
    stop::{detect_stops, StopEvent, StopParams},
    PortsResult,
};
use log::{info, warn};
use rustc_hash::FxHashMap as HashMap;
use std::path::Path;

/// One row of the port table, a cluster summary with its outline attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub summary: ClusterSummary,
    /// Absent when no member of the cluster had a usable position.
    pub boundary: Option<Boundary>,
}

/// Everything produced by a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortReport {
    /// Every detected stop with its cluster label.
    pub stops: Vec<LabeledStop>,
    /// One entry per cluster, ordered by cluster id.
    pub ports: Vec<Port>,
}

impl PortReport {
    /// Number of stops carrying `label`.
    pub fn label_count(&self, label: ClusterLabel) -> usize {
        self.stops.iter().filter(|s| s.label == label).count()
    }

    /// Distance in kilometers from the centroid of a port to its farthest member stop.
    pub fn spread_km(&self, cluster_id: u32) -> Option<f64> {
        let port = self
            .ports
            .iter()
            .find(|p| p.summary.cluster_id == cluster_id)?;
        let center = port.summary.centroid;

        self.stops
            .iter()
            .filter(|s| s.label == ClusterLabel::Cluster(cluster_id))
            .map(|s| {
                let c = s.stop.centroid;
                great_circle_distance(center.lat, center.lon, c.lat, c.lon)
            })
            .fold(None, |max: Option<f64>, d| Some(max.map_or(d, |m| m.max(d))))
    }

    /// Store the report in a database and a KML file.
    ///
    /// With no ports there is nothing to export, both outputs are left untouched and this returns
    /// `false`.
    pub fn export<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        database: P,
        kml_file: Q,
    ) -> PortsResult<bool> {
        if self.ports.is_empty() {
            warn!("no ports found, skipping export");
            return Ok(false);
        }

        let mut db = PortsDatabase::connect(database)?;
        db.save_report(self)?;

        save_ports_kml(kml_file, &self.ports)?;

        info!("exported {} ports and {} stops", self.ports.len(), self.stops.len());
        Ok(true)
    }
}

/// Finds ports in a batch of vessel position reports.
#[derive(Debug, Clone, Default)]
pub struct PortFinder {
    pub stop_params: StopParams,
    pub cluster_params: ClusterParams,
    pub pool: WorkerPool,
}

impl PortFinder {
    pub fn new(stop_params: StopParams, cluster_params: ClusterParams, pool: WorkerPool) -> Self {
        PortFinder {
            stop_params,
            cluster_params,
            pool,
        }
    }

    /// Run the whole analysis.
    ///
    /// Having no pings, no stops, or no clusters is not an error, the report just comes back
    /// (partly) empty.
    pub fn find_ports(&self, pings: Vec<Ping>) -> PortsResult<PortReport> {
        if pings.is_empty() {
            warn!("no pings to analyze");
            return Ok(PortReport::default());
        }

        let num_pings = pings.len();
        let tracks = partition_by_vessel(pings);
        info!("{} pings from {} vessels", num_pings, tracks.len());

        let stop_params = self.stop_params;
        let mut stops: Vec<StopEvent> = self
            .pool
            .fan_out("stops", tracks, |(vessel_id, track)| {
                Ok::<_, PortsError>(detect_stops(vessel_id, &track, &stop_params))
            })?
            .into_iter()
            .flatten()
            .collect();

        // Undo the arrival order of the fan out.
        stops.sort_by(|a, b| a.vessel_id.cmp(&b.vessel_id).then(a.start.cmp(&b.start)));

        if stops.is_empty() {
            warn!("no stops found, nothing to cluster");
            return Ok(PortReport::default());
        }
        info!("detected {} stops", stops.len());

        let labels = label_stops(&stops, &self.cluster_params);
        let stops: Vec<LabeledStop> = stops
            .into_iter()
            .zip(labels)
            .map(|(stop, label)| LabeledStop { stop, label })
            .collect();

        let clusters = partition_by_cluster(&stops);
        if clusters.is_empty() {
            warn!("no clusters found among {} stops", stops.len());
            return Ok(PortReport {
                stops,
                ports: vec![],
            });
        }

        let summaries = self
            .pool
            .fan_out("summaries", clusters.clone(), |(id, members)| {
                Ok::<_, PortsError>(summarize_cluster(id, &members))
            })?;
        let polygons = self
            .pool
            .fan_out("polygons", clusters, |(id, members)| {
                Ok::<_, PortsError>(build_polygon(id, &members))
            })?;

        let ports = merge(summaries, polygons);
        info!("found {} ports", ports.len());

        Ok(PortReport { stops, ports })
    }
}

/// Group pings by vessel, each group sorted by time with exact duplicates removed.
///
/// Groups come back ordered by vessel id.
fn partition_by_vessel(pings: Vec<Ping>) -> Vec<(u64, Vec<Ping>)> {
    let mut tracks: HashMap<u64, Vec<Ping>> = HashMap::default();
    for ping in pings {
        tracks.entry(ping.vessel_id).or_default().push(ping);
    }

    let mut tracks: Vec<(u64, Vec<Ping>)> = tracks.into_iter().collect();
    tracks.sort_unstable_by_key(|(vessel_id, _)| *vessel_id);

    for (_, track) in tracks.iter_mut() {
        // Stable, so pings with the same time stay in source order.
        track.sort_by_key(|ping| ping.timestamp);
        dedup_track(track);
    }

    tracks
}

/// Drop exact duplicates from a track sorted by time, keeping the first of each.
fn dedup_track(track: &mut Vec<Ping>) {
    let mut kept: Vec<Ping> = Vec::with_capacity(track.len());
    for ping in track.drain(..) {
        // Duplicates share a timestamp, so only the run of equal times needs checking.
        let run_start = kept.partition_point(|k| k.timestamp < ping.timestamp);
        if !kept[run_start..].contains(&ping) {
            kept.push(ping);
        }
    }
    *track = kept;
}

/// Group the clustered stops by cluster id, noise and failed stops are left out.
fn partition_by_cluster(stops: &[LabeledStop]) -> Vec<(u32, Vec<&StopEvent>)> {
    let mut clusters: HashMap<u32, Vec<&StopEvent>> = HashMap::default();
    for labeled in stops {
        if let Some(id) = labeled.label.cluster_id() {
            clusters.entry(id).or_default().push(&labeled.stop);
        }
    }

    let mut clusters: Vec<_> = clusters.into_iter().collect();
    clusters.sort_unstable_by_key(|(id, _)| *id);
    clusters
}

/// Left join polygons onto summaries by cluster id, every summary is kept.
fn merge(summaries: Vec<ClusterSummary>, polygons: Vec<ClusterPolygon>) -> Vec<Port> {
    let mut boundaries: HashMap<u32, Option<Boundary>> = polygons
        .into_iter()
        .map(|p| (p.cluster_id, p.boundary))
        .collect();

    let mut ports: Vec<Port> = summaries
        .into_iter()
        .map(|summary| {
            let boundary = boundaries.remove(&summary.cluster_id).flatten();
            Port { summary, boundary }
        })
        .collect();

    ports.sort_by_key(|p| p.summary.cluster_id);
    ports
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geo::Coord;
    use chrono::{Duration, TimeZone, Utc};

    fn summary(cluster_id: u32) -> ClusterSummary {
        ClusterSummary {
            cluster_id,
            centroid: Coord { lat: 1.0, lon: 2.0 },
            unique_vessel_count: 1,
            mean_duration: Duration::hours(1),
            total_duration: Duration::hours(1),
            stop_count: 1,
            dominant_ship_type: "Cargo".to_owned(),
            dominant_nav_status: "Moored".to_owned(),
            ship_type_histogram: "Cargo: 1".to_owned(),
        }
    }

    #[test]
    fn test_merge_keeps_every_summary() {
        let summaries = vec![summary(2), summary(0), summary(1)];
        let polygons = vec![
            ClusterPolygon {
                cluster_id: 0,
                boundary: Some(Boundary::Point(::geo::Point::new(2.0, 1.0))),
            },
            ClusterPolygon {
                cluster_id: 7,
                boundary: Some(Boundary::Point(::geo::Point::new(0.0, 0.0))),
            },
        ];

        let ports = merge(summaries, polygons);

        let ids: Vec<u32> = ports.iter().map(|p| p.summary.cluster_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(ports[0].boundary.is_some());
        assert!(ports[1].boundary.is_none());
        assert!(ports[2].boundary.is_none());
    }

    #[test]
    fn test_partition_by_vessel_sorts_and_dedups() {
        let t0 = Utc.ymd(2022, 3, 1).and_hms(0, 0, 0);
        let ping = |vessel_id: u64, minutes: i64| Ping {
            vessel_id,
            timestamp: t0 + Duration::minutes(minutes),
            lat: 55.0,
            lon: 12.0,
            speed_over_ground: 0.0,
            ship_type: None,
            nav_status: None,
        };

        let pings = vec![ping(9, 10), ping(4, 5), ping(9, 0), ping(9, 10), ping(4, 0)];
        let tracks = partition_by_vessel(pings);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].0, 4);
        assert_eq!(tracks[1].0, 9);
        assert_eq!(tracks[1].1.len(), 2);
        assert!(tracks[1].1[0].timestamp < tracks[1].1[1].timestamp);
    }

    fn labeled(vessel_id: u64, label: ClusterLabel) -> LabeledStop {
        let start = Utc.ymd(2022, 3, 1).and_hms(0, 0, 0);
        LabeledStop {
            stop: StopEvent {
                vessel_id,
                centroid: Coord {
                    lat: 55.0,
                    lon: 12.0 + 0.01 * vessel_id as f64,
                },
                start,
                end: start + Duration::hours(2),
                ping_count: 10,
                ship_type: "Cargo".to_owned(),
                nav_status: "Moored".to_owned(),
            },
            label,
        }
    }

    #[test]
    fn test_partition_by_cluster_skips_noise_and_failures() {
        let stops = vec![
            labeled(0, ClusterLabel::Cluster(1)),
            labeled(1, ClusterLabel::Failed),
            labeled(2, ClusterLabel::Noise),
            labeled(3, ClusterLabel::Cluster(0)),
            labeled(4, ClusterLabel::Cluster(1)),
            labeled(5, ClusterLabel::Failed),
        ];

        let clusters = partition_by_cluster(&stops);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].0, 0);
        assert_eq!(clusters[1].0, 1);

        let members: Vec<u64> = clusters[1].1.iter().map(|s| s.vessel_id).collect();
        assert_eq!(members, vec![0, 4]);
        assert_eq!(clusters[0].1.len(), 1);
        assert_eq!(clusters[0].1[0].vessel_id, 3);

        let all_failed: Vec<LabeledStop> =
            (0..3).map(|i| labeled(i, ClusterLabel::Failed)).collect();
        assert!(partition_by_cluster(&all_failed).is_empty());
    }

    #[test]
    fn test_same_time_pings_keep_source_order() {
        let t0 = Utc.ymd(2022, 3, 1).and_hms(0, 0, 0);
        let ping = |lat: f64, ship_type: &str| Ping {
            vessel_id: 1,
            timestamp: t0,
            lat,
            lon: 12.0,
            speed_over_ground: 0.0,
            ship_type: Some(ship_type.to_owned()),
            nav_status: None,
        };

        // Sorting on position would put the cargo report first.
        let pings = vec![
            ping(55.001, "Tanker"),
            ping(55.000, "Cargo"),
            ping(55.001, "Tanker"),
        ];
        let tracks = partition_by_vessel(pings);

        let types: Vec<&str> = tracks[0]
            .1
            .iter()
            .filter_map(|p| p.ship_type.as_deref())
            .collect();
        assert_eq!(types, vec!["Tanker", "Cargo"]);
    }

    #[test]
    fn test_spread_and_label_counts() {
        let mut stops: Vec<LabeledStop> =
            (0..3).map(|i| labeled(i, ClusterLabel::Cluster(0))).collect();
        stops.push(labeled(9, ClusterLabel::Noise));

        let mut port_summary = summary(0);
        port_summary.centroid = Coord {
            lat: 55.0,
            lon: 12.01,
        };
        let report = PortReport {
            stops,
            ports: vec![Port {
                summary: port_summary,
                boundary: None,
            }],
        };

        assert_eq!(report.label_count(ClusterLabel::Cluster(0)), 3);
        assert_eq!(report.label_count(ClusterLabel::Noise), 1);
        assert_eq!(report.label_count(ClusterLabel::Failed), 0);

        // 0.01 degrees of longitude at 55 north is a bit over 600 meters.
        let spread = report.spread_km(0).unwrap();
        assert!(spread > 0.6 && spread < 0.65, "spread {}", spread);
        assert_eq!(report.spread_km(1), None);
    }

    #[test]
    fn test_empty_input_short_circuits() {
        let report = PortFinder::default().find_ports(vec![]).unwrap();
        assert_eq!(report, PortReport::default());
    }
}
