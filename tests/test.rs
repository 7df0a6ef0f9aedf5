use chrono::{DateTime, Duration, TimeZone, Utc};
use portfind::{
    build_polygon, great_circle_distance, label_stops, read_pings, save_ports_kml, Boundary,
    ClusterLabel, ClusterParams, Coord, IngestOptions, Ping, PortFinder, PortReport,
    PortsDatabase, PortsError, StopEvent, StopParams, Table, WorkerPool,
};
use std::path::PathBuf;

/*-------------------------------------------------------------------------------------------------
 *                                          Helpers
 *-----------------------------------------------------------------------------------------------*/
fn t0() -> DateTime<Utc> {
    Utc.ymd(2025, 2, 14).and_hms(0, 0, 0)
}

fn ping(vessel_id: u64, minutes: i64, lat: f64, lon: f64) -> Ping {
    Ping {
        vessel_id,
        timestamp: t0() + Duration::minutes(minutes),
        lat,
        lon,
        speed_over_ground: 0.1,
        ship_type: Some(if vessel_id % 2 == 0 { "Cargo" } else { "Tanker" }.to_owned()),
        nav_status: Some("Moored".to_owned()),
    }
}

/// A vessel sitting still for two hours with a ping every five minutes, then a short visit
/// somewhere else that is too brief to count.
fn moored_vessel(vessel_id: u64, lat: f64, lon: f64) -> Vec<Ping> {
    let mut pings: Vec<Ping> = (0..=24).map(|i| ping(vessel_id, i * 5, lat, lon)).collect();
    pings.extend((0..4).map(|i| ping(vessel_id, 300 + i * 5, lat + 1.0, lon + 1.0)));
    pings
}

/// Eight vessels in one harbor, seven in another, and a loner.
fn fleet() -> Vec<Ping> {
    let mut pings = vec![];

    for i in 0..8 {
        let (row, col) = ((i % 3) as f64, (i / 3) as f64);
        pings.extend(moored_vessel(i, 55.70 + 0.001 * row, 12.60 + 0.001 * col));
    }

    for i in 0..7 {
        let (row, col) = ((i % 3) as f64, (i / 3) as f64);
        pings.extend(moored_vessel(100 + i, 56.15 + 0.001 * row, 10.20 + 0.001 * col));
    }

    pings.extend(moored_vessel(500, 57.50, 9.00));

    pings
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("portfind_{}_{}", std::process::id(), name))
}

fn stop_at(vessel_id: u64, lat: f64, lon: f64) -> StopEvent {
    StopEvent {
        vessel_id,
        centroid: Coord { lat, lon },
        start: t0(),
        end: t0() + Duration::hours(2),
        ping_count: 25,
        ship_type: "Cargo".to_owned(),
        nav_status: "Moored".to_owned(),
    }
}

/*-------------------------------------------------------------------------------------------------
 *                                     Pipeline scenarios
 *-----------------------------------------------------------------------------------------------*/
#[test]
fn test_short_segments_make_no_stops() {
    let pings = vec![ping(1, 0, 55.0, 12.0), ping(1, 5, 55.0, 12.0), ping(1, 40, 55.0, 12.0)];

    let report = PortFinder::default().find_ports(pings).unwrap();

    assert!(report.stops.is_empty());
    assert!(report.ports.is_empty());
}

#[test]
fn test_long_visit_is_one_stop() {
    // Every ten minutes for 2h10m.
    let pings: Vec<Ping> = (0..=13).map(|i| ping(2, i * 10, 55.0, 12.0)).collect();

    let report = PortFinder::default().find_ports(pings).unwrap();

    assert_eq!(report.stops.len(), 1);
    let stop = &report.stops[0].stop;
    assert_eq!(stop.duration(), Duration::minutes(130));
    assert_eq!(stop.ping_count, 14);

    // One stop is far short of a cluster.
    assert_eq!(report.stops[0].label, ClusterLabel::Noise);
    assert!(report.ports.is_empty());
}

#[test]
fn test_dense_stops_cluster_and_distant_stop_is_noise() {
    // Ten stops within about 200 meters of each other.
    let mut stops: Vec<StopEvent> = (0..10)
        .map(|i| stop_at(i, 55.0 + 0.0002 * i as f64, 10.0 + 0.0002 * (i % 4) as f64))
        .collect();
    // About 50 km north.
    stops.push(stop_at(10, 55.45, 10.0));

    let labels = label_stops(&stops, &ClusterParams::default());

    assert_eq!(labels.len(), 11);
    for label in &labels[0..10] {
        assert_eq!(*label, ClusterLabel::Cluster(0));
    }
    assert_eq!(labels[10], ClusterLabel::Noise);
    assert_eq!(labels[10].code(), -1);
}

#[test]
fn test_two_member_cluster_is_a_line() {
    let stops = vec![stop_at(1, 55.0, 10.0), stop_at(2, 55.0, 10.01)];
    let members: Vec<&StopEvent> = stops.iter().collect();

    let polygon = build_polygon(0, &members);

    match polygon.boundary {
        Some(Boundary::Line(ref line)) => assert_eq!(line.0.len(), 2),
        ref other => panic!("expected a line, got {:?}", other),
    }
    assert_eq!(
        polygon.boundary.unwrap().to_string(),
        "LINESTRING (10 55, 10.01 55)"
    );
}

#[test]
fn test_empty_inputs_are_not_errors() {
    assert!(label_stops(&[], &ClusterParams::default()).is_empty());

    let report = PortFinder::default().find_ports(vec![]).unwrap();
    assert!(report.stops.is_empty());
    assert!(report.ports.is_empty());
}

#[test]
fn test_fleet_finds_two_ports() {
    let finder = PortFinder::new(
        StopParams::default(),
        ClusterParams::default(),
        WorkerPool::new(4),
    );

    let report = finder.find_ports(fleet()).unwrap();

    // Each vessel has exactly one qualifying stop.
    assert_eq!(report.stops.len(), 16);

    let ids: Vec<u32> = report.ports.iter().map(|p| p.summary.cluster_id).collect();
    assert_eq!(ids, vec![0, 1]);

    let first = &report.ports[0].summary;
    assert_eq!(first.stop_count, 8);
    assert_eq!(first.unique_vessel_count, 8);
    assert_eq!(first.mean_duration, Duration::hours(2));
    assert_eq!(first.total_duration, Duration::hours(16));
    assert_eq!(first.dominant_nav_status, "Moored");
    // Even vessel ids are cargo ships, so four of each and cargo is seen first.
    assert_eq!(first.dominant_ship_type, "Cargo");
    assert_eq!(first.ship_type_histogram, "Cargo: 4, Tanker: 4");

    let second = &report.ports[1].summary;
    assert_eq!(second.stop_count, 7);
    assert_eq!(second.unique_vessel_count, 7);

    for port in &report.ports {
        assert!(matches!(port.boundary, Some(Boundary::Polygon(_))));
    }

    let loner = report
        .stops
        .iter()
        .find(|s| s.stop.vessel_id == 500)
        .unwrap();
    assert_eq!(loner.label, ClusterLabel::Noise);

    // Noise never makes it into the port table.
    let clustered = report
        .stops
        .iter()
        .filter(|s| s.label.cluster_id().is_some())
        .count();
    let summarized: usize = report.ports.iter().map(|p| p.summary.stop_count).sum();
    assert_eq!(clustered, summarized);
}

#[test]
fn test_failed_clustering_makes_no_ports() {
    let mut pings = vec![];
    for i in 0..8 {
        pings.extend(moored_vessel(i, 55.70, 12.60));
    }
    // One unusable position poisons the centroid of a stop and with it the whole clustering run.
    pings[3].lat = f64::NAN;

    let report = PortFinder::default().find_ports(pings).unwrap();

    assert_eq!(report.stops.len(), 8);
    assert!(report.stops.iter().all(|s| s.label.code() == -2));
    assert_eq!(report.label_count(ClusterLabel::Failed), 8);
    assert!(report.ports.is_empty());
}

#[test]
fn test_port_centroids_are_far_apart() {
    let report = PortFinder::default().find_ports(fleet()).unwrap();
    let a = report.ports[0].summary.centroid;
    let b = report.ports[1].summary.centroid;

    // Copenhagen to Aarhus is roughly 150 km.
    let d = great_circle_distance(a.lat, a.lon, b.lat, b.lon);
    assert!(d > 140.0 && d < 170.0, "distance {}", d);

    // Members of each harbor sit within a few hundred meters of its center.
    for port in &report.ports {
        let spread = report.spread_km(port.summary.cluster_id).unwrap();
        assert!(spread < 0.5, "spread {}", spread);
    }
}

#[test]
fn test_results_do_not_depend_on_scheduling() {
    let serial = PortFinder {
        pool: WorkerPool::new(1),
        ..PortFinder::default()
    };
    let parallel = PortFinder {
        pool: WorkerPool::new(8),
        ..PortFinder::default()
    };

    let mut shuffled = fleet();
    shuffled.reverse();
    let len = shuffled.len();
    shuffled.rotate_left(len / 3);

    let first = serial.find_ports(fleet()).unwrap();
    let second = parallel.find_ports(shuffled).unwrap();
    let third = parallel.find_ports(fleet()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn test_too_few_stops_for_a_cluster() {
    let mut pings = vec![];
    for i in 0..3 {
        pings.extend(moored_vessel(i, 55.70, 12.60));
    }

    let report = PortFinder::default().find_ports(pings).unwrap();

    assert_eq!(report.stops.len(), 3);
    assert!(report.stops.iter().all(|s| s.label == ClusterLabel::Noise));
    assert!(report.ports.is_empty());
}

/*-------------------------------------------------------------------------------------------------
 *                                  Ingestion through export
 *-----------------------------------------------------------------------------------------------*/
const HEADER: &str =
    "# Timestamp,Type of mobile,MMSI,Latitude,Longitude,Navigational status,ROT,SOG,COG,Ship type";

fn fleet_csv() -> String {
    let mut text = String::from(HEADER);

    for ping in fleet() {
        text.push_str(&format!(
            "\n{},Class A,{},{},{},{},0.0,{},0.0,{}",
            ping.timestamp.format("%d/%m/%Y %H:%M:%S"),
            ping.vessel_id,
            ping.lat,
            ping.lon,
            ping.nav_status.unwrap_or_default(),
            ping.speed_over_ground,
            ping.ship_type.unwrap_or_default(),
        ));
    }

    // A vessel under way is filtered out before it can look like a stop.
    for i in 0..30 {
        let t = t0() + Duration::minutes(i * 5);
        text.push_str(&format!(
            "\n{},Class A,999,55.70,12.60,Under way using engine,0.0,11.5,90.0,Passenger",
            t.format("%d/%m/%Y %H:%M:%S"),
        ));
    }

    text
}

#[test]
fn test_csv_to_database_and_kml() {
    let pings = read_pings(fleet_csv().as_bytes(), "fleet", &IngestOptions::default()).unwrap();
    assert_eq!(pings.len(), fleet().len());
    assert!(pings.iter().all(|p| p.vessel_id != 999));

    let report = PortFinder::default().find_ports(pings).unwrap();
    assert_eq!(report.ports.len(), 2);

    let mut db = PortsDatabase::connect(":memory:").unwrap();
    db.save_report(&report).unwrap();

    assert_eq!(db.count_rows(Table::Stops).unwrap(), 16);
    assert_eq!(db.count_rows(Table::Ports).unwrap(), 2);

    let labels = db.stop_labels().unwrap();
    assert_eq!(labels.last(), Some(&(500, ClusterLabel::Noise)));

    for (_, wkt) in db.port_boundaries().unwrap() {
        assert!(wkt.unwrap().starts_with("POLYGON (("));
    }

    let kml_path = std::env::temp_dir().join(format!("portfind_test_{}.kml", std::process::id()));
    save_ports_kml(&kml_path, &report.ports).unwrap();
    let kml = std::fs::read_to_string(&kml_path).unwrap();
    std::fs::remove_file(&kml_path).unwrap();

    assert!(kml.ends_with("</kml>\n"));
    assert_eq!(kml.matches("<Polygon>").count(), 2);
    assert!(kml.contains("<name>Port 1</name>"));
}

#[test]
fn test_missing_columns_stop_everything() {
    let text = "# Timestamp,MMSI,Latitude,Longitude,SOG,Ship type\n14/02/2025 00:00:00,1,55.0,12.0,0.0,Cargo";

    let err = read_pings(text.as_bytes(), "broken", &IngestOptions::default()).unwrap_err();

    match err.downcast_ref::<PortsError>() {
        Some(PortsError::MissingFields(fields)) => {
            assert_eq!(fields, &vec!["Navigational status"]);
            assert!(err.to_string().contains("Navigational status"));
        }
        other => panic!("expected missing fields, got {:?}", other),
    }
}

#[test]
fn test_no_ports_leaves_previous_export_alone() {
    let db_path = temp_path("keep.sqlite");
    let kml_path = temp_path("keep.kml");
    let _ = std::fs::remove_file(&db_path);
    let _ = std::fs::remove_file(&kml_path);

    let report = PortFinder::default().find_ports(fleet()).unwrap();
    assert!(report.export(&db_path, &kml_path).unwrap());
    let kml = std::fs::read_to_string(&kml_path).unwrap();

    // Too few stops for any cluster, nothing gets written.
    let mut pings = vec![];
    for i in 0..3 {
        pings.extend(moored_vessel(i, 55.70, 12.60));
    }
    let empty = PortFinder::default().find_ports(pings).unwrap();
    assert!(empty.ports.is_empty());
    assert!(!empty.export(&db_path, &kml_path).unwrap());
    assert!(!PortReport::default().export(&db_path, &kml_path).unwrap());

    let db = PortsDatabase::connect(&db_path).unwrap();
    assert_eq!(db.count_rows(Table::Ports).unwrap(), 2);
    assert_eq!(db.count_rows(Table::Stops).unwrap(), 16);
    drop(db);
    assert_eq!(std::fs::read_to_string(&kml_path).unwrap(), kml);

    std::fs::remove_file(&db_path).unwrap();
    std::fs::remove_file(&kml_path).unwrap();
}

#[test]
fn test_no_ports_creates_no_files() {
    let db_path = temp_path("none.sqlite");
    let kml_path = temp_path("none.kml");

    assert!(!PortReport::default().export(&db_path, &kml_path).unwrap());
    assert!(!db_path.exists());
    assert!(!kml_path.exists());
}
