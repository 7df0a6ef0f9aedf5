pub use crate::geo::{great_circle_distance, BoundingBox, Coord, Geo, EARTH_RADIUS_KM};
pub use cluster::{
    build_polygon, cluster_stops, label_stops, summarize_cluster, Boundary, ClusterLabel,
    ClusterParams, ClusterPolygon, ClusterSummary, LabeledStop,
};
pub use database::{PortsDatabase, Table};
pub use error::PortsError;
pub use ingest::{read_path, read_pings, IngestOptions};
pub use kml::{save_ports_kml, write_ports, KmlFile, KmlWriter};
pub use ping::{check_required_fields, ColumnIndex, Ping, PingField};
pub use pipeline::{Port, PortFinder, PortReport};
pub use pool::WorkerPool;
pub use stop::{detect_stops, segment_ranges, StopEvent, StopParams};

/// Result type for fallible plumbing in this crate (I/O, SQLite, archives).
pub type PortsResult<T> = Result<T, Box<dyn std::error::Error>>;

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod cluster;
mod database;
mod error;
mod geo;
mod ingest;
mod kml;
mod ping;
mod pipeline;
mod pool;
mod stop;
