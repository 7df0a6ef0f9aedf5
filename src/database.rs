use crate::{cluster::ClusterLabel, pipeline::PortReport, PortsResult};
use chrono::Duration;
use log::info;
use rusqlite::{Connection, OpenFlags, ToSql};
use std::path::Path;
use strum::IntoStaticStr;

/// The tables written by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Table {
    Stops,
    Ports,
}

/// The SQLite file where the stops and ports of a run are stored.
pub struct PortsDatabase {
    conn: Connection,
}

impl PortsDatabase {
    /// Open (or create) a database and make sure the tables exist.
    ///
    /// The path `":memory:"` gives a private in memory database.
    pub fn connect<P: AsRef<Path>>(path: P) -> PortsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(include_str!("database/create_db.sql"))?;

        Ok(PortsDatabase { conn })
    }

    /// Replace the contents of the database with this report.
    ///
    /// All or nothing, if anything fails the previous contents are kept.
    pub fn save_report(&mut self, report: &PortReport) -> PortsResult<()> {
        const ADD_STOP_QUERY: &str = include_str!("database/add_stop.sql");
        const ADD_PORT_QUERY: &str = include_str!("database/add_port.sql");

        let tx = self.conn.transaction()?;
        tx.execute_batch(include_str!("database/clear.sql"))?;

        {
            let mut add_stop = tx.prepare(ADD_STOP_QUERY)?;
            for labeled in &report.stops {
                let stop = &labeled.stop;

                add_stop.execute([
                    &(stop.vessel_id as i64) as &dyn ToSql,
                    &stop.centroid.lat,
                    &stop.centroid.lon,
                    &stop.start.timestamp(),
                    &stop.end.timestamp(),
                    &hours(stop.duration()),
                    &(stop.ping_count as i64),
                    &stop.ship_type,
                    &stop.nav_status,
                    &labeled.label.code(),
                ])?;
            }

            let mut add_port = tx.prepare(ADD_PORT_QUERY)?;
            for port in &report.ports {
                let summary = &port.summary;
                let wkt: Option<String> = port.boundary.as_ref().map(|b| b.to_string());

                add_port.execute([
                    &summary.cluster_id as &dyn ToSql,
                    &summary.centroid.lat,
                    &summary.centroid.lon,
                    &(summary.unique_vessel_count as i64),
                    &hours(summary.mean_duration),
                    &hours(summary.total_duration),
                    &(summary.stop_count as i64),
                    &summary.dominant_ship_type,
                    &summary.dominant_nav_status,
                    &summary.ship_type_histogram,
                    &wkt,
                ])?;
            }
        }

        tx.commit()?;

        info!(
            "saved {} stops and {} ports",
            report.stops.len(),
            report.ports.len()
        );

        Ok(())
    }

    /// The number of rows in a table.
    pub fn count_rows(&self, table: Table) -> PortsResult<usize> {
        let name: &'static str = table.into();
        let query = format!("SELECT COUNT(*) FROM {}", name);

        let count: i64 = self.conn.query_row(&query, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// The label of every stored stop, ordered by vessel and start time.
    pub fn stop_labels(&self) -> PortsResult<Vec<(u64, ClusterLabel)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT vessel_id, cluster FROM stops ORDER BY vessel_id, start_time")?;

        let rows = stmt.query_and_then([], |row| -> PortsResult<(u64, ClusterLabel)> {
            let vessel_id: i64 = row.get(0)?;
            let code: i64 = row.get(1)?;
            Ok((vessel_id as u64, ClusterLabel::from_code(code)))
        })?;

        rows.collect()
    }

    /// The boundary of every stored port as well known text, ordered by cluster id.
    pub fn port_boundaries(&self) -> PortsResult<Vec<(u32, Option<String>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cluster_id, boundary_wkt FROM ports ORDER BY cluster_id")?;

        let rows = stmt.query_and_then([], |row| -> PortsResult<(u32, Option<String>)> {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        rows.collect()
    }
}

fn hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}
