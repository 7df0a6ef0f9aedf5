/*!
 * Load AIS position reports from CSV files.
 *
 * The files follow the layout published by the Danish Maritime Authority. They can be read
 * directly, from inside zip archives, or by walking a directory full of either.
 */
use crate::{
    error::PortsError,
    ping::{check_required_fields, ColumnIndex, Ping, PingField},
    PortsResult,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::{debug, info};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Seek},
    path::Path,
};
use strum::IntoEnumIterator;

/// Preprocessing applied while reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestOptions {
    /// Pings faster than this (knots) are dropped, they are not part of a stop.
    pub max_speed_knots: f64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            max_speed_knots: 2.0,
        }
    }
}

/// Load every ping from a CSV file, a zip archive of CSV files, or a directory tree of either.
///
/// Directory entries are read in file name order.
pub fn read_path<P: AsRef<Path>>(path: P, opts: &IngestOptions) -> PortsResult<Vec<Ping>> {
    let path = path.as_ref();

    if path.is_dir() {
        let mut pings = vec![];
        for entry in walkdir::WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|res| res.ok())
            // WalkDir takes care of recursing into directories.
            .filter(|entry| entry.path().is_file())
            .filter(|entry| source_kind(entry.path()).is_some())
        {
            pings.extend(read_file(entry.path(), opts)?);
        }

        info!("loaded {} pings from {}", pings.len(), path.display());
        return Ok(pings);
    }

    read_file(path, opts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Csv,
    Zip,
}

fn source_kind(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "csv" => Some(SourceKind::Csv),
        "zip" => Some(SourceKind::Zip),
        _ => None,
    }
}

fn read_file(path: &Path, opts: &IngestOptions) -> PortsResult<Vec<Ping>> {
    let name = path.to_string_lossy();

    match source_kind(path) {
        Some(SourceKind::Csv) => {
            let f = File::open(path)?;
            read_pings(BufReader::new(f), &name, opts)
        }
        Some(SourceKind::Zip) => {
            let f = File::open(path)?;
            read_zip(f, &name, opts)
        }
        None => Err(PortsError::UnsupportedSource(path.to_path_buf()).into()),
    }
}

/// Read every `.csv` entry of a zip archive.
fn read_zip<R: Read + Seek>(
    archive: R,
    name: &str,
    opts: &IngestOptions,
) -> PortsResult<Vec<Ping>> {
    let mut zip = zip::ZipArchive::new(archive)?;

    let mut pings = vec![];
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        if entry.is_dir() || !entry.name().to_lowercase().ends_with(".csv") {
            continue;
        }

        let entry_name = format!("{}:{}", name, entry.name());
        pings.extend(read_pings(BufReader::new(entry), &entry_name, opts)?);
    }

    Ok(pings)
}

/// Parse a CSV table of pings.
///
/// The header must name every [PingField], otherwise nothing is parsed and the missing fields are
/// reported. Rows with an unreadable vessel id, time, position, or speed are dropped, as are rows
/// with a position off the globe and rows faster than `opts.max_speed_knots`.
pub fn read_pings<R: BufRead>(
    reader: R,
    source_name: &str,
    opts: &IngestOptions,
) -> PortsResult<Vec<Ping>> {
    let mut lines = records(reader);

    let header = match lines.next() {
        Some(line) => line?,
        None => {
            let all: Vec<&'static str> = PingField::iter().map(PingField::name).collect();
            return Err(PortsError::MissingFields(all).into());
        }
    };
    let header = header.trim_start_matches('\u{feff}');
    let columns = check_required_fields(&split_csv_line(header))?;

    let mut pings = vec![];
    let mut num_bad = 0;
    let mut num_moving = 0;

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match parse_row(&split_csv_line(&line), &columns) {
            Some(ping) if ping.speed_over_ground > opts.max_speed_knots => num_moving += 1,
            Some(ping) => pings.push(ping),
            None => num_bad += 1,
        }
    }

    debug!(
        "{}: kept {} pings, dropped {} unreadable rows and {} moving vessel rows",
        source_name,
        pings.len(),
        num_bad,
        num_moving
    );

    Ok(pings)
}

fn parse_row(cells: &[String], columns: &ColumnIndex) -> Option<Ping> {
    if cells.len() < columns.min_row_len() {
        return None;
    }

    let number = |idx: usize| {
        cells[idx]
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    };
    let category = |idx: usize| {
        let value = cells[idx].trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_owned())
        }
    };

    let ping = Ping {
        vessel_id: cells[columns.vessel_id].trim().parse().ok()?,
        timestamp: parse_timestamp(cells[columns.timestamp].trim())?,
        lat: number(columns.lat)?,
        lon: number(columns.lon)?,
        speed_over_ground: number(columns.speed_over_ground)?,
        ship_type: category(columns.ship_type),
        nav_status: category(columns.nav_status),
    };

    if ping.coord().is_valid() {
        Some(ping)
    } else {
        None
    }
}

/// Times are UTC, day first like the Danish Maritime Authority files, or ISO 8601.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 2] = ["%d/%m/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// CSV records of a reader, a quoted cell may carry on over several lines.
fn records<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<String>> {
    let mut lines = reader.lines();

    std::iter::from_fn(move || {
        let mut record = match lines.next()? {
            Ok(line) => line,
            Err(err) => return Some(Err(err)),
        };

        // An odd number of quotes means a cell is still open, `""` escapes count twice.
        while record.matches('"').count() % 2 == 1 {
            match lines.next() {
                Some(Ok(line)) => {
                    record.push('\n');
                    record.push_str(&line);
                }
                Some(Err(err)) => return Some(Err(err)),
                None => break,
            }
        }

        Some(Ok(record))
    })
}

/// Split one CSV record, honoring double quoted cells with `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = vec![];
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);

    cells
}
