use chrono::Duration;
use clap::Parser;
use log::LevelFilter;
use portfind::{
    read_path, ClusterLabel, ClusterParams, IngestOptions, PortFinder, PortsResult, StopParams,
    WorkerPool,
};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Find ports in AIS vessel position reports.
///
/// Stationary periods of each vessel are detected, clustered across all vessels, and every cluster
/// is described and outlined. Results go into an SQLite database and a KML file.
///
#[derive(Debug, Parser)]
#[clap(name = "findports")]
#[clap(author, version, about)]
struct FindPortsOptionsInit {
    /// A CSV file, a zip archive of CSV files, or a directory containing them.
    ///
    /// If this is not specified, then the program will check for it in the "AIS_DATA"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "AIS_DATA")]
    input: PathBuf,

    /// The path to the database file.
    ///
    /// If this is not specified, then the program will check for it in the "PORTS_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "PORTS_DB")]
    database: PathBuf,

    /// The path to a KML file to produce from this run.
    ///
    /// If this is not specified, then the program will create one automatically by replacing the
    /// file extension on the database file with "*.kml".
    #[clap(short, long)]
    kml_file: Option<PathBuf>,

    /// Minimum length of a stop in hours.
    #[clap(long, default_value_t = 1.0)]
    min_stop_hours: f64,

    /// Longest gap between pings within one stop, in minutes.
    #[clap(long, default_value_t = 15)]
    max_gap_minutes: i64,

    /// Neighborhood radius for clustering in kilometers.
    #[clap(long, default_value_t = 1.0)]
    eps_km: f64,

    /// Stops needed within the radius to form a cluster.
    #[clap(long, default_value_t = 7)]
    min_samples: usize,

    /// Pings faster than this (knots) are ignored.
    #[clap(long, default_value_t = 2.0)]
    max_speed: f64,

    /// Number of worker threads, defaults to the number of CPUs.
    #[clap(short, long)]
    workers: Option<usize>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct FindPortsOptionsChecked {
    /// Where to load pings from.
    input: PathBuf,

    /// The path to the database file.
    database: PathBuf,

    /// The path to a KML file to produce from this run.
    kml_file: PathBuf,

    stop_params: StopParams,
    cluster_params: ClusterParams,
    ingest: IngestOptions,
    pool: WorkerPool,

    /// Verbose output
    verbose: bool,
}

impl Display for FindPortsOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "           Input: {}", self.input.display())?;
        writeln!(f, "        Database: {}", self.database.display())?;
        writeln!(f, "      Output KML: {}", self.kml_file.display())?;
        writeln!(
            f,
            "  Min stop (min): {}",
            self.stop_params.min_duration.num_minutes()
        )?;
        writeln!(
            f,
            "   Max gap (min): {}",
            self.stop_params.max_gap.num_minutes()
        )?;
        writeln!(f, "     Radius (km): {}", self.cluster_params.eps_km)?;
        writeln!(f, "     Min samples: {}", self.cluster_params.min_samples)?;
        writeln!(f, "Max speed (knot): {}", self.ingest.max_speed_knots)?;
        writeln!(f, "         Workers: {}", self.pool.num_workers())?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> PortsResult<FindPortsOptionsChecked> {
    let FindPortsOptionsInit {
        input,
        database,
        kml_file,
        min_stop_hours,
        max_gap_minutes,
        eps_km,
        min_samples,
        max_speed,
        workers,
        verbose,
    } = FindPortsOptionsInit::parse();

    if !(min_stop_hours.is_finite() && min_stop_hours >= 0.0) {
        return Err(format!("Invalid minimum stop length: {} hours", min_stop_hours).into());
    }

    if max_gap_minutes < 0 {
        return Err(format!("Invalid maximum gap: {} minutes", max_gap_minutes).into());
    }

    if !(eps_km.is_finite() && eps_km > 0.0) {
        return Err(format!("Invalid clustering radius: {} km", eps_km).into());
    }

    if min_samples == 0 {
        return Err("Minimum samples must be at least 1".into());
    }

    let kml_file = match kml_file {
        Some(v) => v,
        None => {
            let mut clone = database.clone();
            clone.set_extension("kml");
            clone
        }
    };

    let pool = match workers {
        Some(n) => WorkerPool::new(n),
        None => WorkerPool::default(),
    };

    let checked = FindPortsOptionsChecked {
        input,
        database,
        kml_file,
        stop_params: StopParams {
            min_duration: Duration::seconds((min_stop_hours * 3600.0).round() as i64),
            max_gap: Duration::minutes(max_gap_minutes),
        },
        cluster_params: ClusterParams {
            eps_km,
            min_samples,
        },
        ingest: IngestOptions {
            max_speed_knots: max_speed,
        },
        pool,
        verbose,
    };

    if verbose {
        println!("{}", checked);
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> PortsResult<()> {
    let opts = parse_args()?;

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    let pings = read_path(&opts.input, &opts.ingest)?;

    let finder = PortFinder::new(opts.stop_params, opts.cluster_params, opts.pool);
    let report = finder.find_ports(pings)?;

    for label in [ClusterLabel::Noise, ClusterLabel::Failed] {
        let count = report.label_count(label);
        if count > 0 {
            log::info!("{} stops labeled {}", count, label);
        }
    }

    if !report.export(&opts.database, &opts.kml_file)? {
        log::warn!("");
        log::warn!("No ports found!");
        log::warn!("");
        return Ok(());
    }

    if let Some(busiest) = report
        .ports
        .iter()
        .max_by_key(|port| port.summary.stop_count)
    {
        let summary = &busiest.summary;
        let spread = report.spread_km(summary.cluster_id).unwrap_or(0.0);

        log::info!("");
        log::info!("Busiest port found:");
        log::info!("        cluster - {:>19}", summary.cluster_id);
        log::info!("       latitude - {:>19.6}", summary.centroid.lat);
        log::info!("      longitude - {:>19.6}", summary.centroid.lon);
        log::info!("    spread (km) - {:>19.3}", spread);
        log::info!("          stops - {:>19}", summary.stop_count);
        log::info!("        vessels - {:>19}", summary.unique_vessel_count);
        log::info!("      ship type - {:>19}", summary.dominant_ship_type);
        log::info!("");
    }

    Ok(())
}
