use chrono::{Datelike, Local};
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::{error::Error, path::PathBuf, thread, time::Duration};
use stormfish::{
    read_boat_detections, read_coefficients, read_cyclone_tracks, read_eez_boundary,
    read_fishing_grounds, read_reference_table, write_fishing_grounds, write_impact_table,
    CountKind, PipelineOrchestrator, RegressionModel, RunContext, RunMode, RunState,
};

/*-------------------------------------------------------------------------------------------------
 *                                     Command Line Options
 *-----------------------------------------------------------------------------------------------*/

///
/// Run a cyclone fishing-impact analysis from local files.
///
/// This program reads an EEZ boundary, a season of boat detections, and cyclone track points,
/// runs the analysis pipeline on a background worker while polling its status, and writes the
/// final impact table as CSV. Supplying a baseline reference table switches the run from
/// historical to nowcast mode.
///
#[derive(Debug, Parser)]
#[command(bin_name = "stormfish")]
#[command(author, version, about)]
struct Options {
    /// ISO3 country code with a defined cyclone season, e.g. phl, vnm, fji.
    #[arg(short, long)]
    country: String,

    /// The season year to analyze.
    #[arg(short, long)]
    year: i32,

    /// GeoJSON file holding the country's EEZ boundary.
    ///
    /// If this is not specified, then the program will check for it in the "STORMFISH_EEZ"
    /// environment variable.
    #[arg(long)]
    #[arg(env = "STORMFISH_EEZ")]
    eez: PathBuf,

    /// CSV of satellite boat detections (Lon_DNB, Lat_DNB, Date_Mscan, QF_Detect).
    #[arg(long)]
    detections: PathBuf,

    /// CSV of cyclone track points (NAME, ISO_TIME, LAT, LON, USA_WIND, STORM_SPD).
    #[arg(long)]
    tracks: PathBuf,

    /// Precomputed fishing-ground GeoJSON, required when analyzing the current year.
    #[arg(long)]
    grounds: Option<PathBuf>,

    /// Baseline reference table CSV. Supplying one runs a nowcast instead of a historical
    /// analysis.
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Regression coefficient CSV overriding the built-in table (nowcast only).
    #[arg(long)]
    coefficients: Option<PathBuf>,

    /// Where to write the impact table.
    #[arg(short, long, default_value = "impact.csv")]
    output: PathBuf,

    /// Also write the run's fishing grounds to this GeoJSON file.
    #[arg(long)]
    save_grounds: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let options = Options::parse();

    let level = if options.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new().with_level(level).init()?;

    let eez = read_eez_boundary(&options.eez)?;
    let detections = read_boat_detections(&options.detections)?;
    let track_points = read_cyclone_tracks(&options.tracks)?;

    let precomputed_grounds = match &options.grounds {
        Some(path) => Some(read_fishing_grounds(path)?),
        None => None,
    };
    let reference_table = match &options.reference {
        Some(path) => Some(read_reference_table(path)?),
        None => None,
    };
    let model = match &options.coefficients {
        Some(path) => read_coefficients(path)?,
        None => RegressionModel::default(),
    };

    let mode = if reference_table.is_some() { RunMode::Nowcast } else { RunMode::Historical };
    log::info!(
        "{} analysis for {} season {}: {} detections, {} track points",
        mode,
        options.country,
        options.year,
        detections.len(),
        track_points.len()
    );

    let context = RunContext {
        mode,
        country: options.country,
        target_year: options.year,
        current_year: Local::now().year(),
        eez,
        detections,
        detections_crs: None,
        track_points,
        tracks_crs: None,
        precomputed_grounds,
        reference_table,
        model,
    };

    let mut orchestrator = PipelineOrchestrator::new();
    orchestrator.start(context)?;

    // Poll the status record the way an interactive caller would.
    loop {
        let status = orchestrator.status();
        if status.state != RunState::Running {
            break;
        }
        thread::sleep(Duration::from_millis(200));
    }
    orchestrator.join();

    let status = orchestrator.status();
    match status.state {
        RunState::Completed => {}
        RunState::Cancelled => {
            log::warn!("analysis cancelled");
            return Ok(());
        }
        _ => {
            return Err(status
                .error_message
                .unwrap_or_else(|| "analysis failed".to_string())
                .into());
        }
    }

    let output = orchestrator
        .take_output()
        .ok_or("completed run produced no output")?;

    let kind = match mode {
        RunMode::Historical => CountKind::Observed,
        RunMode::Nowcast => CountKind::Predicted,
    };
    write_impact_table(&options.output, &output.impact, kind)?;
    log::info!(
        "wrote {} impact rows across {} fishing grounds to {}",
        output.impact.len(),
        output.grounds.len(),
        options.output.display()
    );

    if let Some(path) = &options.save_grounds {
        write_fishing_grounds(path, &output.grounds)?;
        log::info!("wrote fishing grounds to {}", path.display());
    }

    Ok(())
}
