/*!
 * The analysis pipeline and its orchestrator.
 *
 * [run_analysis] is the pipeline body: five sequential phases from raw
 * records to the final impact table, single threaded, reporting progress
 * through a callback at phase and sub-step boundaries. The callback may
 * return [Error::Cancelled], which unwinds the run cooperatively; work
 * already inside a phase step always finishes first.
 *
 * [PipelineOrchestrator] runs the body on a named background worker thread
 * and exposes a lock-guarded status record for polling, with one run
 * allowed at a time.
 */

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use log::info;
use strum::Display;

use crate::{
    activity::{
        activity_records, daily_totals, ground_counts_by_date, monthly_means,
        partition_detections, qualifying_cyclone_dates, DailyActivityRecord, MonthlyMean,
    },
    baseline::{historical_baseline, ReferenceTable},
    clip::{clip_to_eez, EezBoundary},
    detection::{screen_detections, BoatDetection},
    distance::min_distances,
    error::{Error, StormFishResult},
    grounds::{
        estimation_inputs, EstimateFromDensity, FishingGround, GroundSource, LoadPrecomputed,
    },
    impact::{historical_impact, nowcast_impact, storm_day_stats, ImpactRow, RegressionModel},
    season::{filter_to_season, filter_track_points, season_for_country},
    track::CycloneTrackPoint,
};

pub const TOTAL_PHASES: u8 = 5;

/// Fixed phase names, indexed by phase number 1 through 5.
pub fn phase_name(phase: u8) -> &'static str {
    match phase {
        1 => "data preparation",
        2 => "boat and cyclone processing",
        3 => "fishing-ground analysis",
        4 => "impact-metric calculation",
        5 => "visualization and persistence",
        _ => "unknown",
    }
}

/// Lifecycle of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Error,
    Cancelled,
}

/// Which impact table the run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RunMode {
    Historical,
    Nowcast,
}

/// The polled status record. One instance per orchestrator, always read
/// and written under its lock.
#[derive(Debug, Clone)]
pub struct RunStatus {
    pub state: RunState,
    pub current_phase: u8,
    pub total_phases: u8,
    pub phase_name: String,
    pub message: String,
    pub progress_percent: u8,
    pub error_message: Option<String>,
}

impl RunStatus {
    fn idle() -> Self {
        RunStatus {
            state: RunState::Idle,
            current_phase: 0,
            total_phases: TOTAL_PHASES,
            phase_name: String::new(),
            message: String::new(),
            progress_percent: 0,
            error_message: None,
        }
    }
}

/// Everything one run needs, owned by the run. Replaces any notion of
/// process-wide analysis state.
pub struct RunContext {
    pub mode: RunMode,
    pub country: String,
    /// The season year under analysis.
    pub target_year: i32,
    /// The wall-clock year, which decides whether grounds are re-estimated.
    pub current_year: i32,
    pub eez: EezBoundary,
    pub detections: Vec<BoatDetection>,
    pub detections_crs: Option<u32>,
    pub track_points: Vec<CycloneTrackPoint>,
    pub tracks_crs: Option<u32>,
    /// Ground set reused verbatim for current-year runs.
    pub precomputed_grounds: Option<Vec<FishingGround>>,
    /// Static recent-history table, required for nowcast runs.
    pub reference_table: Option<ReferenceTable>,
    pub model: RegressionModel,
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub grounds: Vec<FishingGround>,
    pub activity: Vec<DailyActivityRecord>,
    pub cyclone_monthly: Vec<MonthlyMean>,
    pub normal_monthly: Vec<MonthlyMean>,
    pub impact: Vec<ImpactRow>,
}

/// Progress callback: (phase number, phase name, message). Returning an
/// error, normally [Error::Cancelled], aborts the run at this boundary.
pub type ProgressFn<'a> = dyn FnMut(u8, &str, &str) -> StormFishResult<()> + 'a;

/**
 * Run the full analysis pipeline.
 *
 * Phases run strictly in order; every phase failure is wrapped with its
 * phase number, except cancellation which passes through untouched.
 */
pub fn run_analysis(
    mut context: RunContext,
    progress: &mut ProgressFn,
) -> StormFishResult<RunOutput> {
    let mut step = |phase: u8, message: &str| progress(phase, phase_name(phase), message);

    // Phase 1: season filtering and quality screening.
    step(1, "filtering records to the cyclone season")?;
    let season = season_for_country(&context.country).map_err(|e| e.in_phase(1))?;
    let detections = screen_detections(filter_to_season(
        std::mem::take(&mut context.detections),
        season,
        context.target_year,
    ));
    let track_points =
        filter_track_points(std::mem::take(&mut context.track_points), season, context.target_year);
    if detections.is_empty() {
        return Err(Error::EmptyResult("no boat detections in season".to_string()).in_phase(1));
    }
    if track_points.is_empty() {
        return Err(Error::EmptyResult("no cyclone track points in season".to_string()).in_phase(1));
    }

    // Phase 2: clip to the EEZ and partition by cyclone presence.
    step(2, "clipping records to the EEZ")?;
    let detections = clip_to_eez(&context.eez, detections, context.detections_crs, "detections")
        .map_err(|e| e.in_phase(2))?;
    let track_points = clip_to_eez(&context.eez, track_points, context.tracks_crs, "tracks")
        .map_err(|e| e.in_phase(2))?;
    if detections.is_empty() {
        return Err(Error::EmptyResult("no boat detections inside the EEZ".to_string()).in_phase(2));
    }

    step(2, "partitioning detections by cyclone presence")?;
    let cyclone_dates = qualifying_cyclone_dates(&track_points);
    let (cyclone_days, normal_days) = partition_detections(detections.clone(), &cyclone_dates);
    info!(
        "{} detections on cyclone days, {} on cyclone-free days",
        cyclone_days.len(),
        normal_days.len()
    );

    // Phase 3: fishing grounds, estimated or reused.
    step(3, "deriving fishing grounds")?;
    let grounds = ground_source(&context)?
        .grounds(&estimation_inputs(&detections, &cyclone_dates))
        .map_err(|e| e.in_phase(3))?;

    // Phase 4: distances, baseline, and the impact table.
    step(4, "computing cyclone-to-ground distances")?;
    let counts_by_date = ground_counts_by_date(&grounds, &detections);
    let distance_rows = min_distances(&track_points, &grounds);
    let stats = storm_day_stats(&track_points);

    step(4, "building the impact table")?;
    let impact = match context.mode {
        RunMode::Historical => {
            let baseline = historical_baseline(grounds.len(), &counts_by_date, &cyclone_dates)
                .map_err(|e| e.in_phase(4))?;
            historical_impact(&distance_rows, &stats, &counts_by_date, &baseline)
        }
        RunMode::Nowcast => {
            let reference = context.reference_table.as_ref().ok_or_else(|| {
                Error::Configuration("nowcast run without a reference table".to_string())
                    .in_phase(4)
            })?;
            nowcast_impact(&distance_rows, &stats, &context.model, reference)
        }
    };

    // Phase 5: assemble the activity tables for persistence.
    step(5, "assembling output tables")?;
    let activity = activity_records(&grounds, &detections, &cyclone_dates);
    let cyclone_monthly = monthly_means(&daily_totals(&cyclone_days));
    let normal_monthly = monthly_means(&daily_totals(&normal_days));

    Ok(RunOutput { grounds, activity, cyclone_monthly, normal_monthly, impact })
}

/// Current-year runs reuse the externally supplied ground set, every other
/// year re-estimates from density.
fn ground_source(context: &RunContext) -> StormFishResult<Box<dyn GroundSource>> {
    if context.target_year == context.current_year {
        let grounds = context.precomputed_grounds.clone().ok_or_else(|| {
            Error::Configuration(
                "current-year run requires a precomputed fishing-ground set".to_string(),
            )
            .in_phase(3)
        })?;
        Ok(Box::new(LoadPrecomputed { grounds }))
    } else {
        Ok(Box::new(EstimateFromDensity))
    }
}

/// Runs the pipeline on a background worker and publishes status for
/// polling callers.
pub struct PipelineOrchestrator {
    status: Arc<Mutex<RunStatus>>,
    cancel: Arc<AtomicBool>,
    output: Arc<Mutex<Option<RunOutput>>>,
    worker: Option<JoinHandle<()>>,
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOrchestrator {
    pub fn new() -> Self {
        PipelineOrchestrator {
            status: Arc::new(Mutex::new(RunStatus::idle())),
            cancel: Arc::new(AtomicBool::new(false)),
            output: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    /// Snapshot of the current status record.
    pub fn status(&self) -> RunStatus {
        self.status.lock().unwrap().clone()
    }

    /// The finished run's output, if any. Takes ownership.
    pub fn take_output(&self) -> Option<RunOutput> {
        self.output.lock().unwrap().take()
    }

    /// Request cooperative cancellation. Takes effect at the next phase or
    /// sub-step boundary; a step already executing always completes.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /**
     * Start a run on a background worker thread.
     *
     * Returns immediately. A second start while a run is in progress is
     * rejected outright, without queueing and without touching the running
     * run's status.
     */
    pub fn start(&mut self, context: RunContext) -> StormFishResult<()> {
        {
            let mut status = self.status.lock().unwrap();
            if status.state == RunState::Running {
                return Err(Error::Configuration(
                    "an analysis run is already in progress".to_string(),
                ));
            }
            *status = RunStatus::idle();
            status.state = RunState::Running;
            status.message = format!("starting {} analysis", context.mode);
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.output.lock().unwrap().take();

        let status = Arc::clone(&self.status);
        let cancel = Arc::clone(&self.cancel);
        let output = Arc::clone(&self.output);

        let jh = thread::Builder::new()
            .name("stormfish-analysis".to_owned())
            .spawn(move || {
                let mut progress = |phase: u8, name: &str, message: &str| {
                    if cancel.load(Ordering::SeqCst) {
                        return Err(Error::Cancelled);
                    }
                    let mut status = status.lock().unwrap();
                    status.current_phase = phase;
                    status.phase_name = name.to_string();
                    status.message = message.to_string();
                    status.progress_percent = (phase as u16 * 100 / TOTAL_PHASES as u16) as u8;
                    info!("phase {}/{} ({}): {}", phase, TOTAL_PHASES, name, message);
                    Ok(())
                };

                let result = run_analysis(context, &mut progress);

                let mut status = status.lock().unwrap();
                match result {
                    Ok(run_output) => {
                        status.state = RunState::Completed;
                        status.progress_percent = 100;
                        status.message = "analysis complete".to_string();
                        *output.lock().unwrap() = Some(run_output);
                    }
                    Err(err) if err.is_cancelled() => {
                        status.state = RunState::Cancelled;
                        status.message = "analysis cancelled".to_string();
                    }
                    Err(err) => {
                        status.state = RunState::Error;
                        status.message = "analysis failed".to_string();
                        status.error_message = Some(err.to_string());
                    }
                }
            })
            .map_err(|e| Error::Configuration(format!("failed to spawn worker: {}", e)))?;

        self.worker = Some(jh);
        Ok(())
    }

    /// Block until the current run's worker finishes. Mainly for callers
    /// that want batch semantics, like the demo binary.
    pub fn join(&mut self) {
        if let Some(jh) = self.worker.take() {
            let _ = jh.join();
        }
    }
}
