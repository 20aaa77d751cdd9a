pub use activity::{
    activity_records, daily_totals, ground_counts_by_date, monthly_means, partition_detections,
    qualifying_cyclone_dates, DailyActivityRecord, MonthlyMean,
};
pub use baseline::{
    historical_baseline, nowcast_baseline, ReferenceTable, BASELINE_WINDOW_ROWS,
    MAX_FUTURE_LAG_DAYS,
};
pub use clip::{clip_to_eez, resolve_crs, Crs, EezBoundary, GeoRecord};
pub use detection::{screen_detections, BoatDetection, ACCEPTED_QUALITY_FLAGS};
pub use distance::{min_distances, CycloneDistanceRow};
pub use error::{Error, StormFishResult};
pub use formats::{
    read_boat_detections, read_coefficients, read_cyclone_tracks, read_eez_boundary,
    read_fishing_grounds, read_reference_table, write_fishing_grounds, write_impact_table,
    CountKind,
};
pub use crate::geo::{great_circle_distance, Coord};
pub use grounds::{
    estimate_grounds, estimation_inputs, merge_candidates, EstimateFromDensity, FishingGround,
    GroundSource, LoadPrecomputed,
};
pub use impact::{
    historical_impact, nowcast_impact, percent_difference, storm_day_stats, ImpactRow,
    RegressionModel, StormDayStats,
};
pub use pipeline::{
    phase_name, run_analysis, PipelineOrchestrator, ProgressFn, RunContext, RunMode, RunOutput,
    RunState, RunStatus, TOTAL_PHASES,
};
pub use season::{filter_to_season, filter_track_points, season_for_country, Dated, Season};
pub use track::{CycloneTrackPoint, UNNAMED_SENTINELS};

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod activity;
mod baseline;
mod clip;
mod detection;
mod distance;
mod error;
mod formats;
mod geo;
mod grounds;
mod impact;
mod pipeline;
mod season;
mod track;
