/*! Cyclone best-track data. */

use chrono::{NaiveDate, NaiveDateTime};

/// Sentinel names used by the track archive for storms that were never named.
/// Records carrying one of these are excluded from historical analysis.
pub const UNNAMED_SENTINELS: [&str; 2] = ["UNNAMED", "NOT_NAMED"];

/**
 * A single best-track fix for one cyclone.
 *
 * One cyclone has many ordered track points, usually at six hour intervals.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CycloneTrackPoint {
    /// The storm name as reported by the archive.
    pub name: String,
    /// Longitude of the storm center in degrees.
    pub lon: f64,
    /// Latitude of the storm center in degrees.
    pub lat: f64,
    /// Valid time of this fix.
    pub timestamp: NaiveDateTime,
    /// Maximum sustained wind in knots.
    pub wind: f64,
    /// Storm translation speed in knots.
    pub storm_speed: f64,
}

impl CycloneTrackPoint {
    /// The calendar date of the fix.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Whether this record carries an unnamed-storm sentinel.
    pub fn is_unnamed(&self) -> bool {
        UNNAMED_SENTINELS.contains(&self.name.as_str())
    }
}
