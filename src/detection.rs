use chrono::{NaiveDate, NaiveDateTime};

/**
 * A single satellite boat detection.
 *
 * One detection is one boat light seen by the satellite on one overpass.
 * Detections are immutable once ingested and owned by the run that loaded
 * them.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoatDetection {
    /// Longitude of the detection in degrees.
    pub lon: f64,
    /// Latitude of the detection in degrees.
    pub lat: f64,
    /// The scan time of the detection.
    pub timestamp: NaiveDateTime,
    /// Detection quality flag straight from the source product.
    pub quality_flag: i16,
}

/// Quality flags that indicate a usable boat detection.
pub const ACCEPTED_QUALITY_FLAGS: [i16; 5] = [1, 2, 3, 8, 10];

impl BoatDetection {
    /// The calendar date of the detection.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Whether the quality flag marks this as a usable detection.
    pub fn is_acceptable_quality(&self) -> bool {
        ACCEPTED_QUALITY_FLAGS.contains(&self.quality_flag)
    }
}

/// Keep only acceptable-quality detections and drop exact duplicates.
///
/// Quality screening is normally done upstream, but raw exports do show up
/// with duplicated rows, so this is applied again at ingestion.
pub fn screen_detections(mut detections: Vec<BoatDetection>) -> Vec<BoatDetection> {
    detections.retain(BoatDetection::is_acceptable_quality);
    detections.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.lon.total_cmp(&b.lon))
            .then(a.lat.total_cmp(&b.lat))
            .then(a.quality_flag.cmp(&b.quality_flag))
    });
    detections.dedup();
    detections
}
