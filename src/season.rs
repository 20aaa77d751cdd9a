/*!
 * Cyclone season definitions and the season filter.
 *
 * A season is a month window per country. Seasons in the southern hemisphere
 * wrap the year boundary (e.g. November through April), in which case the
 * window covers the target year's months at or after the start month plus
 * the following year's months at or before the end month.
 */

use chrono::{Datelike, NaiveDateTime};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::{
    error::{Error, StormFishResult},
    track::CycloneTrackPoint,
};

/// A cyclone season month window for one country.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Season {
    /// First month of the season, 1 through 12.
    pub start_month: u32,
    /// Last month of the season, 1 through 12. May be less than
    /// `start_month` when the season spans a year boundary.
    pub end_month: u32,
}

impl Season {
    /// Whether this season wraps the year boundary.
    pub fn wraps_year(&self) -> bool {
        self.start_month > self.end_month
    }

    /// Whether a timestamp falls inside this season for the given target
    /// year.
    pub fn contains(&self, timestamp: NaiveDateTime, target_year: i32) -> bool {
        let year = timestamp.year();
        let month = timestamp.month();

        if self.wraps_year() {
            (year == target_year && month >= self.start_month)
                || (year == target_year + 1 && month <= self.end_month)
        } else {
            year == target_year && month >= self.start_month && month <= self.end_month
        }
    }
}

/// Built in season windows by ISO3 country code.
static CYCLONE_SEASONS: Lazy<FxHashMap<&'static str, Season>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("vnm", Season { start_month: 6, end_month: 12 });
    map.insert("fji", Season { start_month: 11, end_month: 4 });
    map.insert("vut", Season { start_month: 1, end_month: 6 });
    map.insert("phl", Season { start_month: 6, end_month: 12 });
    map.insert("bgd", Season { start_month: 3, end_month: 12 });
    map.insert("idn", Season { start_month: 11, end_month: 4 });
    map.insert("tha-khm", Season { start_month: 4, end_month: 11 });
    map
});

/// Look up the season window for a country.
pub fn season_for_country(country: &str) -> StormFishResult<Season> {
    CYCLONE_SEASONS.get(country).copied().ok_or_else(|| {
        Error::Configuration(format!("no cyclone season defined for country '{}'", country))
    })
}

/// Anything with a timestamp can be season filtered.
pub trait Dated {
    fn timestamp(&self) -> NaiveDateTime;
}

impl Dated for CycloneTrackPoint {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl Dated for crate::detection::BoatDetection {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

/// Keep only the records that fall inside the season window for the target
/// year.
pub fn filter_to_season<T: Dated>(records: Vec<T>, season: Season, target_year: i32) -> Vec<T> {
    records
        .into_iter()
        .filter(|r| season.contains(r.timestamp(), target_year))
        .collect()
}

/// Season filter specialized to track points, which also drops the
/// unnamed-storm sentinel records.
pub fn filter_track_points(
    points: Vec<CycloneTrackPoint>,
    season: Season,
    target_year: i32,
) -> Vec<CycloneTrackPoint> {
    points
        .into_iter()
        .filter(|p| !p.is_unnamed() && season.contains(p.timestamp, target_year))
        .collect()
}
