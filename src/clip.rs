/*!
 * Coordinate reference handling and clipping of point records to the EEZ.
 *
 * Boundary files declare their CRS as an EPSG code. Point exports sometimes
 * arrive with no declared CRS at all, in which case WGS84 is assumed and a
 * warning is logged. When the declared codes disagree the point records are
 * reprojected into the boundary's CRS before clipping. The only projected
 * CRS this system actually encounters is spherical mercator, so that is the
 * only conversion pair implemented.
 */

use geo::{Intersects, MultiPolygon, Point};
use log::warn;

use crate::{
    detection::BoatDetection,
    error::{Error, StormFishResult},
    track::CycloneTrackPoint,
};

/// Spherical mercator earth radius in meters.
const MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// A coordinate reference system, identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, geographic coordinates in degrees.
    Wgs84,
    /// EPSG:3857, spherical mercator in meters.
    WebMercator,
}

impl Crs {
    /// Map an EPSG code to a supported CRS.
    pub fn from_epsg(code: u32) -> StormFishResult<Self> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 => Ok(Crs::WebMercator),
            other => Err(Error::DataValidation(format!(
                "unsupported coordinate reference system EPSG:{}",
                other
            ))),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }
}

/// Resolve a declared CRS, defaulting to WGS84 when none was declared.
pub fn resolve_crs(declared: Option<u32>, what: &str) -> StormFishResult<Crs> {
    match declared {
        Some(code) => Crs::from_epsg(code),
        None => {
            warn!("{} declares no CRS, assuming EPSG:4326", what);
            Ok(Crs::Wgs84)
        }
    }
}

/// The exclusive economic zone boundary of the run's country.
#[derive(Debug, Clone)]
pub struct EezBoundary {
    pub crs: Crs,
    pub geometry: MultiPolygon<f64>,
}

/// A point record that can be reprojected and clipped.
pub trait GeoRecord {
    fn position(&self) -> (f64, f64);
    fn set_position(&mut self, x: f64, y: f64);
}

impl GeoRecord for BoatDetection {
    fn position(&self) -> (f64, f64) {
        (self.lon, self.lat)
    }

    fn set_position(&mut self, x: f64, y: f64) {
        self.lon = x;
        self.lat = y;
    }
}

impl GeoRecord for CycloneTrackPoint {
    fn position(&self) -> (f64, f64) {
        (self.lon, self.lat)
    }

    fn set_position(&mut self, x: f64, y: f64) {
        self.lon = x;
        self.lat = y;
    }
}

fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = MERCATOR_RADIUS_M * lon.to_radians();
    let y = MERCATOR_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / MERCATOR_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / MERCATOR_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

/// Convert one position between the supported reference systems.
pub fn reproject(from: Crs, to: Crs, x: f64, y: f64) -> (f64, f64) {
    match (from, to) {
        (Crs::Wgs84, Crs::WebMercator) => wgs84_to_mercator(x, y),
        (Crs::WebMercator, Crs::Wgs84) => mercator_to_wgs84(x, y),
        _ => (x, y),
    }
}

/// Reproject a record set in place into the target CRS.
pub fn reproject_records<T: GeoRecord>(records: &mut [T], from: Crs, to: Crs) {
    if from == to {
        return;
    }
    warn!(
        "reprojecting {} records from EPSG:{} to EPSG:{}",
        records.len(),
        from.epsg(),
        to.epsg()
    );
    for record in records {
        let (x, y) = record.position();
        let (x, y) = reproject(from, to, x, y);
        record.set_position(x, y);
    }
}

/// Keep the records whose position intersects the EEZ boundary, reprojecting
/// first when the declared CRS disagrees with the boundary's.
pub fn clip_to_eez<T: GeoRecord>(
    boundary: &EezBoundary,
    mut records: Vec<T>,
    declared_crs: Option<u32>,
    what: &str,
) -> StormFishResult<Vec<T>> {
    let crs = resolve_crs(declared_crs, what)?;
    reproject_records(&mut records, crs, boundary.crs);

    records.retain(|record| {
        let (x, y) = record.position();
        boundary.geometry.intersects(&Point::new(x, y))
    });

    Ok(records)
}
