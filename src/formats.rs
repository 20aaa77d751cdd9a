/*!
 * Boundary formats: GeoJSON geometry collections and CSV tables.
 *
 * Everything the pipeline exchanges with the outside world passes through
 * here. Geometry collections come in as GeoJSON feature collections (the
 * EEZ boundary and precomputed fishing-ground sets); tabular data travels
 * as CSV with the column names of the upstream data products.
 */

use std::{fs::File, io::Write, path::Path};

use chrono::{NaiveDate, NaiveDateTime};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    baseline::ReferenceTable,
    clip::{resolve_crs, EezBoundary},
    detection::BoatDetection,
    error::{Error, StormFishResult},
    geo::multipolygon_centroid,
    grounds::{validate_contour_ids, FishingGround},
    impact::{ImpactRow, RegressionModel},
    track::CycloneTrackPoint,
};

/* ------------------------------------------------------------------------
 * GeoJSON geometry collections
 * ---------------------------------------------------------------------- */

fn coordinate(value: &Value) -> StormFishResult<GeoCoord<f64>> {
    let pair = value
        .as_array()
        .filter(|a| a.len() >= 2)
        .ok_or_else(|| Error::DataValidation("malformed coordinate pair".to_string()))?;
    let x = pair[0]
        .as_f64()
        .ok_or_else(|| Error::DataValidation("non-numeric coordinate".to_string()))?;
    let y = pair[1]
        .as_f64()
        .ok_or_else(|| Error::DataValidation("non-numeric coordinate".to_string()))?;
    Ok(GeoCoord { x, y })
}

fn ring(value: &Value) -> StormFishResult<LineString<f64>> {
    let coords = value
        .as_array()
        .ok_or_else(|| Error::DataValidation("malformed ring".to_string()))?;
    coords.iter().map(coordinate).collect::<StormFishResult<Vec<_>>>().map(LineString::from)
}

fn polygon(value: &Value) -> StormFishResult<Polygon<f64>> {
    let rings = value
        .as_array()
        .ok_or_else(|| Error::DataValidation("malformed polygon".to_string()))?;
    let mut exterior = None;
    let mut interiors = Vec::new();
    for (idx, r) in rings.iter().enumerate() {
        let line = ring(r)?;
        if idx == 0 {
            exterior = Some(line);
        } else {
            interiors.push(line);
        }
    }
    let exterior =
        exterior.ok_or_else(|| Error::DataValidation("polygon without rings".to_string()))?;
    Ok(Polygon::new(exterior, interiors))
}

/// Parse a GeoJSON geometry object into a multipolygon. Plain polygons are
/// promoted to single-member multipolygons.
fn geometry(value: &Value) -> StormFishResult<MultiPolygon<f64>> {
    let kind = value["type"]
        .as_str()
        .ok_or_else(|| Error::DataValidation("geometry without a type".to_string()))?;
    let coordinates = &value["coordinates"];

    match kind {
        "Polygon" => Ok(MultiPolygon::new(vec![polygon(coordinates)?])),
        "MultiPolygon" => {
            let members = coordinates
                .as_array()
                .ok_or_else(|| Error::DataValidation("malformed multipolygon".to_string()))?;
            let polygons =
                members.iter().map(polygon).collect::<StormFishResult<Vec<_>>>()?;
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(Error::DataValidation(format!(
            "unsupported geometry type '{}'",
            other
        ))),
    }
}

/// The EPSG code declared by a feature collection's legacy `crs` member,
/// if any (e.g. `urn:ogc:def:crs:EPSG::4326` or `EPSG:4326`).
fn declared_epsg(collection: &Value) -> Option<u32> {
    let name = collection["crs"]["properties"]["name"].as_str()?;
    name.rsplit(':').find_map(|part| part.parse::<u32>().ok())
}

fn features(collection: &Value) -> StormFishResult<&Vec<Value>> {
    collection["features"]
        .as_array()
        .ok_or_else(|| Error::DataValidation("not a feature collection".to_string()))
}

/// Read the EEZ boundary from the first feature of a GeoJSON file.
pub fn read_eez_boundary(path: &Path) -> StormFishResult<EezBoundary> {
    let collection: Value = serde_json::from_reader(File::open(path)?)?;
    let feature = features(&collection)?.first().ok_or_else(|| {
        Error::DataValidation(format!("{}: no EEZ boundary feature", path.display()))
    })?;

    let geometry = geometry(&feature["geometry"])?;
    if geometry.0.is_empty() {
        return Err(Error::DataValidation(format!(
            "{}: empty EEZ boundary geometry",
            path.display()
        )));
    }

    let crs = resolve_crs(declared_epsg(&collection), "EEZ boundary")?;
    Ok(EezBoundary { crs, geometry })
}

/// Read a precomputed fishing-ground set: one feature per ground carrying a
/// `contour_id` property.
pub fn read_fishing_grounds(path: &Path) -> StormFishResult<Vec<FishingGround>> {
    let collection: Value = serde_json::from_reader(File::open(path)?)?;

    let mut grounds = Vec::new();
    for feature in features(&collection)? {
        let contour_id = feature["properties"]["contour_id"].as_u64().ok_or_else(|| {
            Error::DataValidation(format!(
                "{}: fishing-ground feature without contour_id",
                path.display()
            ))
        })? as usize;
        let polygon = geometry(&feature["geometry"])?;
        let centroid = multipolygon_centroid(&polygon)?;
        grounds.push(FishingGround { contour_id, polygon, centroid });
    }

    grounds.sort_by_key(|g| g.contour_id);
    validate_contour_ids(&grounds).map_err(|_| {
        Error::DataValidation(format!(
            "{}: fishing-ground contour ids must be contiguous from 0",
            path.display()
        ))
    })?;
    Ok(grounds)
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Value {
    let ring_json = |line: &LineString<f64>| -> Value {
        Value::Array(line.coords().map(|c| json!([c.x, c.y])).collect())
    };
    let mut rings = vec![ring_json(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_json));
    Value::Array(rings)
}

/// Write a fishing-ground set as a GeoJSON feature collection.
pub fn write_fishing_grounds(path: &Path, grounds: &[FishingGround]) -> StormFishResult<()> {
    let features: Vec<Value> = grounds
        .iter()
        .map(|ground| {
            json!({
                "type": "Feature",
                "properties": { "contour_id": ground.contour_id },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": Value::Array(
                        ground.polygon.iter().map(polygon_coordinates).collect()
                    ),
                },
            })
        })
        .collect();

    let collection = json!({ "type": "FeatureCollection", "features": features });
    let mut file = File::create(path)?;
    file.write_all(serde_json::to_string_pretty(&collection)?.as_bytes())?;
    Ok(())
}

/* ------------------------------------------------------------------------
 * CSV tables
 * ---------------------------------------------------------------------- */

/// Timestamps arrive in a couple of upstream flavors.
fn parse_timestamp(raw: &str) -> StormFishResult<NaiveDateTime> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    // A bare date is a midnight timestamp.
    Ok(NaiveDate::parse_from_str(raw, "%Y-%m-%d")?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::DataValidation(format!("bad timestamp '{}'", raw)))?)
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(rename = "Lon_DNB")]
    lon: f64,
    #[serde(rename = "Lat_DNB")]
    lat: f64,
    #[serde(rename = "Date_Mscan")]
    timestamp: String,
    #[serde(rename = "QF_Detect")]
    quality_flag: i16,
}

/// Read raw boat detections from a VBD-style CSV export.
pub fn read_boat_detections(path: &Path) -> StormFishResult<Vec<BoatDetection>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut detections = Vec::new();
    for record in reader.deserialize() {
        let raw: RawDetection = record?;
        detections.push(BoatDetection {
            lon: raw.lon,
            lat: raw.lat,
            timestamp: parse_timestamp(&raw.timestamp)?,
            quality_flag: raw.quality_flag,
        });
    }
    Ok(detections)
}

#[derive(Debug, Deserialize)]
struct RawTrackPoint {
    #[serde(rename = "NAME")]
    name: String,
    #[serde(rename = "ISO_TIME")]
    timestamp: String,
    #[serde(rename = "LAT")]
    lat: f64,
    #[serde(rename = "LON")]
    lon: f64,
    #[serde(rename = "USA_WIND")]
    wind: Option<f64>,
    #[serde(rename = "STORM_SPD")]
    storm_speed: Option<f64>,
}

/// Read cyclone track fixes from an IBTrACS-style CSV export. Missing wind
/// or translation-speed cells read as zero.
pub fn read_cyclone_tracks(path: &Path) -> StormFishResult<Vec<CycloneTrackPoint>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut points = Vec::new();
    for record in reader.deserialize() {
        let raw: RawTrackPoint = record?;
        points.push(CycloneTrackPoint {
            name: raw.name,
            lon: raw.lon,
            lat: raw.lat,
            timestamp: parse_timestamp(&raw.timestamp)?,
            wind: raw.wind.unwrap_or(0.0),
            storm_speed: raw.storm_speed.unwrap_or(0.0),
        });
    }
    Ok(points)
}

/// Read the static baseline reference table: a `date_only` column followed
/// by one column per ground index. Rows come back date ascending.
pub fn read_reference_table(path: &Path) -> StormFishResult<ReferenceTable> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.get(0) != Some("date_only") {
        return Err(Error::DataValidation(format!(
            "{}: reference table must start with a date_only column",
            path.display()
        )));
    }
    let ground_count = headers.len() - 1;

    let mut rows: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date = NaiveDate::parse_from_str(&record[0], "%Y-%m-%d")?;
        let mut counts = Vec::with_capacity(ground_count);
        for cell in record.iter().skip(1) {
            counts.push(cell.trim().parse::<f64>().map_err(|_| {
                Error::DataValidation(format!("bad reference count '{}'", cell))
            })?);
        }
        rows.push((date, counts));
    }

    rows.sort_by_key(|(date, _)| *date);
    let (dates, counts) = rows.into_iter().unzip();
    Ok(ReferenceTable { dates, counts })
}

/// Read a regression coefficient table: one row per model term in the fixed
/// order intercept, distance, stm_spd_mean, USA_WIND, wind2, wind3, one
/// `g{i}` column per ground. An empty intercept cell marks the ground as
/// unmodeled.
pub fn read_coefficients(path: &Path) -> StormFishResult<RegressionModel> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let ground_count = headers.len() - 1;

    let mut by_term: Vec<Vec<Option<f64>>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut cells = Vec::with_capacity(ground_count);
        for cell in record.iter().skip(1) {
            let cell = cell.trim();
            if cell.is_empty() {
                cells.push(None);
            } else {
                cells.push(Some(cell.parse::<f64>().map_err(|_| {
                    Error::DataValidation(format!("bad coefficient '{}'", cell))
                })?));
            }
        }
        by_term.push(cells);
    }

    if by_term.len() != 6 {
        return Err(Error::DataValidation(format!(
            "{}: expected 6 coefficient rows, got {}",
            path.display(),
            by_term.len()
        )));
    }

    let mut coefficients = Vec::with_capacity(ground_count);
    for ground in 0..ground_count {
        let column: Vec<Option<f64>> = by_term.iter().map(|row| row[ground]).collect();
        if column[0].is_none() {
            coefficients.push(None);
        } else {
            let mut b = [0.0_f64; 6];
            for (slot, value) in b.iter_mut().zip(&column) {
                *slot = value.unwrap_or(0.0);
            }
            coefficients.push(Some(b));
        }
    }
    Ok(RegressionModel { coefficients })
}

/// Whether the count columns of the impact table hold observed or predicted
/// values, which changes their column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Observed,
    Predicted,
}

/// Write the final impact table: fixed leading columns, then a distance,
/// count, baseline, and difference column per ground.
pub fn write_impact_table(
    path: &Path,
    rows: &[ImpactRow],
    kind: CountKind,
) -> StormFishResult<()> {
    let ground_count = rows.first().map(|r| r.distances_km.len()).unwrap_or(0);

    let mut writer = csv::Writer::from_path(path)?;
    let mut header =
        vec!["NAME".to_string(), "date_only".to_string(), "stm_spd_mean".to_string(),
            "stm_spd_max".to_string(), "USA_WIND".to_string()];
    for ground in 0..ground_count {
        header.push(format!("distance_{}", ground));
        header.push(match kind {
            CountKind::Observed => format!("ground_{}", ground),
            CountKind::Predicted => format!("predict_g{}", ground),
        });
        header.push(format!("base_{}", ground));
        header.push(format!("diff_{}", ground));
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.name.clone(),
            row.date.format("%Y-%m-%d").to_string(),
            format!("{:.2}", row.mean_storm_speed),
            format!("{:.2}", row.max_storm_speed),
            format!("{:.1}", row.max_wind),
        ];
        for ground in 0..ground_count {
            record.push(format!("{:.1}", row.distances_km[ground]));
            record.push(format!("{}", row.boat_counts[ground]));
            record.push(format!("{}", row.baseline[ground]));
            record.push(row.percent_difference[ground].clone());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::geo::polygon;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parse_timestamp_accepts_upstream_flavors() {
        assert!(parse_timestamp("2023-07-01 12:34:56").is_ok());
        assert!(parse_timestamp("2023/07/01 12:34").is_ok());
        let midnight = parse_timestamp("2023-07-01").unwrap();
        assert_eq!(midnight.time(), chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert!(parse_timestamp("July first").is_err());
    }

    #[test]
    fn eez_boundary_reads_polygon_and_crs() {
        let path = temp_file(
            "stormfish_eez_test.geojson",
            r#"{
                "type": "FeatureCollection",
                "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4326" } },
                "features": [{
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]
                    }
                }]
            }"#,
        );

        let boundary = read_eez_boundary(&path).unwrap();
        assert_eq!(boundary.crs.epsg(), 4326);
        assert_eq!(boundary.geometry.0.len(), 1);
    }

    #[test]
    fn fishing_grounds_round_trip_through_geojson() {
        let grounds = vec![FishingGround {
            contour_id: 0,
            polygon: MultiPolygon::new(vec![::geo::polygon![
                (x: 0.0, y: 0.0),
                (x: 2.0, y: 0.0),
                (x: 2.0, y: 2.0),
                (x: 0.0, y: 2.0),
                (x: 0.0, y: 0.0),
            ]]),
            centroid: crate::geo::Coord { lat: 1.0, lon: 1.0 },
        }];

        let path = std::env::temp_dir().join("stormfish_grounds_test.geojson");
        write_fishing_grounds(&path, &grounds).unwrap();
        let read_back = read_fishing_grounds(&path).unwrap();

        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].contour_id, 0);
        assert!((read_back[0].centroid.lon - 1.0).abs() < 1e-9);
        assert!((read_back[0].centroid.lat - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ground_files_with_gapped_contour_ids_are_rejected() {
        let path = temp_file(
            "stormfish_gapped_grounds_test.geojson",
            r#"{
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": { "contour_id": 5 },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]]
                    }
                }]
            }"#,
        );

        let err = read_fishing_grounds(&path).unwrap_err();
        assert!(matches!(err, Error::DataValidation(_)));
        assert!(err.to_string().contains("contiguous"));
    }

    #[test]
    fn detections_csv_parses_vbd_columns() {
        let path = temp_file(
            "stormfish_vbd_test.csv",
            "Lon_DNB,Lat_DNB,Date_Mscan,QF_Detect\n123.5,10.25,2023-07-01 17:30:00,1\n",
        );

        let detections = read_boat_detections(&path).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].quality_flag, 1);
        assert!((detections[0].lon - 123.5).abs() < 1e-12);
    }

    #[test]
    fn tracks_csv_fills_missing_wind_with_zero() {
        let path = temp_file(
            "stormfish_tracks_test.csv",
            "NAME,ISO_TIME,LAT,LON,USA_WIND,STORM_SPD\nMARIA,2023-07-01 06:00:00,13.0,125.0,,9.5\n",
        );

        let points = read_cyclone_tracks(&path).unwrap();
        assert_eq!(points[0].wind, 0.0);
        assert_eq!(points[0].storm_speed, 9.5);
    }

    #[test]
    fn reference_table_sorts_by_date() {
        let path = temp_file(
            "stormfish_reference_test.csv",
            "date_only,0,1\n2023-07-02,20,5\n2023-07-01,10,4\n",
        );

        let table = read_reference_table(&path).unwrap();
        assert_eq!(table.dates[0], NaiveDate::from_ymd_opt(2023, 7, 1).unwrap());
        assert_eq!(table.counts[0], vec![10.0, 4.0]);
        assert_eq!(table.counts[1], vec![20.0, 5.0]);
    }

    #[test]
    fn coefficients_mark_empty_columns_unmodeled() {
        let path = temp_file(
            "stormfish_coefficients_test.csv",
            "model,g0,g1\n\
             intercept,3.8,\n\
             distance,-0.0002,\n\
             stm_spd_mean,-0.007,\n\
             USA_WIND,-0.0003,\n\
             wind2,0.00016,\n\
             wind3,-0.000001,\n",
        );

        let model = read_coefficients(&path).unwrap();
        assert!(model.coefficients[0].is_some());
        assert!(model.coefficients[1].is_none());
    }

    #[test]
    fn impact_table_header_tracks_ground_count_and_kind() {
        let rows = vec![ImpactRow {
            name: "MARIA".to_string(),
            date: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            mean_storm_speed: 15.0,
            max_storm_speed: 20.0,
            max_wind: 90.0,
            distances_km: vec![50.0, 300.0],
            boat_counts: vec![12.0, 7.0],
            baseline: vec![10.0, 7.0],
            percent_difference: vec!["+20.0%".to_string(), "+0.0%".to_string()],
        }];

        let path = std::env::temp_dir().join("stormfish_impact_test.csv");
        write_impact_table(&path, &rows, CountKind::Predicted).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert!(header.starts_with("NAME,date_only,stm_spd_mean,stm_spd_max,USA_WIND"));
        assert!(header.contains("distance_0"));
        assert!(header.contains("predict_g1"));
        assert!(header.contains("diff_1"));
    }
}
