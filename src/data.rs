use crate::config::AppConfig;
use crate::types::{Feature, FeatureCollection};
use anyhow::{anyhow, Context, Result};
use geo::Point;
use geojson::{GeoJson, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

pub fn load_data(config: &AppConfig) -> Result<FeatureCollection> {
    load_geojson(&config.input.geojson, &config.input.id_property)
}

pub fn load_geojson(path: &Path, id_property: &str) -> Result<FeatureCollection> {
    info!("Loading GeoJSON from {:?}...", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;
    let features = collect_features(geojson, id_property)?;
    info!("Loaded {} features", features.len());
    Ok(features)
}

pub fn parse_geojson(content: &str, id_property: &str) -> Result<FeatureCollection> {
    let geojson: GeoJson = content.parse().context("Failed to parse GeoJSON")?;
    collect_features(geojson, id_property)
}

fn collect_features(geojson: GeoJson, id_property: &str) -> Result<FeatureCollection> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::with_capacity(collection.features.len());

    for (i, feature) in collection.features.into_iter().enumerate() {
        let Some(props) = feature.properties else {
            warn!(index = i, "Skipping feature without properties");
            continue;
        };

        let id = match props.get(id_property) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                warn!(index = i, "Skipping feature without '{}' property", id_property);
                continue;
            }
        };

        let position = match feature.geometry.map(|g| g.value) {
            Some(Value::Point(coords)) if coords.len() >= 2 => Point::new(coords[0], coords[1]),
            _ => {
                warn!(city = %id, "Skipping feature without point geometry");
                continue;
            }
        };

        let attributes: BTreeMap<String, f64> = props
            .iter()
            .filter(|(key, _)| key.as_str() != id_property)
            .filter_map(|(key, value)| numeric(value).map(|v| (key.clone(), v)))
            .collect();

        features.push(Feature { id, position, attributes });
    }

    Ok(features)
}

/// Numbers, or strings holding a number. Non-finite values are dropped.
fn numeric(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "City": "Madison", "Pop_1980": 170616, "Pop_1990": "191262", "Note": "capital" },
                "geometry": { "type": "Point", "coordinates": [-89.4012, 43.0731] }
            },
            {
                "type": "Feature",
                "properties": { "Pop_1980": 10 },
                "geometry": { "type": "Point", "coordinates": [0.0, 0.0] }
            },
            {
                "type": "Feature",
                "properties": { "City": "Nowhere", "Pop_1980": 10 },
                "geometry": null
            },
            {
                "type": "Feature",
                "properties": { "City": "Line", "Pop_1980": 10 },
                "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] }
            }
        ]
    }"#;

    #[test]
    fn keeps_point_features_with_ids() {
        let features = parse_geojson(SAMPLE, "City").unwrap();
        assert_eq!(features.len(), 1);

        let madison = &features[0];
        assert_eq!(madison.id, "Madison");
        assert_eq!(madison.longitude(), -89.4012);
        assert_eq!(madison.latitude(), 43.0731);
        assert_eq!(madison.attributes.get("Pop_1980"), Some(&170616.0));
        assert_eq!(madison.attributes.get("Pop_1990"), Some(&191262.0));
        assert!(!madison.attributes.contains_key("Note"));
        assert!(!madison.attributes.contains_key("City"));
    }

    #[test]
    fn rejects_non_collection() {
        let point = r#"{ "type": "Point", "coordinates": [1.0, 2.0] }"#;
        assert!(parse_geojson(point, "City").is_err());
        assert!(parse_geojson("not json", "City").is_err());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(numeric(&serde_json::json!(12)), Some(12.0));
        assert_eq!(numeric(&serde_json::json!(" 3.5 ")), Some(3.5));
        assert_eq!(numeric(&serde_json::json!("NaN")), None);
        assert_eq!(numeric(&serde_json::json!(null)), None);
        assert_eq!(numeric(&serde_json::json!(true)), None);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_geojson(Path::new("does/not/exist.geojson"), "City").is_err());
    }
}
