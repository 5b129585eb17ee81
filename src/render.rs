use crate::config::{AppConfig, FamilyConfig};
use crate::processing::{family_of, family_maxima, period_of, AttributeSequence};
use crate::symbol::radius;
use crate::types::{FamilyMinimum, Feature, LegendCircle, LegendEntry, MarkerStyle, Symbol};
use anyhow::{anyhow, Context, Result};
use html_escape::encode_text;
use geojson::{Feature as GeoFeature, FeatureCollection as GeoFeatureCollection, Geometry, JsonObject, Value};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const STROKE_COLOR: &str = "#000";

pub fn marker_style(family: &FamilyConfig) -> MarkerStyle {
    MarkerStyle {
        fill_color: family.color.clone(),
        color: STROKE_COLOR.to_string(),
        weight: 1.0,
        opacity: 1.0,
        fill_opacity: 0.8,
    }
}

pub fn popup_content(city: &str, family: &str, attribute: &str, value: f64) -> String {
    let period = period_of(attribute).unwrap_or(attribute);
    format!(
        "<p><b>City:</b> {}</p><p><b>{} in {}:</b> {}</p>",
        encode_text(city),
        encode_text(family),
        encode_text(period),
        value
    )
}

/// A single path component: no separators, not `.` or `..`.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Symbols for every feature carrying `attribute`.
///
/// Fails if the attribute matches no family, or its family has no minimum.
/// Features whose value cannot be scaled are skipped.
pub fn symbolize(
    features: &[Feature],
    attribute: &str,
    families: &[FamilyConfig],
    minima: &FamilyMinimum,
    base_radius: f64,
) -> Result<Vec<Symbol>> {
    let family = family_of(attribute, families)
        .map(|idx| &families[idx])
        .ok_or_else(|| anyhow!("Attribute '{}' does not belong to any family", attribute))?;
    let min = *minima
        .get(&family.name)
        .ok_or_else(|| anyhow!("No minimum available for family '{}'", family.name))?;
    let style = marker_style(family);

    let mut symbols = Vec::new();
    for feature in features {
        let Some(&value) = feature.attributes.get(attribute) else {
            continue;
        };
        match radius(value, min, base_radius) {
            Ok(r) => symbols.push(Symbol {
                city: feature.id.clone(),
                latitude: feature.latitude(),
                longitude: feature.longitude(),
                attribute: attribute.to_string(),
                value,
                radius: r,
                style: style.clone(),
                popup: popup_content(&feature.id, &family.name, attribute, value),
            }),
            Err(e) => warn!(city = %feature.id, attribute, "Skipping symbol: {}", e),
        }
    }
    Ok(symbols)
}

/// Symbol layer as a GeoJSON FeatureCollection of points.
pub fn to_geojson(symbols: &[Symbol]) -> Result<GeoFeatureCollection> {
    let features = symbols
        .iter()
        .map(|s| {
            let properties: JsonObject = match serde_json::to_value(s)? {
                serde_json::Value::Object(map) => map,
                _ => return Err(anyhow!("Symbol did not serialize to an object")),
            };
            Ok(GeoFeature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![s.longitude, s.latitude]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(GeoFeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Reference circles for the smallest and largest value of each summarized family.
pub fn legend(
    features: &[Feature],
    families: &[FamilyConfig],
    minima: &FamilyMinimum,
    base_radius: f64,
) -> Vec<LegendEntry> {
    let maxima = family_maxima(features, families);

    families
        .iter()
        .filter_map(|family| {
            let min = *minima.get(&family.name)?;
            let max = maxima.get(&family.name).copied().unwrap_or(min);
            let circles = [min, max]
                .iter()
                .filter_map(|&value| {
                    radius(value, min, base_radius)
                        .ok()
                        .map(|r| LegendCircle { value, radius: r })
                })
                .collect::<Vec<_>>();
            if circles.is_empty() {
                return None;
            }
            Some(LegendEntry {
                family: family.name.clone(),
                color: family.color.clone(),
                circles,
            })
        })
        .collect()
}

/// Writes `{dir}/{family}/{attribute}.geojson` for every attribute and `{dir}/legend.json`.
pub fn generate_layers(
    config: &AppConfig,
    features: &[Feature],
    minima: &FamilyMinimum,
    sequences: &[AttributeSequence],
) -> Result<usize> {
    let out_dir = &config.output.dir;
    let symbology = &config.symbology;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;

    let jobs: Vec<(&str, &str)> = sequences
        .iter()
        .filter(|seq| minima.contains_key(&seq.family))
        .flat_map(|seq| seq.attributes.iter().map(move |a| (seq.family.as_str(), a.as_str())))
        .filter(|(family, attribute)| {
            let safe = is_safe_file_name(family) && is_safe_file_name(attribute);
            if !safe {
                warn!(family, attribute, "Skipping layer: name is not a valid file name");
            }
            safe
        })
        .collect();

    info!("Writing {} symbol layers to {:?}", jobs.len(), out_dir);

    jobs.par_iter()
        .map(|(family, attribute)| {
            let symbols = symbolize(features, attribute, &symbology.families, minima, symbology.base_radius)?;
            let dir = out_dir.join(family);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
            write_layer(&dir.join(format!("{}.geojson", attribute)), &symbols)
        })
        .collect::<Result<Vec<()>>>()?;

    let entries = legend(features, &symbology.families, minima, symbology.base_radius);
    let legend_path = out_dir.join("legend.json");
    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(&legend_path, json)
        .with_context(|| format!("Failed to write legend {:?}", legend_path))?;

    Ok(jobs.len())
}

fn write_layer(path: &Path, symbols: &[Symbol]) -> Result<()> {
    let collection = to_geojson(symbols)?;
    fs::write(path, serde_json::to_string(&collection)?)
        .with_context(|| format!("Failed to write layer {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn families() -> Vec<FamilyConfig> {
        vec![
            FamilyConfig::new("Population", "Pop", "#ff7800"),
            FamilyConfig::new("Crime", "Crime", "#ff0000"),
        ]
    }

    fn features() -> Vec<Feature> {
        let mk = |id: &str, lon: f64, lat: f64, attrs: &[(&str, f64)]| Feature {
            id: id.to_string(),
            position: Point::new(lon, lat),
            attributes: attrs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };
        vec![
            mk("A", -90.0, 40.0, &[("Pop_1980", 100.0), ("Pop_1990", 150.0), ("Crime_1990", 8.0)]),
            mk("B", -80.0, 35.0, &[("Pop_1980", 50.0), ("Pop_1990", 80.0)]),
        ]
    }

    fn minima() -> FamilyMinimum {
        FamilyMinimum::from([("Population".to_string(), 50.0), ("Crime".to_string(), 8.0)])
    }

    #[test]
    fn symbols_for_attribute() {
        let symbols = symbolize(&features(), "Pop_1990", &families(), &minima(), 5.0).unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].city, "A");
        assert!((symbols[0].radius - 1.0083 * 3f64.powf(0.5715) * 5.0).abs() < 1e-9);
        assert_eq!(symbols[0].style.fill_color, "#ff7800");
        assert_eq!(symbols[0].popup, "<p><b>City:</b> A</p><p><b>Population in 1990:</b> 150</p>");
        assert_eq!(symbols[1].latitude, 35.0);
    }

    #[test]
    fn features_without_attribute_get_no_symbol() {
        let symbols = symbolize(&features(), "Crime_1990", &families(), &minima(), 5.0).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].style.fill_color, "#ff0000");
    }

    #[test]
    fn unknown_attribute_or_family_fails() {
        assert!(symbolize(&features(), "Area_1990", &families(), &minima(), 5.0).is_err());
        let pop_only = FamilyMinimum::from([("Population".to_string(), 50.0)]);
        assert!(symbolize(&features(), "Crime_1990", &families(), &pop_only, 5.0).is_err());
    }

    #[test]
    fn invalid_values_are_skipped() {
        let mut data = features();
        data[1].attributes.insert("Pop_1990".to_string(), -5.0);
        let symbols = symbolize(&data, "Pop_1990", &families(), &minima(), 5.0).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].city, "A");
    }

    #[test]
    fn geojson_layer_has_points_and_properties() {
        let symbols = symbolize(&features(), "Pop_1980", &families(), &minima(), 5.0).unwrap();
        let layer = to_geojson(&symbols).unwrap();
        assert_eq!(layer.features.len(), 2);
        let first = &layer.features[0];
        match first.geometry.as_ref().map(|g| &g.value) {
            Some(Value::Point(c)) => assert_eq!(c, &vec![-90.0, 40.0]),
            other => panic!("unexpected geometry {:?}", other),
        }
        let props = first.properties.as_ref().unwrap();
        assert_eq!(props["city"], "A");
        assert!(props["radius"].as_f64().unwrap() > 5.0);
        assert_eq!(props["style"]["fill_opacity"], 0.8);
    }

    #[test]
    fn legend_has_min_and_max_circles() {
        let entries = legend(&features(), &families(), &minima(), 5.0);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].family, "Population");
        assert_eq!(entries[0].circles[0].value, 50.0);
        assert_eq!(entries[0].circles[1].value, 150.0);
        assert!(entries[0].circles[0].radius < entries[0].circles[1].radius);
        assert_eq!(entries[1].circles[0].value, 8.0);
    }

    #[test]
    fn popup_escapes_markup() {
        assert_eq!(
            popup_content("<b>A & B</b>", "Population", "Pop_1990", 2.0),
            "<p><b>City:</b> &lt;b&gt;A &amp; B&lt;/b&gt;</p><p><b>Population in 1990:</b> 2</p>"
        );
    }

    #[test]
    fn file_names_must_be_single_components() {
        assert!(is_safe_file_name("Pop_1990"));
        assert!(is_safe_file_name("Pop_1990.v2"));
        assert!(!is_safe_file_name("Pop_2000/2010"));
        assert!(!is_safe_file_name("Pop_\\x"));
        assert!(!is_safe_file_name(".."));
        assert!(!is_safe_file_name(""));
    }

    #[test]
    fn popup_without_period_uses_attribute_name() {
        assert_eq!(
            popup_content("X", "Population", "Pop", 1.0),
            "<p><b>City:</b> X</p><p><b>Population in Pop:</b> 1</p>"
        );
    }
}
