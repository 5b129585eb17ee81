use geo::Point;
use serde::Serialize;
use std::collections::BTreeMap;

/// A city with its position and time-keyed attributes (`Pop_1980`, `Crime_2005`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    /// x = longitude, y = latitude
    pub position: Point<f64>,
    pub attributes: BTreeMap<String, f64>,
}

impl Feature {
    pub fn latitude(&self) -> f64 {
        self.position.y()
    }

    pub fn longitude(&self) -> f64 {
        self.position.x()
    }
}

pub type FeatureCollection = Vec<Feature>;

/// Minimum observed value per family, keyed by family name.
pub type FamilyMinimum = BTreeMap<String, f64>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkerStyle {
    pub fill_color: String,
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Symbol {
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub attribute: String,
    pub value: f64,
    pub radius: f64,
    pub style: MarkerStyle,
    pub popup: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LegendCircle {
    pub value: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LegendEntry {
    pub family: String,
    pub color: String,
    pub circles: Vec<LegendCircle>,
}
