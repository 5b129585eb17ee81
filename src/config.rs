use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::render::is_safe_file_name;
use crate::symbol::DEFAULT_BASE_RADIUS;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub symbology: SymbologyConfig,
    #[serde(default)]
    pub map: MapConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub geojson: PathBuf,
    #[serde(default = "default_id_property")]
    pub id_property: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SymbologyConfig {
    #[serde(default = "default_base_radius")]
    pub base_radius: f64,
    #[serde(default = "default_families")]
    pub families: Vec<FamilyConfig>,
}

/// An attribute family: every attribute whose name starts with `prefix` belongs to it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FamilyConfig {
    pub name: String,
    pub prefix: String,
    pub color: String,
}

impl FamilyConfig {
    pub fn new(name: &str, prefix: &str, color: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            color: color.to_string(),
        }
    }
}

/// Passed through to the front-end untouched.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub title: String,
    pub center: [f64; 2],
    pub zoom: u8,
    pub focus_zoom: u8,
    pub tile_url: String,
    pub attribution: String,
    pub source_note: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_id_property() -> String {
    "City".to_string()
}

fn default_base_radius() -> f64 {
    DEFAULT_BASE_RADIUS
}

fn default_families() -> Vec<FamilyConfig> {
    vec![
        FamilyConfig::new("Population", "Pop", "#ff7800"),
        FamilyConfig::new("Crime", "Crime", "#ff0000"),
    ]
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SymbologyConfig {
    fn default() -> Self {
        Self {
            base_radius: default_base_radius(),
            families: default_families(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            title: "Proportional Symbols".to_string(),
            center: [37.8, -96.0],
            zoom: 3,
            focus_zoom: 10,
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; <a href=\"http://www.openstreetmap.org/copyright\">OpenStreetMap contributors</a>".to_string(),
            source_note: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let symbology = &self.symbology;
        if !(symbology.base_radius.is_finite() && symbology.base_radius > 0.0) {
            return Err(anyhow!("base_radius must be positive, got {}", symbology.base_radius));
        }
        if symbology.families.is_empty() {
            return Err(anyhow!("At least one attribute family must be configured"));
        }

        let mut seen = HashSet::new();
        for family in &symbology.families {
            if !seen.insert(family.name.as_str()) {
                return Err(anyhow!("Duplicate family name '{}'", family.name));
            }
            if !is_safe_file_name(&family.name) {
                return Err(anyhow!("Family name '{}' cannot be used as a directory name", family.name));
            }
            if family.prefix.is_empty() {
                return Err(anyhow!("Family '{}' has an empty prefix", family.name));
            }
            if !is_hex_color(&family.color) {
                return Err(anyhow!("Family '{}' has invalid color '{}'", family.name, family.color));
            }
        }
        Ok(())
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
