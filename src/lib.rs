//! Proportional symbol layers for point datasets of cities.
//!
//! A GeoJSON `FeatureCollection` is loaded into [`types::Feature`]s, summarized
//! into per-family minima ([`processing::summarize`]) and every feature is then
//! scaled to a circle radius with [`symbol::radius`].

pub mod config;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;
pub mod symbol;
pub mod types;
