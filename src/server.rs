use crate::config::{AppConfig, FamilyConfig, MapConfig};
use crate::processing::{attribute_sequences, summarize_partial, AttributeSequence};
use crate::render::{legend, symbolize, to_geojson};
use crate::types::{FamilyMinimum, Feature, LegendEntry};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geojson::FeatureCollection as GeoFeatureCollection;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

// Wrapper for RTree indexing
pub struct CityIndex {
    index: usize,
    point: [f64; 2],
}

impl RTreeObject for CityIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for CityIndex {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Everything derived from one dataset load. Rebuilt, never mutated.
pub struct AppState {
    pub features: Vec<Feature>,
    pub minima: FamilyMinimum,
    pub sequences: Vec<AttributeSequence>,
    pub tree: RTree<CityIndex>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, features: Vec<Feature>) -> Result<Self> {
        let families = &config.symbology.families;
        let (minima, missing) = summarize_partial(&features, families)
            .context("Failed to summarize dataset")?;
        for err in &missing {
            warn!("{}; family will not be rendered", err);
        }
        let sequences = attribute_sequences(&features, families)
            .into_iter()
            .filter(|seq| minima.contains_key(&seq.family))
            .collect();

        let tree = RTree::bulk_load(
            features
                .iter()
                .enumerate()
                .map(|(index, f)| CityIndex {
                    index,
                    point: [f.longitude(), f.latitude()],
                })
                .collect(),
        );

        Ok(Self {
            features,
            minima,
            sequences,
            tree,
            config,
        })
    }

    fn family(&self, name: &str) -> Option<&FamilyConfig> {
        self.config.symbology.families.iter().find(|f| f.name == name)
    }

    fn sequence(&self, family: &str) -> Option<&AttributeSequence> {
        self.sequences.iter().find(|s| s.family == family)
    }
}

#[derive(Serialize)]
pub struct FamilySummary {
    pub name: String,
    pub color: String,
    pub minimum: f64,
    pub attributes: Vec<String>,
}

#[derive(Deserialize)]
pub struct SymbolParams {
    pub attribute: Option<String>,
    pub family: Option<String>,
    pub index: Option<usize>,
    /// Steps from `index`, as the slider's step buttons do.
    pub delta: Option<isize>,
}

#[derive(Serialize)]
pub struct CityResponse {
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: u8,
}

#[derive(Deserialize)]
pub struct NearestParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Internal(e) => {
                warn!("Request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/map", get(map_handler))
        .route("/api/families", get(families_handler))
        .route("/api/symbols", get(symbols_handler))
        .route("/api/legend", get(legend_handler))
        .route("/api/cities", get(cities_handler))
        .route("/api/cities/:name", get(city_handler))
        .route("/api/nearest", get(nearest_handler))
        .fallback_service(static_dir)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, features: Vec<Feature>) -> Result<()> {
    info!("Building spatial index for {} cities...", features.len());
    let state = Arc::new(AppState::new(config, features)?);

    let port = state.config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn map_handler(State(state): State<Arc<AppState>>) -> Json<MapConfig> {
    Json(state.config.map.clone())
}

pub async fn families_handler(State(state): State<Arc<AppState>>) -> Json<Vec<FamilySummary>> {
    let summaries = state
        .config
        .symbology
        .families
        .iter()
        .filter_map(|family| {
            let minimum = *state.minima.get(&family.name)?;
            Some(FamilySummary {
                name: family.name.clone(),
                color: family.color.clone(),
                minimum,
                attributes: state
                    .sequence(&family.name)
                    .map(|s| s.attributes.clone())
                    .unwrap_or_default(),
            })
        })
        .collect();
    Json(summaries)
}

/// `?attribute=Pop_1990`, or `?family=Population&index=2[&delta=-1]` (index clamped, default 0).
pub async fn symbols_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SymbolParams>,
) -> Result<Json<GeoFeatureCollection>, ApiError> {
    let attribute = match (params.attribute, params.family) {
        (Some(attribute), _) => attribute,
        (None, Some(family)) => {
            if state.family(&family).is_none() {
                return Err(ApiError::NotFound(format!("Unknown family '{}'", family)));
            }
            let seq = state
                .sequence(&family)
                .ok_or_else(|| ApiError::NotFound(format!("No attributes for family '{}'", family)))?;
            let index = seq.step(params.index.unwrap_or(0), params.delta.unwrap_or(0));
            seq.get_clamped(index)
                .map(str::to_string)
                .ok_or_else(|| ApiError::NotFound(format!("No attributes for family '{}'", family)))?
        }
        (None, None) => {
            return Err(ApiError::BadRequest("Either 'attribute' or 'family' is required".to_string()))
        }
    };

    let known = state.sequences.iter().any(|s| s.position(&attribute).is_some());
    if !known {
        return Err(ApiError::NotFound(format!("Unknown attribute '{}'", attribute)));
    }

    let symbology = &state.config.symbology;
    let symbols = symbolize(
        &state.features,
        &attribute,
        &symbology.families,
        &state.minima,
        symbology.base_radius,
    )
    .map_err(ApiError::Internal)?;
    let layer = to_geojson(&symbols).map_err(ApiError::Internal)?;
    Ok(Json(layer))
}

pub async fn legend_handler(State(state): State<Arc<AppState>>) -> Json<Vec<LegendEntry>> {
    let symbology = &state.config.symbology;
    Json(legend(
        &state.features,
        &symbology.families,
        &state.minima,
        symbology.base_radius,
    ))
}

fn city_response(state: &AppState, feature: &Feature) -> CityResponse {
    CityResponse {
        city: feature.id.clone(),
        latitude: feature.latitude(),
        longitude: feature.longitude(),
        zoom: state.config.map.focus_zoom,
    }
}

/// Dataset order, as the dropdown shows them.
pub async fn cities_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.features.iter().map(|f| f.id.clone()).collect())
}

pub async fn city_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<CityResponse>, ApiError> {
    state
        .features
        .iter()
        .find(|f| f.id == name)
        .map(|f| Json(city_response(&state, f)))
        .ok_or_else(|| ApiError::NotFound(format!("Unknown city '{}'", name)))
}

pub async fn nearest_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearestParams>,
) -> Json<Option<CityResponse>> {
    let nearest = state
        .tree
        .nearest_neighbor(&[params.lon, params.lat])
        .and_then(|c| state.features.get(c.index))
        .map(|f| city_response(&state, f));
    Json(nearest)
}
