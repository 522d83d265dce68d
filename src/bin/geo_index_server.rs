//! HTTP edge for the geo-proximity index: management endpoints mint
//! tokens, the geo endpoints spend them.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use sx9_geo_index::{
    AppAuthToken, CacheMetrics, GeoApi, GeoAuthToken, GeoCoord, GeoError, GeoServiceConfig,
    GeoWorld, ManagementApi, NearbyPoint, PointCoordEntry, SubjectTag,
};

type AppState = Arc<GeoWorld>;

// ---------------------------------------------------------------------------
// Management surface
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateAppRequest {
    max_zoom_level: u8,
}

#[derive(Serialize)]
struct CreateAppResponse {
    app_token: AppAuthToken,
}

async fn create_app(
    State(world): State<AppState>,
    Path(app_id): Path<String>,
    Json(req): Json<CreateAppRequest>,
) -> Result<Json<CreateAppResponse>, GeoError> {
    let app_token = ManagementApi::create_app(&world, &app_id, req.max_zoom_level)?;
    Ok(Json(CreateAppResponse { app_token }))
}

#[derive(Deserialize)]
struct CreatePointRequest {
    app_token: AppAuthToken,
}

async fn create_point(
    State(world): State<AppState>,
    Path((_app_id, point_id)): Path<(String, String)>,
    Json(req): Json<CreatePointRequest>,
) -> Result<(), GeoError> {
    ManagementApi::create_point(&world, &req.app_token, &point_id)
}

#[derive(Deserialize)]
struct DeletePointRequest {
    app_token: AppAuthToken,
}

async fn delete_point(
    State(world): State<AppState>,
    Path((_app_id, point_id)): Path<(String, String)>,
    Json(req): Json<DeletePointRequest>,
) -> Result<(), GeoError> {
    ManagementApi::delete_point(&world, &req.app_token, &point_id)
}

#[derive(Deserialize)]
struct SetSubjectsRequest {
    app_token: AppAuthToken,
    subjects: Vec<SubjectTag>,
}

async fn set_point_subjects(
    State(world): State<AppState>,
    Path((_app_id, point_id)): Path<(String, String)>,
    Json(req): Json<SetSubjectsRequest>,
) -> Result<(), GeoError> {
    ManagementApi::set_point_subjects(&world, &req.app_token, &point_id, req.subjects)
}

#[derive(Deserialize)]
struct AppTokenOnly {
    app_token: AppAuthToken,
}

async fn token_for_update(
    State(world): State<AppState>,
    Path((_app_id, point_id)): Path<(String, String)>,
    Json(req): Json<AppTokenOnly>,
) -> Result<Json<GeoAuthToken>, GeoError> {
    let token = ManagementApi::get_update_point_auth_token(&world, &req.app_token, &point_id)?;
    Ok(Json(token))
}

#[derive(Deserialize)]
struct NearestTokenRequest {
    app_token: AppAuthToken,
    subject_id: String,
}

async fn token_for_nearest(
    State(world): State<AppState>,
    Path((_app_id, point_id)): Path<(String, String)>,
    Json(req): Json<NearestTokenRequest>,
) -> Result<Json<GeoAuthToken>, GeoError> {
    let token = ManagementApi::get_nearest_points_auth_token(
        &world,
        &req.app_token,
        &point_id,
        &req.subject_id,
    )?;
    Ok(Json(token))
}

#[derive(Deserialize)]
struct CoordsTokenRequest {
    app_token: AppAuthToken,
    point_ids: Vec<String>,
}

async fn token_for_coords(
    State(world): State<AppState>,
    Path((_app_id, point_id)): Path<(String, String)>,
    Json(req): Json<CoordsTokenRequest>,
) -> Result<Json<GeoAuthToken>, GeoError> {
    let token =
        ManagementApi::get_points_coords_auth_token(&world, &req.app_token, &point_id, req.point_ids)?;
    Ok(Json(token))
}

// ---------------------------------------------------------------------------
// Geo surface
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UpdatePointRequest {
    geo_token: GeoAuthToken,
    coord: GeoCoord,
}

async fn geo_update(
    State(world): State<AppState>,
    Json(req): Json<UpdatePointRequest>,
) -> Result<(), GeoError> {
    GeoApi::update_point(&world, &req.geo_token, req.coord)
}

#[derive(Deserialize)]
struct NearestPointsRequest {
    geo_token: GeoAuthToken,
    coord: Option<GeoCoord>,
    radius: Option<f64>,
    points_limit: Option<usize>,
}

async fn geo_nearest(
    State(world): State<AppState>,
    Json(req): Json<NearestPointsRequest>,
) -> Result<Json<Vec<NearbyPoint>>, GeoError> {
    let results = GeoApi::nearest_points(&world, &req.geo_token, req.coord, req.radius, req.points_limit)?;
    Ok(Json(results))
}

#[derive(Deserialize)]
struct PointsCoordsRequest {
    geo_token: GeoAuthToken,
    coord: Option<GeoCoord>,
    radius: Option<f64>,
    points_limit: Option<usize>,
}

async fn geo_coords(
    State(world): State<AppState>,
    Json(req): Json<PointsCoordsRequest>,
) -> Result<Json<Vec<PointCoordEntry>>, GeoError> {
    let results = GeoApi::points_coords(&world, &req.geo_token, req.coord, req.radius, req.points_limit)?;
    Ok(Json(results))
}

// ---------------------------------------------------------------------------
// Health & metrics
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    apps: usize,
    cache_buckets: u64,
}

async fn health_check(State(world): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        apps: world.storage.app_count(),
        cache_buckets: world.cache.metrics().buckets,
    })
}

async fn get_metrics(State(world): State<AppState>) -> Json<CacheMetrics> {
    Json(world.cache.metrics())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sx9_geo_index=info".parse()?),
        )
        .init();

    let config = GeoServiceConfig::from_env();

    info!("Starting geo-proximity index");
    info!("  Node ID: {}", config.node_id);
    info!("  Port: {}", config.port);

    let world: AppState = Arc::new(GeoWorld::new());

    let app = Router::new()
        .route("/apps/:app", post(create_app))
        .route("/apps/:app/points/:point", post(create_point))
        .route("/apps/:app/points/:point", delete(delete_point))
        .route(
            "/apps/:app/points/:point/subjects",
            put(set_point_subjects),
        )
        .route(
            "/apps/:app/points/:point/tokens/update",
            post(token_for_update),
        )
        .route(
            "/apps/:app/points/:point/tokens/nearest",
            post(token_for_nearest),
        )
        .route(
            "/apps/:app/points/:point/tokens/coords",
            post(token_for_coords),
        )
        .route("/geo/update", post(geo_update))
        .route("/geo/nearest", post(geo_nearest))
        .route("/geo/coords", post(geo_coords))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(10))),
        )
        .with_state(world);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
