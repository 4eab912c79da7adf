//! HTTP surface for the grid, snapshots, CSV export and the forecast
//! dashboard. One logical mutator per resource: handlers serialize access
//! through mutexes, matching the single-threaded event model the grid
//! assumes.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use log::{error, info};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::cell::CellId;
use crate::dashboard::{
    self, DashboardState, ForecastClient, ForecastQuery, RetrainRequest,
    MIN_HISTORY_FOR_FORECAST,
};
use crate::engine::Sheet;
use crate::export;
use crate::store::{SnapshotStore, StoreError};

pub struct AppState {
    sheet: Mutex<Sheet>,
    store: Mutex<SnapshotStore>,
    dashboard: Mutex<DashboardState>,
    forecast: ForecastClient,
}

#[derive(Deserialize)]
struct CellUpdate {
    cell: String,
    value: String,
}

#[derive(Deserialize)]
struct SnapshotSave {
    id: Option<String>,
    name: String,
}

#[derive(Deserialize)]
struct ForecastParams {
    horizon: Option<u32>,
    product_id: Option<String>,
    demo: Option<bool>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sheet", get(get_sheet))
        .route("/api/cell/:cell_name", get(get_cell))
        .route("/api/update_cell", post(update_cell))
        .route("/api/color/:cell_name", post(cycle_color))
        .route("/api/clear", post(clear_sheet))
        .route("/api/export", get(export_csv))
        .route("/api/import", post(import_csv))
        .route("/api/snapshots", get(list_snapshots).post(save_snapshot))
        .route("/api/snapshots/:id/load", post(load_snapshot))
        .route("/api/snapshots/:id", delete(delete_snapshot))
        .route("/api/forecast", get(get_forecast))
        .route("/api/forecast/retrain", post(retrain))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(
    bind: &str,
    store_path: &str,
    forecast_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState {
        sheet: Mutex::new(Sheet::new()),
        store: Mutex::new(SnapshotStore::open(store_path)?),
        dashboard: Mutex::new(DashboardState::default()),
        forecast: ForecastClient::new(forecast_url),
    });

    let app = router(state);
    let listener = TcpListener::bind(bind).await?;
    info!("listening on http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

fn sheet_json(sheet: &Sheet) -> serde_json::Value {
    let cells: Vec<serde_json::Value> = sheet
        .iter()
        .map(|(id, cell)| {
            serde_json::json!({
                "id": id.name(),
                "raw": cell.raw,
                "value": cell.value.to_string(),
                "color": cell.color,
            })
        })
        .collect();
    serde_json::json!({ "cells": cells })
}

async fn get_sheet(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sheet = state.sheet.lock().unwrap();
    Json(sheet_json(&sheet))
}

async fn get_cell(
    Path(cell_name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(id) = CellId::parse(&cell_name) else {
        return not_found(&format!("no such cell '{}'", cell_name));
    };
    let sheet = state.sheet.lock().unwrap();
    let cell = sheet.cell(id);
    Json(serde_json::json!({
        "id": id.name(),
        "raw": cell.raw,
        "value": cell.value.to_string(),
        "color": cell.color,
    }))
    .into_response()
}

async fn update_cell(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CellUpdate>,
) -> Response {
    let mut sheet = state.sheet.lock().unwrap();
    match sheet.set_cell_input_named(&payload.cell, &payload.value) {
        Ok(id) => Json(serde_json::json!({
            "status": "ok",
            "id": id.name(),
            "value": sheet.cell(id).value.to_string(),
        }))
        .into_response(),
        Err(e) => bad_request(&e.to_string()),
    }
}

async fn cycle_color(
    Path(cell_name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(id) = CellId::parse(&cell_name) else {
        return not_found(&format!("no such cell '{}'", cell_name));
    };
    let mut sheet = state.sheet.lock().unwrap();
    let color = sheet.cycle_color(id);
    Json(serde_json::json!({ "status": "ok", "color": color })).into_response()
}

async fn clear_sheet(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut sheet = state.sheet.lock().unwrap();
    sheet.clear_all();
    Json(serde_json::json!({ "status": "ok" }))
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    let sheet = state.sheet.lock().unwrap();
    let csv = export::to_csv(&sheet);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv")
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"sheet.csv\"",
        )
        .body(axum::body::Body::from(csv))
        .unwrap()
}

async fn import_csv(State(state): State<Arc<AppState>>, body: String) -> Response {
    let mut sheet = state.sheet.lock().unwrap();
    match export::import_csv(&mut sheet, &body) {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => bad_request(&e.to_string()),
    }
}

async fn list_snapshots(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store.lock().unwrap();
    Json(serde_json::json!({ "snapshots": store.list() }))
}

async fn save_snapshot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SnapshotSave>,
) -> Response {
    let sheet = state.sheet.lock().unwrap();
    let mut store = state.store.lock().unwrap();
    match store.save(payload.id.as_deref(), &payload.name, &sheet) {
        Ok(id) => Json(serde_json::json!({ "status": "ok", "id": id })).into_response(),
        Err(e) => {
            error!("snapshot save failed: {}", e);
            server_error(&e.to_string())
        }
    }
}

async fn load_snapshot(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let mut sheet = state.sheet.lock().unwrap();
    let store = state.store.lock().unwrap();
    match store.load(&id, &mut sheet) {
        Ok(()) => Json(sheet_json(&sheet)).into_response(),
        Err(StoreError::NotFound(_)) => not_found(&format!("snapshot '{}' not found", id)),
        Err(e) => {
            error!("snapshot load failed: {}", e);
            server_error(&e.to_string())
        }
    }
}

async fn delete_snapshot(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let mut store = state.store.lock().unwrap();
    match store.delete(&id) {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(StoreError::NotFound(_)) => not_found(&format!("snapshot '{}' not found", id)),
        Err(e) => {
            error!("snapshot delete failed: {}", e);
            server_error(&e.to_string())
        }
    }
}

async fn get_forecast(
    Query(params): Query<ForecastParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let query = ForecastQuery {
        horizon: params.horizon.unwrap_or(7),
        force: true,
        product_id: params.product_id,
        demo: params.demo.unwrap_or(false),
    };

    // The sequence number is taken before the await so a request issued
    // later always outranks this one.
    let seq = state.dashboard.lock().unwrap().begin_request();

    let data = match state.forecast.fetch_forecast(&query).await {
        Ok(data) => data,
        Err(e) => {
            error!("forecast fetch failed: {}", e);
            return bad_gateway(&e.to_string());
        }
    };

    let mut dash = state.dashboard.lock().unwrap();
    if !dash.apply_response(seq, data) {
        return Json(serde_json::json!({ "status": "stale" })).into_response();
    }

    let data = dash.latest().unwrap();
    Json(serde_json::json!({
        "status": "ok",
        "historical": &data.historical,
        "forecast": &data.forecast,
        "restock_recommendations": &data.restock_recommendations,
        "kpis": dashboard::kpis(&data.historical, &data.forecast),
        "recent_sales": dashboard::recent_sales(&data.historical),
        "forecast_rows": dashboard::forecast_rows(&data.forecast, &data.restock_recommendations),
        "enough_history": data.historical.len() >= MIN_HISTORY_FOR_FORECAST,
    }))
    .into_response()
}

async fn retrain(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RetrainRequest>,
) -> Response {
    match state.forecast.trigger_retrain(&payload).await {
        Ok(resp) => Json(serde_json::json!({
            "status": "ok",
            "run_id": resp.run_id,
        }))
        .into_response(),
        Err(e) => {
            error!("retrain trigger failed: {}", e);
            bad_gateway(&e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "status": "error", "message": message })),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, message)
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn server_error(message: &str) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn bad_gateway(message: &str) -> Response {
    error_response(StatusCode::BAD_GATEWAY, message)
}
