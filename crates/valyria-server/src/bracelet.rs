//! Bracelet endpoints: telemetry ingestion, registration and lookups.
//!
//! These routes are open; devices post without credentials.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};
use valyria_bracelet::{DeviceRecord, SensorPayload, analyze, emergency_response};
use valyria_store::NewReading;

use crate::{ApiError, AppState};

const INVALID_DATA: &str = "Invalid data format";

pub async fn data_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(raw) = payload.map_err(|_| ApiError::bad_request(INVALID_DATA))?;
    if raw.get("device_id").and_then(Value::as_str).is_none() || raw.get("sensors").is_none() {
        return Err(ApiError::bad_request(INVALID_DATA));
    }
    let reading: SensorPayload =
        serde_json::from_value(raw.clone()).map_err(|_| ApiError::bad_request(INVALID_DATA))?;

    let now = Utc::now();
    let analysis = analyze(&reading);
    let device = state
        .devices
        .record_reading(&reading, raw.clone(), analysis.energy_state, now);
    state.metrics.inc_bracelet_readings();
    state.metrics.add_bracelet_alerts(analysis.alerts.len());

    // A reading without a user falls back to the device's registered owner.
    let user_id = if reading.has_known_user() {
        reading.user_id.clone()
    } else {
        device.user_id.clone().unwrap_or_else(|| reading.user_id.clone())
    };
    let row = NewReading {
        user_id,
        device_id: reading.device_id.clone(),
        heart_rate: raw.pointer("/sensors/heart_rate/bpm").and_then(Value::as_f64),
        temperature: raw
            .pointer("/sensors/temperature/celsius")
            .and_then(Value::as_f64),
        battery_level: reading.battery_level(),
        energy_state: analysis.energy_state.to_string(),
        emergency_detected: analysis.is_emergency(),
        raw_data: raw,
    };
    if let Err(e) = state.store.save_bracelet_reading(row).await {
        error!(device_id = %reading.device_id, error = %e, "failed to persist bracelet reading");
    }

    let mut body = json!({
        "status": "received",
        "timestamp": now,
        "energy_state": analysis.energy_state,
        "alerts_triggered": analysis.alerts.len(),
    });

    if !analysis.alerts.is_empty() {
        let response = emergency_response(&analysis.alerts, &reading);
        body["emergency_response"] =
            serde_json::to_value(&response).map_err(valyria_core::ValyriaError::from)?;

        let auto = state.config.read().bracelet.auto_emergency_mode;
        if auto {
            let reason = format!("bracelet {} raised {} alert(s)", reading.device_id, analysis.alerts.len());
            if state.mode.escalate(&reason) {
                state.metrics.inc_emergency_escalations();
            }
        }
    }

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct RegisterIn {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub serial_number: String,
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterIn>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload.map_err(|_| ApiError::bad_request("Missing required fields"))?;
    let device_id = req.device_id.trim();
    let user_id = req.user_id.trim();
    let serial = req.serial_number.trim();
    if device_id.is_empty() || user_id.is_empty() || serial.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    state.store.get_or_create_user(user_id).await?;
    let record = state.devices.register(device_id, user_id, serial);

    Ok(Json(json!({
        "status": "registered",
        "device_id": record.device_id,
        "user_id": user_id,
        "timestamp": record.registered_at,
        "message": format!("Bracelet {device_id} registered successfully for user {user_id}"),
    })))
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceRecord>, ApiError> {
    state
        .devices
        .status(&device_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Bracelet {device_id} not found")))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let devices = state.devices.devices_for_user(&user_id);
    if devices.is_empty() {
        return Err(ApiError::not_found(format!(
            "No bracelets found for user {user_id}"
        )));
    }

    let limit = params
        .limit
        .unwrap_or_else(|| state.config.read().bracelet.history_limit);
    let readings = state.store.recent_bracelet_readings(&user_id, limit).await?;
    info!(user_id = %user_id, devices = devices.len(), readings = readings.len(), "bracelet history");

    let ids: Vec<&str> = devices.iter().map(|d| d.device_id.as_str()).collect();
    Ok(Json(json!({
        "user_id": user_id,
        "devices": ids,
        "current_data": devices,
        "readings": readings,
    })))
}
