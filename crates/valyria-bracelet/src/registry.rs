//! In-memory registry of bracelet devices.
//!
//! Holds each device's registration and its most recent reading, plus a
//! per-user physiological baseline seeded at first registration. Readings
//! are also persisted by the store; this is the hot view.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use valyria_core::{DeviceId, UserId};

use crate::analysis::EnergyState;
use crate::payload::SensorPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub user_id: Option<UserId>,
    pub serial_number: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
    /// `active` once registered, `unregistered` when only readings were seen.
    pub status: String,
    pub last_update: Option<DateTime<Utc>>,
    /// The raw payload of the latest reading.
    pub data: Option<Value>,
    pub energy_state: Option<EnergyState>,
}

impl DeviceRecord {
    fn unregistered(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            user_id: None,
            serial_number: None,
            registered_at: None,
            status: "unregistered".into(),
            last_update: None,
            data: None,
            energy_state: None,
        }
    }
}

/// Per-user reference values, to be calibrated from real readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBaseline {
    pub resting_heart_rate: f64,
    pub normal_temp: f64,
    pub activity_patterns: serde_json::Map<String, Value>,
}

impl Default for UserBaseline {
    fn default() -> Self {
        Self {
            resting_heart_rate: 70.0,
            normal_temp: 33.0,
            activity_patterns: serde_json::Map::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<DashMap<DeviceId, DeviceRecord>>,
    baselines: Arc<DashMap<UserId, UserBaseline>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a device for a user. Any previous reading
    /// for the device is discarded.
    pub fn register(&self, device_id: &str, user_id: &str, serial_number: &str) -> DeviceRecord {
        let record = DeviceRecord {
            device_id: device_id.to_string(),
            user_id: Some(user_id.to_string()),
            serial_number: Some(serial_number.to_string()),
            registered_at: Some(Utc::now()),
            status: "active".into(),
            last_update: None,
            data: None,
            energy_state: None,
        };
        self.devices.insert(device_id.to_string(), record.clone());
        self.baselines.entry(user_id.to_string()).or_default();
        info!(device_id, user_id, "bracelet registered");
        record
    }

    /// Store a reading as the device's latest. A reading that names a user
    /// re-binds the device to that user; registration details are kept.
    pub fn record_reading(
        &self,
        payload: &SensorPayload,
        raw: Value,
        energy_state: EnergyState,
        at: DateTime<Utc>,
    ) -> DeviceRecord {
        let mut entry = self
            .devices
            .entry(payload.device_id.clone())
            .or_insert_with(|| DeviceRecord::unregistered(&payload.device_id));
        if payload.has_known_user() {
            entry.user_id = Some(payload.user_id.clone());
        }
        entry.last_update = Some(at);
        entry.data = Some(raw);
        entry.energy_state = Some(energy_state);
        debug!(device_id = %payload.device_id, %energy_state, "bracelet reading recorded");
        entry.clone()
    }

    pub fn status(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.get(device_id).map(|r| r.clone())
    }

    /// Devices bound to a user, ordered by device id.
    pub fn devices_for_user(&self, user_id: &str) -> Vec<DeviceRecord> {
        let mut devices: Vec<DeviceRecord> = self
            .devices
            .iter()
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .map(|r| r.clone())
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    pub fn baseline(&self, user_id: &str) -> Option<UserBaseline> {
        self.baselines.get(user_id).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
