use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::{Alert, AlertKind};
use crate::payload::SensorPayload;

/// What Valyria did about a reading that raised alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyResponse {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub user_id: String,
    pub alerts: Vec<Alert>,
    pub actions_taken: Vec<String>,
}

fn action_for(alert: &Alert) -> String {
    match alert.kind {
        AlertKind::Panic => "Valyria entering emergency mode - asking user status".into(),
        AlertKind::Fall => "Fall detected - initiating immediate response protocol".into(),
        AlertKind::Medical => format!(
            "Medical emergency detected - starting assessment (severity: {})",
            alert.severity
        ),
    }
}

/// Build the response plan for a set of alerts: one action per alert, in order.
pub fn emergency_response(alerts: &[Alert], payload: &SensorPayload) -> EmergencyResponse {
    let actions_taken: Vec<String> = alerts.iter().map(action_for).collect();
    warn!(
        device_id = %payload.device_id,
        user_id = %payload.user_id,
        alerts = alerts.len(),
        actions = ?actions_taken,
        "bracelet emergency response"
    );
    EmergencyResponse {
        timestamp: Utc::now(),
        device_id: payload.device_id.clone(),
        user_id: payload.user_id.clone(),
        alerts: alerts.to_vec(),
        actions_taken,
    }
}
