use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

use crate::payload::{SensorPayload, Sensors};

/// Coarse physiological state derived from a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyState {
    Calm,
    Active,
    Stressed,
    Anxious,
    Emergency,
}

impl EnergyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calm => "calm",
            Self::Active => "active",
            Self::Stressed => "stressed",
            Self::Anxious => "anxious",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for EnergyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a reading. Rules are checked top to bottom; the first match wins.
pub fn energy_state(bpm: f64, temp_c: f64, intensity: f64, activity: &str) -> EnergyState {
    // Critical vitals override everything
    if !(45.0..=160.0).contains(&bpm) {
        return EnergyState::Emergency;
    }
    if !(30.0..=38.0).contains(&temp_c) {
        return EnergyState::Emergency;
    }
    // High HR, cold sweat, restless motion
    if bpm > 120.0 && temp_c < 31.0 && intensity > 2.0 {
        return EnergyState::Anxious;
    }
    if (100.0..=120.0).contains(&bpm) && intensity > 3.0 {
        return EnergyState::Stressed;
    }
    if (80.0..=100.0).contains(&bpm) && intensity > 1.0 {
        return EnergyState::Active;
    }
    if (60.0..=80.0).contains(&bpm) && intensity < 1.0 {
        return EnergyState::Calm;
    }
    if activity == "running" {
        return EnergyState::Active;
    }
    EnergyState::Calm
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Panic,
    Fall,
    Medical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        })
    }
}

/// An emergency condition found in a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    /// The sensor values that tripped the alert.
    pub trigger: Value,
    pub message: String,
}

/// Run every detector against the sensors. Alerts come back in a fixed
/// order: panic, fall, heart rate, temperature, heart rate variability.
pub fn detect_alerts(sensors: &Sensors) -> Vec<Alert> {
    let bpm = sensors.heart_rate.bpm;
    let hrv = sensors.heart_rate.hrv;
    let temp_c = sensors.temperature.celsius;
    let motion = &sensors.motion;
    let mut alerts = Vec::new();

    // Panic: racing heart, cold sweat, agitated movement
    if bpm > 130.0 && temp_c < 31.0 && motion.intensity > 3.0 {
        alerts.push(Alert {
            kind: AlertKind::Panic,
            severity: Severity::High,
            trigger: json!({
                "heart_rate": bpm,
                "temperature": temp_c,
                "motion_intensity": motion.intensity,
            }),
            message: "Panic attack detected - elevated HR, cold sweat, agitated movement".into(),
        });
    }

    if motion.fall_detected {
        alerts.push(Alert {
            kind: AlertKind::Fall,
            severity: Severity::High,
            trigger: json!({ "fall_detected": true, "activity": motion.activity }),
            message: "Fall detected - immediate response needed".into(),
        });
    }

    if !(45.0..=160.0).contains(&bpm) {
        alerts.push(Alert {
            kind: AlertKind::Medical,
            severity: Severity::Critical,
            trigger: json!({ "heart_rate": bpm }),
            message: format!("Critical heart rate: {bpm} BPM"),
        });
    }

    if temp_c > 38.0 {
        alerts.push(Alert {
            kind: AlertKind::Medical,
            severity: Severity::High,
            trigger: json!({ "temperature": temp_c }),
            message: format!("Fever detected: {temp_c}°C"),
        });
    } else if temp_c < 30.0 {
        alerts.push(Alert {
            kind: AlertKind::Medical,
            severity: Severity::High,
            trigger: json!({ "temperature": temp_c }),
            message: format!("Hypothermia risk: {temp_c}°C"),
        });
    }

    // Low variability under load can indicate cardiac stress
    if hrv < 20.0 && bpm > 100.0 {
        alerts.push(Alert {
            kind: AlertKind::Medical,
            severity: Severity::Medium,
            trigger: json!({ "hrv": hrv, "heart_rate": bpm }),
            message: "Low heart rate variability - possible cardiac stress".into(),
        });
    }

    alerts
}

/// Alerts plus energy state for one reading.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub alerts: Vec<Alert>,
    pub energy_state: EnergyState,
}

impl Analysis {
    pub fn is_emergency(&self) -> bool {
        !self.alerts.is_empty() || self.energy_state == EnergyState::Emergency
    }
}

pub fn analyze(payload: &SensorPayload) -> Analysis {
    let s = &payload.sensors;
    Analysis {
        alerts: detect_alerts(s),
        energy_state: energy_state(
            s.heart_rate.bpm,
            s.temperature.celsius,
            s.motion.intensity,
            &s.motion.activity,
        ),
    }
}
