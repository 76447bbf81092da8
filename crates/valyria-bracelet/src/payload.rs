use serde::{Deserialize, Serialize};
use serde_json::Value;

fn unknown() -> String {
    "unknown".into()
}

/// A reading POSTed by a bracelet. Every sensor field is optional on the
/// wire and takes a resting-adult default when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorPayload {
    pub device_id: String,
    #[serde(default = "unknown")]
    pub user_id: String,
    pub sensors: Sensors,
    /// Either a bare percentage or an object with a `level` field.
    #[serde(default, alias = "battery_level")]
    pub battery: Option<Value>,
}

impl SensorPayload {
    pub fn battery_level(&self) -> Option<i64> {
        match self.battery.as_ref()? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::Object(map) => map
                .get("level")
                .or_else(|| map.get("percent"))
                .and_then(|v| v.as_f64())
                .map(|f| f.round() as i64),
            _ => None,
        }
    }

    pub fn has_known_user(&self) -> bool {
        !self.user_id.is_empty() && self.user_id != "unknown"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensors {
    pub heart_rate: HeartRate,
    pub temperature: Temperature,
    pub motion: Motion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartRate {
    pub bpm: f64,
    /// Heart rate variability in milliseconds.
    pub hrv: f64,
}

impl Default for HeartRate {
    fn default() -> Self {
        Self { bpm: 70.0, hrv: 50.0 }
    }
}

/// Skin temperature, which runs a few degrees below core temperature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Temperature {
    pub celsius: f64,
}

impl Default for Temperature {
    fn default() -> Self {
        Self { celsius: 33.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Motion {
    pub activity: String,
    pub fall_detected: bool,
    pub intensity: f64,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            activity: unknown(),
            fall_detected: false,
            intensity: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let p: SensorPayload =
            serde_json::from_value(json!({"device_id": "VAL-1", "sensors": {}})).unwrap();
        assert_eq!(p.user_id, "unknown");
        assert_eq!(p.sensors.heart_rate.bpm, 70.0);
        assert_eq!(p.sensors.heart_rate.hrv, 50.0);
        assert_eq!(p.sensors.temperature.celsius, 33.0);
        assert_eq!(p.sensors.motion.activity, "unknown");
        assert!(!p.sensors.motion.fall_detected);
        assert!(!p.has_known_user());
    }

    #[test]
    fn partial_sensor_groups() {
        let p: SensorPayload = serde_json::from_value(json!({
            "device_id": "VAL-1",
            "user_id": "ada",
            "sensors": {"heart_rate": {"bpm": 128}, "motion": {"intensity": 4}}
        }))
        .unwrap();
        assert_eq!(p.sensors.heart_rate.bpm, 128.0);
        assert_eq!(p.sensors.heart_rate.hrv, 50.0);
        assert_eq!(p.sensors.motion.intensity, 4.0);
        assert_eq!(p.sensors.motion.activity, "unknown");
    }

    #[test]
    fn battery_shapes() {
        let mut p: SensorPayload =
            serde_json::from_value(json!({"device_id": "d", "sensors": {}, "battery": 81})).unwrap();
        assert_eq!(p.battery_level(), Some(81));
        p.battery = Some(json!({"level": 42.6}));
        assert_eq!(p.battery_level(), Some(43));
        p.battery = Some(json!("full"));
        assert_eq!(p.battery_level(), None);
    }
}
