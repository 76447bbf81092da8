#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{Value, json};
    use valyria_bracelet::*;

    fn payload(value: Value) -> SensorPayload {
        serde_json::from_value(value).unwrap()
    }

    fn reading(bpm: f64, hrv: f64, temp: f64, intensity: f64, fall: bool) -> SensorPayload {
        payload(json!({
            "device_id": "VAL-001",
            "user_id": "ada",
            "sensors": {
                "heart_rate": {"bpm": bpm, "hrv": hrv},
                "temperature": {"celsius": temp},
                "motion": {"activity": "walking", "fall_detected": fall, "intensity": intensity}
            }
        }))
    }

    // ── Energy state ───────────────────────────────────────────

    #[test]
    fn test_energy_state_emergency_vitals() {
        assert_eq!(energy_state(161.0, 33.0, 0.0, "unknown"), EnergyState::Emergency);
        assert_eq!(energy_state(44.0, 33.0, 0.0, "unknown"), EnergyState::Emergency);
        assert_eq!(energy_state(70.0, 38.5, 0.0, "unknown"), EnergyState::Emergency);
        assert_eq!(energy_state(70.0, 29.9, 0.0, "unknown"), EnergyState::Emergency);
        // bounds are inclusive
        assert_eq!(energy_state(160.0, 38.0, 0.0, "unknown"), EnergyState::Calm);
    }

    #[test]
    fn test_energy_state_rule_order() {
        assert_eq!(energy_state(125.0, 30.5, 2.5, "unknown"), EnergyState::Anxious);
        assert_eq!(energy_state(110.0, 33.0, 3.5, "unknown"), EnergyState::Stressed);
        assert_eq!(energy_state(90.0, 33.0, 1.5, "unknown"), EnergyState::Active);
        assert_eq!(energy_state(70.0, 33.0, 0.5, "unknown"), EnergyState::Calm);
        assert_eq!(energy_state(140.0, 33.0, 5.0, "running"), EnergyState::Active);
        assert_eq!(energy_state(140.0, 33.0, 5.0, "cycling"), EnergyState::Calm);
    }

    #[test]
    fn test_energy_state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(EnergyState::Anxious).unwrap(), json!("anxious"));
        assert_eq!(EnergyState::Emergency.to_string(), "emergency");
    }

    // ── Alerts ─────────────────────────────────────────────────

    #[test]
    fn test_resting_reading_has_no_alerts() {
        let analysis = analyze(&reading(70.0, 50.0, 33.0, 0.0, false));
        assert!(analysis.alerts.is_empty());
        assert_eq!(analysis.energy_state, EnergyState::Calm);
        assert!(!analysis.is_emergency());
    }

    #[test]
    fn test_panic_alert() {
        let alerts = detect_alerts(&reading(140.0, 50.0, 30.5, 4.0, false).sensors);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Panic);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].trigger["motion_intensity"], json!(4.0));
        assert_eq!(
            alerts[0].message,
            "Panic attack detected - elevated HR, cold sweat, agitated movement"
        );
    }

    #[test]
    fn test_all_alerts_in_order() {
        let alerts = detect_alerts(&reading(170.0, 10.0, 29.0, 5.0, true).sensors);
        let kinds: Vec<_> = alerts.iter().map(|a| (a.kind, a.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (AlertKind::Panic, Severity::High),
                (AlertKind::Fall, Severity::High),
                (AlertKind::Medical, Severity::Critical),
                (AlertKind::Medical, Severity::High),
                (AlertKind::Medical, Severity::Medium),
            ]
        );
        assert_eq!(alerts[2].message, "Critical heart rate: 170 BPM");
        assert_eq!(alerts[3].message, "Hypothermia risk: 29°C");
    }

    #[test]
    fn test_fever_message() {
        let alerts = detect_alerts(&reading(80.0, 50.0, 38.5, 0.0, false).sensors);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Fever detected: 38.5°C");
    }

    #[test]
    fn test_alert_serializes_type_field() {
        let alerts = detect_alerts(&reading(70.0, 50.0, 33.0, 0.0, true).sensors);
        let value = serde_json::to_value(&alerts[0]).unwrap();
        assert_eq!(value["type"], "FALL");
        assert_eq!(value["severity"], "HIGH");
        assert_eq!(value["trigger"]["fall_detected"], true);
    }

    // ── Emergency response ─────────────────────────────────────

    #[test]
    fn test_emergency_response_actions() {
        let p = reading(170.0, 10.0, 29.0, 5.0, true);
        let alerts = detect_alerts(&p.sensors);
        let response = emergency_response(&alerts, &p);
        assert_eq!(response.device_id, "VAL-001");
        assert_eq!(response.user_id, "ada");
        assert_eq!(response.alerts.len(), alerts.len());
        assert_eq!(
            response.actions_taken,
            vec![
                "Valyria entering emergency mode - asking user status",
                "Fall detected - initiating immediate response protocol",
                "Medical emergency detected - starting assessment (severity: CRITICAL)",
                "Medical emergency detected - starting assessment (severity: HIGH)",
                "Medical emergency detected - starting assessment (severity: MEDIUM)",
            ]
        );
    }

    // ── Registry ───────────────────────────────────────────────

    #[test]
    fn test_register_seeds_baseline() {
        let registry = DeviceRegistry::new();
        let record = registry.register("VAL-001", "ada", "SN-1");
        assert_eq!(record.status, "active");
        assert!(record.data.is_none());
        let baseline = registry.baseline("ada").unwrap();
        assert_eq!(baseline.resting_heart_rate, 70.0);
        assert_eq!(baseline.normal_temp, 33.0);
        assert!(registry.baseline("bob").is_none());
    }

    #[test]
    fn test_reading_for_unknown_device_creates_entry() {
        let registry = DeviceRegistry::new();
        let p = payload(json!({"device_id": "VAL-9", "sensors": {}}));
        let record = registry.record_reading(&p, json!({"device_id": "VAL-9"}), EnergyState::Calm, Utc::now());
        assert_eq!(record.status, "unregistered");
        assert!(record.user_id.is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.status("VAL-9").unwrap().last_update.is_some());
    }

    #[test]
    fn test_reading_keeps_registration() {
        let registry = DeviceRegistry::new();
        registry.register("VAL-001", "ada", "SN-1");
        let p = payload(json!({"device_id": "VAL-001", "sensors": {}}));
        registry.record_reading(&p, json!({}), EnergyState::Active, Utc::now());
        let status = registry.status("VAL-001").unwrap();
        assert_eq!(status.user_id.as_deref(), Some("ada"));
        assert_eq!(status.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(status.energy_state, Some(EnergyState::Active));
    }

    #[test]
    fn test_devices_for_user() {
        let registry = DeviceRegistry::new();
        registry.register("VAL-002", "ada", "SN-2");
        registry.register("VAL-001", "ada", "SN-1");
        registry.register("VAL-003", "bob", "SN-3");
        let ids: Vec<_> = registry
            .devices_for_user("ada")
            .into_iter()
            .map(|d| d.device_id)
            .collect();
        assert_eq!(ids, vec!["VAL-001", "VAL-002"]);
        assert!(registry.devices_for_user("carol").is_empty());
        assert!(registry.status("nope").is_none());
    }
}
