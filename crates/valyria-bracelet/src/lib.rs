//! # valyria-bracelet
//!
//! Everything Valyria knows about the wearable: the sensor payload it
//! POSTs, the energy state and emergency alerts derived from a reading,
//! the response plan for those alerts, and the in-memory device registry.

pub mod analysis;
pub mod payload;
pub mod registry;
pub mod response;

pub use analysis::{Alert, AlertKind, Analysis, EnergyState, Severity, analyze, detect_alerts, energy_state};
pub use payload::{HeartRate, Motion, SensorPayload, Sensors, Temperature};
pub use registry::{DeviceRecord, DeviceRegistry, UserBaseline};
pub use response::{EmergencyResponse, emergency_response};
