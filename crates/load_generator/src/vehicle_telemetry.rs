use chrono::{DateTime, Local};
use rand::Rng;
use serde::Serialize;

pub const MAINTENANCE_STATUSES: [&str; 2] = ["OK", "NEEDS_MAINTENANCE"];

/// One synthetic vehicle reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleTelemetry {
    pub vehicle_id: String,
    pub ts: String,
    pub location_lat: f64,
    pub location_long: f64,
    pub speed: f64,
    pub battery_level: f64,
    pub maintenance_status: String,
    pub passenger_count: u8,
}

impl VehicleTelemetry {
    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng(), Local::now())
    }

    pub fn generate<R: Rng>(rng: &mut R, now: DateTime<Local>) -> Self {
        Self {
            vehicle_id: xid::new().to_string(),
            ts: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            location_lat: rng.gen_range(-90.0..=90.0),
            location_long: rng.gen_range(-180.0..=180.0),
            speed: rng.gen_range(0.0..=100.0),
            battery_level: rng.gen_range(0.0..=100.0),
            maintenance_status: MAINTENANCE_STATUSES[rng.gen_range(0..MAINTENANCE_STATUSES.len())]
                .to_string(),
            passenger_count: rng.gen_range(0..=4),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_values_stay_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let sample = VehicleTelemetry::generate(&mut rng, Local::now());
            assert!((-90.0..=90.0).contains(&sample.location_lat));
            assert!((-180.0..=180.0).contains(&sample.location_long));
            assert!((0.0..=100.0).contains(&sample.speed));
            assert!((0.0..=100.0).contains(&sample.battery_level));
            assert!(sample.passenger_count <= 4);
            let status = sample.maintenance_status.as_str();
            assert!(MAINTENANCE_STATUSES.contains(&status));
        }
    }

    #[test]
    fn test_vehicle_ids_are_unique() {
        let a = VehicleTelemetry::random();
        let b = VehicleTelemetry::random();
        assert_ne!(a.vehicle_id, b.vehicle_id);
        assert_eq!(a.vehicle_id.len(), 20);
    }

    #[test]
    fn test_json_keeps_field_order() {
        let json = VehicleTelemetry::random().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "vehicle_id",
                "ts",
                "location_lat",
                "location_long",
                "speed",
                "battery_level",
                "maintenance_status",
                "passenger_count"
            ]
        );
    }
}
