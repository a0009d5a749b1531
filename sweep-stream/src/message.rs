use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sweep_data::{Sample, Scan, ScanSequence};

/// Fixed coordinate attached to every sample message, for map overlays.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct GeoReference {
    pub latitude: f64,
    pub longitude: f64,
}

/// Outbound JSON layout: one object per sample.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MessageFormat {
    /// Adds the `signal` field.
    #[serde(default)]
    pub include_signal: bool,
    #[serde(default)]
    pub reference: Option<GeoReference>,
}

impl MessageFormat {
    pub fn sample_message(&self, sample: &Sample) -> String {
        let mut message = Map::new();
        if let Some(reference) = self.reference {
            message.insert("latitude".to_string(), json!(reference.latitude));
            message.insert("longitude".to_string(), json!(reference.longitude));
        }
        message.insert("angle".to_string(), json!(sample.angle));
        message.insert("distance".to_string(), json!(sample.distance));
        if self.include_signal {
            message.insert("signal".to_string(), json!(sample.signal));
        }
        Value::Object(message).to_string()
    }

    pub fn scan_messages(&self, scan: &Scan) -> Vec<String> {
        scan.samples
            .iter()
            .map(|sample| self.sample_message(sample))
            .collect()
    }

    pub fn error_message(&self, seq: ScanSequence, error: &ScanError) -> String {
        json!({ "error": error.to_string(), "seq": seq }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(message: &str) -> Value {
        serde_json::from_str(message).unwrap()
    }

    #[test]
    fn test_minimal_sample_message() {
        let format = MessageFormat::default();
        let value = parse(&format.sample_message(&Sample::new(90.5, 2000, 200)));
        assert_eq!(value, json!({"angle": 90.5, "distance": 2000}));
    }

    #[test]
    fn test_enriched_sample_message() {
        let format = MessageFormat {
            include_signal: true,
            reference: Some(GeoReference {
                latitude: 52.511433,
                longitude: 13.389726,
            }),
        };
        let value = parse(&format.sample_message(&Sample::new(10., 150, 77)));
        assert_eq!(
            value,
            json!({
                "latitude": 52.511433,
                "longitude": 13.389726,
                "angle": 10.0,
                "distance": 150,
                "signal": 77
            })
        );
    }

    #[test]
    fn test_scan_messages_keep_order() {
        let scan: Scan = (0..5).map(|i| Sample::new(i as f64, 100 + i, 1)).collect();
        let messages = MessageFormat::default().scan_messages(&scan);
        assert_eq!(messages.len(), 5);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(parse(message)["distance"], json!(100 + i));
        }
    }

    #[test]
    fn test_error_message() {
        let message = MessageFormat::default()
            .error_message(7, &ScanError::Timeout(Duration::from_millis(20)));
        let value = parse(&message);
        assert_eq!(value["seq"], json!(7));
        assert!(value["error"].as_str().unwrap().contains("20ms"));
    }
}
