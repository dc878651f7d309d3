use serde::{Deserialize, Serialize};

/// Raw captured payload kept for drill-down and offline regeneration of findings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawObject {
    pub id: i64,
    pub section_id: i64,
    pub payload: Vec<u8>,
    pub captured_at: Option<String>,
}

impl RawObject {
    /// Decodes the payload as JSON when the capturing check stored JSON
    pub fn payload_as_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}
