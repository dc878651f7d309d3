use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A key/value metric scoped to a section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stat {
    pub section_id: i64,
    pub key: String,
    pub value: String,
}

/// Collapses an ordered stat log into a mapping; a repeated key keeps its last value
pub fn stats_as_map(stats: &[Stat]) -> BTreeMap<String, String> {
    stats
        .iter()
        .map(|s| (s.key.clone(), s.value.clone()))
        .collect()
}
