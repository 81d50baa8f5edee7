//! Workspace configuration payloads.

use serde::Deserialize;
use serde::Serialize;

/// One `{physical, virtual}` pair under `Executable.PathMappings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMappingSetting {
    pub physical: String,
    #[serde(rename = "virtual")]
    pub virtual_prefix: String,
}

/// Extracts the recognized path mappings from a `didChangeConfiguration`
/// settings payload. Unknown keys and malformed entries are ignored.
#[must_use]
pub fn path_mappings_from_settings(settings: &serde_json::Value) -> Vec<PathMappingSetting> {
    settings
        .get("Executable")
        .and_then(|executable| executable.get("PathMappings"))
        .and_then(|mappings| mappings.as_array())
        .map(|mappings| {
            mappings
                .iter()
                .filter_map(|entry| serde_json::from_value::<PathMappingSetting>(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_mappings_under_the_executable_key() {
        let settings = serde_json::json!({
            "Executable": {
                "PathMappings": [
                    { "physical": "/ws/addons/main", "virtual": "\\x\\main" },
                    { "physical": 42 },
                ]
            }
        });

        let mappings = path_mappings_from_settings(&settings);

        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].physical, "/ws/addons/main");
        assert_eq!(mappings[0].virtual_prefix, "\\x\\main");
    }

    #[test]
    fn missing_key_means_no_mappings() {
        assert!(path_mappings_from_settings(&serde_json::json!({})).is_empty());
    }
}
