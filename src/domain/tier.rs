//! Compute-tier selection from the declared output profile.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile assumed when a render configuration declares no output format.
const DEFAULT_OUTPUT_PROFILE: &str = "flat-1080p-landscape";

/// Compute class a job executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeTier {
    Standard,
    Accelerated,
}

impl ComputeTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeTier::Standard => "standard",
            ComputeTier::Accelerated => "accelerated",
        }
    }

    /// Choose a tier from the render configuration's output profile.
    ///
    /// Ultra-high-definition and immersive profiles carry a `4k` or `360`
    /// marker in their format name and need the accelerated lane; everything
    /// else renders on standard hardware. Missing or malformed profiles fall
    /// back to the default flat profile, so the answer is always Standard in
    /// the ambiguous cases.
    pub fn for_config(config: &Value) -> Self {
        let profile = config
            .get("output")
            .and_then(|output| output.get("format"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_OUTPUT_PROFILE);

        if profile.contains("4k") || profile.contains("360") {
            ComputeTier::Accelerated
        } else {
            ComputeTier::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ComputeTier;
    use serde_json::json;

    #[test]
    fn high_resolution_profiles_select_accelerated() {
        for format in ["4k-360", "flat-4k-landscape", "vr-360-stereo"] {
            let config = json!({"output": {"format": format}});
            assert_eq!(
                ComputeTier::for_config(&config),
                ComputeTier::Accelerated,
                "profile {format} should run accelerated"
            );
        }
    }

    #[test]
    fn flat_profiles_select_standard() {
        let config = json!({"output": {"format": "flat-1080p-landscape"}});
        assert_eq!(ComputeTier::for_config(&config), ComputeTier::Standard);
    }

    #[test]
    fn missing_or_malformed_profile_defaults_to_standard() {
        assert_eq!(
            ComputeTier::for_config(&json!({})),
            ComputeTier::Standard
        );
        assert_eq!(
            ComputeTier::for_config(&json!({"output": {}})),
            ComputeTier::Standard
        );
        assert_eq!(
            ComputeTier::for_config(&json!({"output": {"format": 2160}})),
            ComputeTier::Standard
        );
    }
}
