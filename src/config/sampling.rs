use super::traits::{check_probability, ConfigManifest, ConfigSection, FieldManifest};
use crate::error::SearchError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Maximum number of main actions in a test
    pub max_test_size: usize,
    /// Probability of a sampled call going out without authentication
    pub p_no_auth: f64,
    /// Probability of smart sampling once seeded tests are used up
    pub smart_sampling_probability: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_test_size: 10,
            p_no_auth: 0.05,
            smart_sampling_probability: 0.5,
        }
    }
}

impl ConfigSection for SamplingConfig {
    fn section_name() -> &'static str {
        "sampling"
    }

    fn validate(&self) -> Result<(), SearchError> {
        if self.max_test_size == 0 {
            return Err(SearchError::Configuration(
                "Max test size must be at least 1".to_string(),
            ));
        }
        check_probability("p_no_auth", self.p_no_auth)?;
        check_probability("smart_sampling_probability", self.smart_sampling_probability)?;
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        ConfigManifest {
            section: "Sampling".to_string(),
            fields: vec![
                FieldManifest::new(
                    "max_test_size",
                    "integer",
                    serde_json::json!(10),
                    "Maximum number of actions in a test",
                )
                .range(1.0, 100.0),
                FieldManifest::new(
                    "p_no_auth",
                    "float",
                    serde_json::json!(0.05),
                    "Probability of calls without authentication",
                )
                .range(0.0, 1.0),
                FieldManifest::new(
                    "smart_sampling_probability",
                    "float",
                    serde_json::json!(0.5),
                    "Probability of smart instead of random sampling",
                )
                .range(0.0, 1.0),
            ],
        }
    }
}
