use super::traits::{check_probability, ConfigManifest, ConfigSection, FieldManifest};
use crate::error::SearchError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub algorithm: AlgorithmKind,
    pub seed: Option<u64>,
    pub max_evaluations: u64,
    /// Wall-clock budget; when set, the search also stops once it is used up
    pub max_time_seconds: Option<u64>,
    /// Individuals kept per not yet covered target
    pub archive_target_limit: usize,
    /// Probability of sampling a fresh individual instead of mutating an
    /// archived one, at the start of the search
    pub probability_of_random_sampling: f64,
    /// Share of the budget after which the search only exploits the archive
    pub focused_search_activation_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmKind {
    Mio,
    Random,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::Mio,
            seed: None,
            max_evaluations: 1000,
            max_time_seconds: None,
            archive_target_limit: 10,
            probability_of_random_sampling: 0.5,
            focused_search_activation_time: 0.5,
        }
    }
}

impl ConfigSection for SearchConfig {
    fn section_name() -> &'static str {
        "search"
    }

    fn validate(&self) -> Result<(), SearchError> {
        if self.max_evaluations == 0 && self.max_time_seconds.is_none() {
            return Err(SearchError::Configuration(
                "Either max_evaluations or max_time_seconds must be set".to_string(),
            ));
        }
        if self.archive_target_limit == 0 {
            return Err(SearchError::Configuration(
                "Archive target limit must be at least 1".to_string(),
            ));
        }
        check_probability("probability_of_random_sampling", self.probability_of_random_sampling)?;
        check_probability("focused_search_activation_time", self.focused_search_activation_time)?;
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        ConfigManifest {
            section: "Search".to_string(),
            fields: vec![
                FieldManifest::new(
                    "algorithm",
                    "enum",
                    serde_json::json!("Mio"),
                    "Search algorithm (Mio or Random)",
                ),
                FieldManifest::new("seed", "integer", serde_json::Value::Null, "Seed of the random generator"),
                FieldManifest::new(
                    "max_evaluations",
                    "integer",
                    serde_json::json!(1000),
                    "Maximum number of fitness evaluations",
                )
                .range(1.0, 1e9),
                FieldManifest::new(
                    "max_time_seconds",
                    "integer",
                    serde_json::Value::Null,
                    "Maximum search time in seconds",
                ),
                FieldManifest::new(
                    "archive_target_limit",
                    "integer",
                    serde_json::json!(10),
                    "Individuals kept per uncovered target",
                )
                .range(1.0, 1000.0),
                FieldManifest::new(
                    "probability_of_random_sampling",
                    "float",
                    serde_json::json!(0.5),
                    "Initial probability of sampling instead of mutating",
                )
                .range(0.0, 1.0),
                FieldManifest::new(
                    "focused_search_activation_time",
                    "float",
                    serde_json::json!(0.5),
                    "Budget share after which the search is focused",
                )
                .range(0.0, 1.0),
            ],
        }
    }
}
