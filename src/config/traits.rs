use crate::error::SearchError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), SearchError>;
    fn to_manifest(&self) -> ConfigManifest;
}

/// Description of a section's fields, for documentation and tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigManifest {
    pub section: String,
    pub fields: Vec<FieldManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldManifest {
    pub name: String,
    pub field_type: String,
    pub default: serde_json::Value,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: String,
}

impl FieldManifest {
    pub fn new(name: &str, field_type: &str, default: serde_json::Value, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            default,
            min: None,
            max: None,
            description: description.to_string(),
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// Error unless `value` is a probability
pub(crate) fn check_probability(name: &str, value: f64) -> Result<(), SearchError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SearchError::Configuration(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}
