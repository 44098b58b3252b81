use super::traits::{check_probability, ConfigManifest, ConfigSection, FieldManifest};
use crate::error::SearchError;
use crate::types::SubsetGeneSelectionStrategy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    pub gene_selection: SubsetGeneSelectionStrategy,
    /// Weight genes by their mutation history
    pub adaptive_mutation: bool,
    pub add_action_weight: f64,
    pub remove_action_weight: f64,
    pub modify_weight: f64,
    /// Share of genes mutated at once at the start of the search
    pub starting_percentage_of_genes_to_mutate: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            gene_selection: SubsetGeneSelectionStrategy::Default,
            adaptive_mutation: false,
            add_action_weight: 1.0,
            remove_action_weight: 1.0,
            modify_weight: 8.0,
            starting_percentage_of_genes_to_mutate: 0.5,
        }
    }
}

impl ConfigSection for MutationConfig {
    fn section_name() -> &'static str {
        "mutation"
    }

    fn validate(&self) -> Result<(), SearchError> {
        let weights = [self.add_action_weight, self.remove_action_weight, self.modify_weight];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(SearchError::Configuration(
                "Mutation operator weights must not be negative".to_string(),
            ));
        }
        if self.modify_weight <= 0.0 {
            return Err(SearchError::Configuration(
                "Modify weight must be positive".to_string(),
            ));
        }
        check_probability(
            "starting_percentage_of_genes_to_mutate",
            self.starting_percentage_of_genes_to_mutate,
        )?;
        if self.adaptive_mutation && self.gene_selection != SubsetGeneSelectionStrategy::AdaptiveWeight {
            return Err(SearchError::Configuration(
                "Adaptive mutation requires the AdaptiveWeight gene selection".to_string(),
            ));
        }
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        ConfigManifest {
            section: "Mutation".to_string(),
            fields: vec![
                FieldManifest::new(
                    "gene_selection",
                    "enum",
                    serde_json::json!("Default"),
                    "Default, DeterministicWeight or AdaptiveWeight",
                ),
                FieldManifest::new(
                    "adaptive_mutation",
                    "bool",
                    serde_json::json!(false),
                    "Use per-gene impact history",
                ),
                FieldManifest::new("add_action_weight", "float", serde_json::json!(1.0), "Weight of adding an action")
                    .range(0.0, 100.0),
                FieldManifest::new(
                    "remove_action_weight",
                    "float",
                    serde_json::json!(1.0),
                    "Weight of removing an action",
                )
                .range(0.0, 100.0),
                FieldManifest::new("modify_weight", "float", serde_json::json!(8.0), "Weight of mutating genes")
                    .range(0.0, 100.0),
                FieldManifest::new(
                    "starting_percentage_of_genes_to_mutate",
                    "float",
                    serde_json::json!(0.5),
                    "Share of genes mutated together early in the search",
                )
                .range(0.0, 1.0),
            ],
        }
    }
}
