use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Mutation history of one logical gene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneImpact {
    pub times_mutated: u32,
    pub times_improved: u32,
}

impl GeneImpact {
    /// Laplace-smoothed improvement rate
    pub fn weight(&self) -> f64 {
        (self.times_improved as f64 + 1.0) / (self.times_mutated as f64 + 1.0)
    }
}

/// Per-gene impact data for adaptive gene selection, scoped to one search run.
///
/// Genes are identified across generations by `action name :: gene path`,
/// which survives structural copies of an individual.
#[derive(Debug, Clone, Default)]
pub struct ImpactTracker {
    impacts: HashMap<String, GeneImpact>,
}

impl ImpactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(action_name: &str, gene_path: &str) -> String {
        format!("{}::{}", action_name, gene_path)
    }

    /// Record the outcome of a mutation that touched `keys`
    pub fn record<I, S>(&mut self, keys: I, improved: bool)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            let impact = self.impacts.entry(key.into()).or_default();
            impact.times_mutated += 1;
            if improved {
                impact.times_improved += 1;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&GeneImpact> {
        self.impacts.get(key)
    }

    pub fn weight(&self, key: &str) -> Option<f64> {
        self.impacts.get(key).map(|i| i.weight())
    }

    pub fn is_empty(&self) -> bool {
        self.impacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.impacts.len()
    }
}
