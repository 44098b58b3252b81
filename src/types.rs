use serde::{Deserialize, Serialize};

/// Identifier of one coverage objective (line, branch, status code, ...)
pub type TargetId = u32;

/// Provenance of a sampled individual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    Random,
    Smart,
    SmartGetCollection,
    Seeded,
    Predefined,
}

/// Language of the generated test, only affects escaping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    JavaJunit,
    KotlinJunit,
}

impl OutputFormat {
    pub fn is_kotlin(&self) -> bool {
        matches!(self, OutputFormat::KotlinJunit)
    }
}

/// How internal genes are picked during a standard mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsetGeneSelectionStrategy {
    Default,
    DeterministicWeight,
    AdaptiveWeight,
}

impl std::fmt::Display for SubsetGeneSelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubsetGeneSelectionStrategy::Default => "DEFAULT",
            SubsetGeneSelectionStrategy::DeterministicWeight => "DETERMINISTIC_WEIGHT",
            SubsetGeneSelectionStrategy::AdaptiveWeight => "ADAPTIVE_WEIGHT",
        };
        write!(f, "{}", s)
    }
}
