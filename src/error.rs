use thiserror::Error;

use crate::gene::GeneId;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Empty name for gene")]
    BlankGeneName,

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("With {strategy} strategy and {candidates} candidates, none is selected to mutate")]
    EmptySelection { strategy: String, candidates: usize },

    #[error("Leaf mutation is not implemented for gene {0}")]
    LeafMutationUnsupported(String),

    #[error("Could not prevent selection of {kind} gene inside {root}")]
    UnpreventableSelection { root: String, kind: String },

    #[error("Empty domain: {0}")]
    EmptyDomain(String),

    #[error("Stale gene handle: {0:?}")]
    StaleGene(GeneId),

    #[error("Broken binding: {0}")]
    BrokenBinding(String),

    #[error("Invalid initialization actions: {0}")]
    InvalidInitialization(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
