use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::gene::{GeneId, GeneSpec};
use crate::rest::RestCall;
use crate::sql::SqlInsert;

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an action, unique within a process and kept by copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(u64);

impl ActionId {
    pub(crate) fn next() -> Self {
        ActionId(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    Rest(RestCall),
    Sql(SqlInsert),
}

/// Blueprint of an action: its kind plus the genes it is built from
#[derive(Debug, Clone)]
pub struct ActionTemplate {
    pub name: String,
    pub kind: ActionKind,
    pub genes: Vec<GeneSpec>,
}

impl ActionTemplate {
    pub fn new(name: &str, kind: ActionKind, genes: Vec<GeneSpec>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            genes,
        }
    }

    pub fn as_rest(&self) -> Option<&RestCall> {
        match &self.kind {
            ActionKind::Rest(r) => Some(r),
            ActionKind::Sql(_) => None,
        }
    }
}

/// Action instantiated inside an individual.
///
/// Genes live in the individual's arena; `genes` are their handles, in the
/// order of the template.
#[derive(Debug, Clone)]
pub struct Action {
    id: ActionId,
    name: String,
    pub kind: ActionKind,
    genes: Vec<GeneId>,
}

impl Action {
    pub(crate) fn new(name: String, kind: ActionKind, genes: Vec<GeneId>) -> Self {
        Self {
            id: ActionId::next(),
            name,
            kind,
            genes,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level genes of this action, actual handles
    pub fn see_genes(&self) -> &[GeneId] {
        &self.genes
    }

    pub fn is_sql(&self) -> bool {
        matches!(self.kind, ActionKind::Sql(_))
    }

    pub fn as_rest(&self) -> Option<&RestCall> {
        match &self.kind {
            ActionKind::Rest(r) => Some(r),
            ActionKind::Sql(_) => None,
        }
    }

    pub fn as_rest_mut(&mut self) -> Option<&mut RestCall> {
        match &mut self.kind {
            ActionKind::Rest(r) => Some(r),
            ActionKind::Sql(_) => None,
        }
    }

    pub fn as_sql(&self) -> Option<&SqlInsert> {
        match &self.kind {
            ActionKind::Sql(s) => Some(s),
            ActionKind::Rest(_) => None,
        }
    }
}
