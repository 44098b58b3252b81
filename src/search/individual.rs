use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use serde::{Deserialize, Serialize};

use super::action::{Action, ActionId, ActionKind, ActionTemplate};
use super::randomness::Randomness;
use crate::error::{Result, SearchError};
use crate::gene::binding::{clean_broken_bindings, verify_bindings};
use crate::gene::utils::{self, has_non_handled_cycles, prevent_cycles, prevent_limits, repair_genes};
use crate::gene::{randomize, GeneArena, GeneId, GeneKind};
use crate::sql;
use crate::types::SampleType;

static NEXT_INDIVIDUAL_ID: AtomicU64 = AtomicU64::new(1);

/// Name of the root gene of every individual
pub const ROOT_GENE_NAME: &str = "individual";

/// Which actions' genes a view covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneFilter {
    All,
    NoSql,
    OnlySql,
}

/// Where an individual comes from, for impact tracking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub generation: u32,
    pub parent: Option<u64>,
    /// Impact keys of the genes changed by the mutation that produced it
    pub mutated_genes: Vec<String>,
}

/// Candidate test: initialization rows followed by the main actions.
///
/// All genes live in one arena whose root is named [`ROOT_GENE_NAME`].
#[derive(Debug, Clone)]
pub struct Individual {
    id: u64,
    arena: GeneArena,
    initialization: Vec<Action>,
    actions: Vec<Action>,
    pub sample_type: SampleType,
    pub lineage: Lineage,
}

impl Individual {
    pub fn new(sample_type: SampleType) -> Self {
        Self {
            id: NEXT_INDIVIDUAL_ID.fetch_add(1, Ordering::Relaxed),
            arena: GeneArena::new(ROOT_GENE_NAME),
            initialization: Vec::new(),
            actions: Vec::new(),
            sample_type,
            lineage: Lineage::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn arena(&self) -> &GeneArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut GeneArena {
        &mut self.arena
    }

    /// Number of main actions
    pub fn size(&self) -> usize {
        self.actions.len()
    }

    pub fn see_actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn see_initializing_actions(&self) -> &[Action] {
        &self.initialization
    }

    /// Initialization actions first, then the main ones
    pub fn see_all_actions(&self) -> impl Iterator<Item = &Action> {
        self.initialization.iter().chain(self.actions.iter())
    }

    pub fn action(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn action_mut(&mut self, index: usize) -> Option<&mut Action> {
        self.actions.get_mut(index)
    }

    pub fn index_of(&self, id: ActionId) -> Option<usize> {
        self.actions.iter().position(|a| a.id() == id)
    }

    /// Arena and actions together, for code updating both
    pub fn parts_mut(&mut self) -> (&mut GeneArena, &mut Vec<Action>) {
        (&mut self.arena, &mut self.actions)
    }

    /// Instantiate `template` as a main action at `position` (appended when
    /// `None` or past the end). Returns the index of the new action.
    pub fn add_action(&mut self, template: &ActionTemplate, position: Option<usize>) -> Result<usize> {
        let genes = self.instantiate(template)?;
        let action = Action::new(template.name.clone(), template.kind.clone(), genes);
        let index = position.unwrap_or(self.actions.len()).min(self.actions.len());
        self.actions.insert(index, action);
        Ok(index)
    }

    /// Append an insertion row. Its primary keys get the action id as row id.
    pub fn add_initialization_action(&mut self, template: &ActionTemplate) -> Result<usize> {
        if !matches!(template.kind, ActionKind::Sql(_)) {
            return Err(SearchError::InvalidTemplate(format!(
                "{} is not a database insertion",
                template.name
            )));
        }
        let genes = self.instantiate(template)?;
        let action = Action::new(template.name.clone(), template.kind.clone(), genes);
        let row_id = action.id().value();
        for g in action.see_genes() {
            if let GeneKind::SqlPrimaryKey(pk) = self.arena.kind_mut(*g)? {
                pk.unique_id = row_id;
            }
        }
        self.initialization.push(action);
        Ok(self.initialization.len() - 1)
    }

    fn instantiate(&mut self, template: &ActionTemplate) -> Result<Vec<GeneId>> {
        template
            .genes
            .iter()
            .map(|g| self.arena.insert_top(g))
            .collect()
    }

    /// Remove the main action at `index` with its genes; bindings pointing
    /// into them are dropped
    pub fn remove_action(&mut self, index: usize) -> Result<Action> {
        if index >= self.actions.len() {
            return Err(SearchError::InvalidTemplate(format!(
                "no action at index {} (size {})",
                index,
                self.actions.len()
            )));
        }
        let action = self.actions.remove(index);
        for g in action.see_genes() {
            self.arena.remove_subtree(*g)?;
        }
        let cleaned = clean_broken_bindings(&mut self.arena)?;
        if cleaned > 0 {
            trace!("Removed {} broken bindings after removing {}", cleaned, action.name());
        }
        Ok(action)
    }

    /// Top-level genes of the selected actions, in action order
    pub fn see_genes(&self, filter: GeneFilter) -> Vec<GeneId> {
        let init = self.initialization.iter();
        let main = self.actions.iter();
        let selected: Vec<&Action> = match filter {
            GeneFilter::All => init.chain(main).collect(),
            GeneFilter::NoSql => main.collect(),
            GeneFilter::OnlySql => init.collect(),
        };
        selected
            .into_iter()
            .flat_map(|a| a.see_genes().iter().copied())
            .collect()
    }

    /// Genes (nested ones included) a foreign key may reference
    fn initialization_context(&self, before: usize) -> Result<Vec<GeneId>> {
        let mut out = Vec::new();
        for a in self.initialization.iter().take(before) {
            for g in a.see_genes() {
                out.extend(self.arena.flat_view(*g)?);
            }
        }
        Ok(out)
    }

    /// Fresh values for the genes of main action `index`
    pub fn randomize_action(&mut self, index: usize, rng: &mut Randomness) -> Result<()> {
        let genes = match self.actions.get(index) {
            Some(a) => a.see_genes().to_vec(),
            None => return Ok(()),
        };
        let context = self.initialization_context(self.initialization.len())?;
        self.randomize_genes(&genes, rng, &context)
    }

    /// Fresh values for every initialization row, each referencing earlier rows only
    pub fn randomize_initialization(&mut self, rng: &mut Randomness) -> Result<()> {
        for i in 0..self.initialization.len() {
            let genes = self.initialization[i].see_genes().to_vec();
            let context = self.initialization_context(i)?;
            self.randomize_genes(&genes, rng, &context)?;
        }
        Ok(())
    }

    fn randomize_genes(&mut self, genes: &[GeneId], rng: &mut Randomness, context: &[GeneId]) -> Result<()> {
        for g in genes {
            randomize(&mut self.arena, *g, rng, false, context)?;
            prevent_cycles(&mut self.arena, *g, false)?;
            prevent_limits(&mut self.arena, *g, false)?;
        }
        repair_genes(&mut self.arena, genes)
    }

    /// Neutralize cycle and depth-limit placeholders in every action
    pub fn prevent_placeholders(&mut self, force: bool) -> Result<()> {
        for g in self.see_genes(GeneFilter::All) {
            prevent_cycles(&mut self.arena, g, force)?;
            prevent_limits(&mut self.arena, g, force)?;
        }
        Ok(())
    }

    pub fn has_non_handled_cycles(&self) -> Result<bool> {
        for g in self.see_genes(GeneFilter::All) {
            if has_non_handled_cycles(&self.arena, g)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Structural copy with its own identity; bindings must resolve in the copy
    pub fn copy(&self) -> Result<Individual> {
        let mut copy = self.clone();
        copy.id = NEXT_INDIVIDUAL_ID.fetch_add(1, Ordering::Relaxed);
        copy.arena.take_anomalies();
        copy.verify_bindings()?;
        Ok(copy)
    }

    /// Every gene of every action reaches this individual's root
    pub fn verify_root_invariant(&self) -> Result<()> {
        utils::verify_root_invariant(&self.arena)?;
        let root = self.arena.root();
        for a in self.see_all_actions() {
            for g in a.see_genes() {
                if self.arena.parent(*g)? != Some(root) {
                    return Err(SearchError::InvalidTemplate(format!(
                        "top gene {} of {} is not attached to the root",
                        self.arena.name(*g)?,
                        a.name()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn verify_bindings(&self) -> Result<()> {
        verify_bindings(&self.arena)
    }

    /// Gene of main action `action_index` at dotted `path` (e.g. `body.name`)
    pub fn find_gene(&self, action_index: usize, path: &str) -> Result<Option<GeneId>> {
        let action = match self.actions.get(action_index) {
            Some(a) => a,
            None => return Ok(None),
        };
        for top in action.see_genes() {
            for g in self.arena.flat_view(*top)? {
                if self.arena.path_of(g)? == path {
                    return Ok(Some(g));
                }
            }
        }
        Ok(None)
    }

    pub fn verify_initialization_actions(&self) -> Result<bool> {
        sql::verify_initialization_actions(&self.arena, &self.initialization)
    }

    /// Value repair of the insertion genes, then referential repair of the
    /// rows when keys collide or references dangle
    pub fn repair_initialization_actions(&mut self, rng: &mut Randomness) -> Result<()> {
        trace!("Repairing genes of {} initialization actions", self.initialization.len());
        let genes = self.see_genes(GeneFilter::OnlySql);
        repair_genes(&mut self.arena, &genes)?;

        if !self.verify_initialization_actions()? {
            trace!("Repairing broken initialization actions");
            sql::repair_broken_initialization_actions(&mut self.arena, &mut self.initialization, rng)?;
            clean_broken_bindings(&mut self.arena)?;
            if !self.verify_initialization_actions()? {
                return Err(SearchError::InvalidInitialization(
                    "initialization actions still broken after repair".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::binding::{add_binding, is_bound_with};
    use crate::gene::{raw_value, GeneSpec};
    use crate::sql::{Column, ColumnType, Table};

    fn template(name: &str) -> ActionTemplate {
        ActionTemplate::new(
            name,
            ActionKind::Sql(sql::SqlInsert::new("T", vec!["a".to_string(), "b".to_string()])),
            vec![
                GeneSpec::integer("a", 0, 100),
                GeneSpec::object("b", vec![GeneSpec::string("c", 0, 5), GeneSpec::date("d")]),
            ],
        )
    }

    fn parent_table() -> Table {
        Table::new(
            "Parent",
            vec![Column::new("id", ColumnType::Integer).primary_key().check_between(0, 1)],
        )
    }

    fn child_table() -> Table {
        Table::new(
            "Child",
            vec![
                Column::new("id", ColumnType::BigSerial).primary_key(),
                Column::new("parent_id", ColumnType::Integer).references("Parent"),
            ],
        )
    }

    #[test]
    fn test_root_invariant() {
        let mut ind = Individual::new(SampleType::Random);
        ind.add_action(&template("x"), None).unwrap();
        ind.add_action(&template("y"), Some(0)).unwrap();
        ind.verify_root_invariant().unwrap();

        let root = ind.arena().root();
        for g in ind.see_genes(GeneFilter::All) {
            for n in ind.arena().flat_view(g).unwrap() {
                assert_eq!(ind.arena().root_of(n).unwrap(), root);
            }
        }
        assert_eq!(ind.see_actions()[0].name(), "y");
    }

    #[test]
    fn test_copy_fidelity() {
        let mut rng = Randomness::with_seed(1);
        let mut ind = Individual::new(SampleType::Random);
        ind.add_action(&template("x"), None).unwrap();
        ind.add_action(&template("y"), None).unwrap();
        ind.randomize_action(0, &mut rng).unwrap();
        ind.randomize_action(1, &mut rng).unwrap();
        let a = ind.find_gene(0, "a").unwrap().unwrap();
        let b = ind.find_gene(1, "a").unwrap().unwrap();
        add_binding(ind.arena_mut(), a, b).unwrap();

        let copy = ind.copy().unwrap();
        assert_ne!(copy.id(), ind.id());

        let original_genes = ind.see_genes(GeneFilter::All);
        let copied_genes = copy.see_genes(GeneFilter::All);
        assert_eq!(original_genes.len(), copied_genes.len());
        for (o, c) in original_genes.iter().zip(copied_genes.iter()) {
            assert_eq!(
                raw_value(ind.arena(), *o).unwrap(),
                raw_value(copy.arena(), *c).unwrap()
            );
        }

        let ca = copy.find_gene(0, "a").unwrap().unwrap();
        let cb = copy.find_gene(1, "a").unwrap().unwrap();
        assert!(is_bound_with(copy.arena(), ca, cb).unwrap());

        // the copy is independent
        let mut copy = copy;
        copy.arena_mut().set_int_value(ca, 77).unwrap();
        assert_ne!(raw_value(ind.arena(), a).unwrap(), "77".to_string());
    }

    #[test]
    fn test_remove_action_cleans_bindings() {
        let mut ind = Individual::new(SampleType::Random);
        ind.add_action(&template("x"), None).unwrap();
        ind.add_action(&template("y"), None).unwrap();
        let a = ind.find_gene(0, "a").unwrap().unwrap();
        let b = ind.find_gene(1, "a").unwrap().unwrap();
        add_binding(ind.arena_mut(), a, b).unwrap();

        ind.remove_action(1).unwrap();
        assert_eq!(ind.size(), 1);
        assert!(ind.arena().get(a).unwrap().bindings().is_empty());
        ind.verify_bindings().unwrap();
        ind.verify_root_invariant().unwrap();
    }

    #[test]
    fn test_find_gene_nested() {
        let mut ind = Individual::new(SampleType::Random);
        ind.add_action(&template("x"), None).unwrap();
        let c = ind.find_gene(0, "b.c").unwrap();
        assert!(c.is_some());
        assert!(ind.find_gene(0, "b.zzz").unwrap().is_none());
        assert!(ind.find_gene(3, "a").unwrap().is_none());
    }

    #[test]
    fn test_initialization_requires_sql() {
        let mut ind = Individual::new(SampleType::Random);
        let rest = ActionTemplate::new(
            "GET:/x",
            ActionKind::Rest(crate::rest::RestCall::new(
                crate::rest::HttpVerb::Get,
                crate::rest::RestPath::new("/x").unwrap(),
                Vec::new(),
            )),
            Vec::new(),
        );
        assert!(ind.add_initialization_action(&rest).is_err());
    }

    #[test]
    fn test_repair_duplicated_primary_keys() {
        let mut rng = Randomness::with_seed(3);
        let mut ind = Individual::new(SampleType::Random);
        let parent = parent_table().insert_template().unwrap();
        // id domain is {0, 1}: a third row can never be unique
        for _ in 0..3 {
            ind.add_initialization_action(&parent).unwrap();
        }
        assert!(!ind.verify_initialization_actions().unwrap());

        ind.repair_initialization_actions(&mut rng).unwrap();
        assert!(ind.verify_initialization_actions().unwrap());
        assert_eq!(ind.see_initializing_actions().len(), 2);
        ind.verify_root_invariant().unwrap();
    }

    #[test]
    fn test_repair_dangling_foreign_key() {
        let mut rng = Randomness::with_seed(4);
        let mut ind = Individual::new(SampleType::Random);
        ind.add_initialization_action(&parent_table().insert_template().unwrap())
            .unwrap();
        ind.add_initialization_action(&child_table().insert_template().unwrap())
            .unwrap();
        assert!(!ind.verify_initialization_actions().unwrap());

        ind.repair_initialization_actions(&mut rng).unwrap();
        assert!(ind.verify_initialization_actions().unwrap());
        assert_eq!(ind.see_initializing_actions().len(), 2);
    }

    #[test]
    fn test_unresolvable_foreign_key_removes_row() {
        let mut rng = Randomness::with_seed(5);
        let mut ind = Individual::new(SampleType::Random);
        ind.add_initialization_action(&child_table().insert_template().unwrap())
            .unwrap();

        ind.repair_initialization_actions(&mut rng).unwrap();
        assert!(ind.see_initializing_actions().is_empty());
    }

    #[test]
    fn test_repair_fixes_invalid_dates() {
        let mut rng = Randomness::with_seed(6);
        let table = Table::new("Event", vec![Column::new("day", ColumnType::Date)]);
        let mut ind = Individual::new(SampleType::Random);
        ind.add_initialization_action(&table.insert_template().unwrap())
            .unwrap();
        let date = ind.see_genes(GeneFilter::OnlySql)[0];
        let parts = ind.arena().children(date).unwrap();
        ind.arena_mut().set_int_value(parts[1], 4).unwrap();
        ind.arena_mut().set_int_value(parts[2], 31).unwrap();

        ind.repair_initialization_actions(&mut rng).unwrap();
        assert_eq!(raw_value(ind.arena(), date).unwrap(), "2016-04-30");
    }
}
