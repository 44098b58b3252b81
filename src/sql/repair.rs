use std::collections::HashSet;

use log::{debug, trace};

use crate::error::{Result, SearchError};
use crate::gene::{randomize, raw_value, GeneArena, GeneId, GeneKind};
use crate::search::action::Action;
use crate::search::randomness::Randomness;

/// Attempts at giving a duplicated row a fresh primary key before dropping it
const MAX_KEY_RESAMPLES: usize = 10;

/// Row identity: its table, unique id and primary key values
struct RowKey {
    table: String,
    unique_id: u64,
    /// Printed values of the non auto-generated key columns
    values: Vec<String>,
    /// Inner genes of the key columns
    genes: Vec<GeneId>,
}

fn row_key(arena: &GeneArena, action: &Action) -> Result<Option<RowKey>> {
    let mut key: Option<RowKey> = None;
    for g in action.see_genes() {
        if let GeneKind::SqlPrimaryKey(pk) = arena.kind(*g)? {
            let entry = key.get_or_insert_with(|| RowKey {
                table: pk.table.clone(),
                unique_id: pk.unique_id,
                values: Vec::new(),
                genes: Vec::new(),
            });
            if !matches!(arena.kind(pk.gene)?, GeneKind::SqlAutoIncrement) {
                entry.values.push(raw_value(arena, pk.gene)?);
                entry.genes.push(pk.gene);
            }
        }
    }
    Ok(key)
}

/// Index of the first row repeating the primary key of an earlier row
fn first_duplicate(arena: &GeneArena, actions: &[Action]) -> Result<Option<usize>> {
    let mut seen: HashSet<(String, Vec<String>)> = HashSet::new();
    for (i, a) in actions.iter().enumerate() {
        if let Some(key) = row_key(arena, a)? {
            if key.values.is_empty() {
                continue;
            }
            if !seen.insert((key.table, key.values)) {
                return Ok(Some(i));
            }
        }
    }
    Ok(None)
}

/// Unique ids of the rows inserted before `index`, per table
fn earlier_rows(arena: &GeneArena, actions: &[Action], index: usize, table: &str) -> Result<Vec<u64>> {
    let mut out = Vec::new();
    for a in &actions[..index] {
        if let Some(key) = row_key(arena, a)? {
            if key.table == table {
                out.push(key.unique_id);
            }
        }
    }
    Ok(out)
}

/// First foreign key whose referenced row is missing or inserted later
fn first_dangling_reference(arena: &GeneArena, actions: &[Action]) -> Result<Option<(usize, GeneId)>> {
    for (i, a) in actions.iter().enumerate() {
        for g in a.see_genes() {
            if let GeneKind::SqlForeignKey(fk) = arena.kind(*g)? {
                let ok = match fk.unique_id_of_primary_key {
                    Some(uid) => earlier_rows(arena, actions, i, &fk.target_table)?.contains(&uid),
                    None => fk.nullable,
                };
                if !ok {
                    return Ok(Some((i, *g)));
                }
            }
        }
    }
    Ok(None)
}

/// True when every row has a distinct primary key and every foreign key
/// points at a row inserted before it
pub fn verify_initialization_actions(arena: &GeneArena, actions: &[Action]) -> Result<bool> {
    Ok(first_duplicate(arena, actions)?.is_none() && first_dangling_reference(arena, actions)?.is_none())
}

fn remove_row(arena: &mut GeneArena, actions: &mut Vec<Action>, index: usize) -> Result<()> {
    let action = actions.remove(index);
    debug!("Removing initialization action {}", action.name());
    for g in action.see_genes() {
        arena.remove_subtree(*g)?;
    }
    Ok(())
}

/// Fix duplicated primary keys and dangling foreign keys.
///
/// Duplicated rows first get new key values; rows that cannot be fixed are
/// removed, which may in turn break references to them, so the process is
/// repeated until the list is consistent.
pub fn repair_broken_initialization_actions(
    arena: &mut GeneArena,
    actions: &mut Vec<Action>,
    rng: &mut Randomness,
) -> Result<()> {
    let max_rounds = actions.len() * (MAX_KEY_RESAMPLES + 2) + 1;

    for _ in 0..max_rounds {
        if let Some(i) = first_duplicate(arena, actions)? {
            let key = row_key(arena, &actions[i])?;
            let genes = key.map(|k| k.genes).unwrap_or_default();
            let mut fixed = false;
            for _ in 0..MAX_KEY_RESAMPLES {
                for g in &genes {
                    randomize(arena, *g, rng, true, &[])?;
                }
                if first_duplicate(arena, &actions[..=i])?.is_none() {
                    fixed = true;
                    break;
                }
            }
            if !fixed {
                remove_row(arena, actions, i)?;
            }
            continue;
        }

        if let Some((i, fk_gene)) = first_dangling_reference(arena, actions)? {
            let (target, nullable) = match arena.kind(fk_gene)? {
                GeneKind::SqlForeignKey(fk) => (fk.target_table.clone(), fk.nullable),
                other => {
                    return Err(SearchError::TypeMismatch {
                        expected: "SqlForeignKeyGene".to_string(),
                        actual: other.type_name().to_string(),
                    })
                }
            };
            let candidates = earlier_rows(arena, actions, i, &target)?;
            if candidates.is_empty() && !nullable {
                remove_row(arena, actions, i)?;
                continue;
            }
            let choice = if candidates.is_empty() {
                None
            } else {
                rng.choose(&candidates).copied()
            };
            trace!("Foreign key of row {} now references {:?}", i, choice);
            if let GeneKind::SqlForeignKey(fk) = arena.kind_mut(fk_gene)? {
                fk.unique_id_of_primary_key = choice;
            }
            continue;
        }

        return Ok(());
    }

    Err(SearchError::InvalidInitialization(format!(
        "still inconsistent after {} repair rounds",
        max_rounds
    )))
}
