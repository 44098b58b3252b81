use std::collections::HashSet;

use chrono::NaiveDate;
use log::{trace, warn};

use super::arena::{GeneArena, GeneId};
use super::kind::GeneKind;
use super::pattern::shortest_match;
use crate::error::{Result, SearchError};

/// Warnings already emitted during one search run
#[derive(Debug, Default)]
pub struct WarnOnce {
    seen: HashSet<String>,
}

impl WarnOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `msg` as a warning the first time this run sees it
    pub fn warn(&mut self, msg: &str) -> bool {
        let first = self.seen.insert(msg.to_string());
        if first {
            warn!("{}", msg);
        }
        first
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// `x` rendered with leading zeros up to `length` characters (sign included)
pub fn padded(x: i32, length: usize) -> String {
    if x >= 0 {
        format!("{:0>width$}", x, width = length)
    } else {
        let digits = format!("{:0>width$}", -(x as i64), width = length.saturating_sub(1));
        format!("-{}", digits)
    }
}

pub fn remove_enclosed_quotation_marks(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Bring date and time genes (and anything nested in `ids`) back to valid values
pub fn repair_genes(arena: &mut GeneArena, ids: &[GeneId]) -> Result<()> {
    for id in ids {
        for g in arena.flat_view(*id)? {
            repair(arena, g)?;
        }
    }
    Ok(())
}

/// Value-level repair of a single gene; composite genes are not descended
pub fn repair(arena: &mut GeneArena, id: GeneId) -> Result<()> {
    match arena.kind(id)?.clone() {
        GeneKind::Date(d) => {
            let year = arena.int_value(d.year)?;
            let month = arena.int_value(d.month)?;
            let mut day = arena.int_value(d.day)?;
            while day > 1 && NaiveDate::from_ymd_opt(year, month as u32, day as u32).is_none() {
                day -= 1;
            }
            if day != arena.int_value(d.day)? {
                trace!("repaired date {}-{}: day set to {}", year, month, day);
                arena.set_int_value(d.day, day)?;
            }
        }
        GeneKind::Time(t) => {
            for part in [t.hour, t.minute, t.second] {
                let v = arena.int_value(part)?;
                arena.set_int_value(part, v)?;
            }
        }
        GeneKind::String(_) => {
            if let GeneKind::String(s) = arena.kind_mut(id)? {
                let current = s.current().to_string();
                if !s.matches_pattern(&current) {
                    let fallback = s.specializations.iter().position(|v| s.matches_pattern(v));
                    s.selected_specialization = fallback;
                    if fallback.is_none() {
                        if let Some(re) = &s.pattern {
                            let shortest = shortest_match(re)?;
                            s.value = shortest;
                        }
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Whether a date/time gene holds a calendar-valid value; other genes are valid
pub fn is_valid(arena: &GeneArena, id: GeneId) -> Result<bool> {
    Ok(match arena.kind(id)? {
        GeneKind::Date(d) => {
            let year = arena.int_value(d.year)?;
            let month = arena.int_value(d.month)?;
            let day = arena.int_value(d.day)?;
            month >= 1 && day >= 1 && NaiveDate::from_ymd_opt(year, month as u32, day as u32).is_some()
        }
        GeneKind::Time(t) => {
            let h = arena.int_value(t.hour)?;
            let m = arena.int_value(t.minute)?;
            let s = arena.int_value(t.second)?;
            (0..24).contains(&h) && (0..60).contains(&m) && (0..60).contains(&s)
        }
        GeneKind::String(s) => s.matches_pattern(s.current()),
        _ => true,
    })
}

/// Make every cycle placeholder under `id` unreachable in the phenotype
pub fn prevent_cycles(arena: &mut GeneArena, id: GeneId, force: bool) -> Result<()> {
    prevent_selection_of(arena, id, force, |k| matches!(k, GeneKind::Cycle))
}

/// Make every depth-limit placeholder under `id` unreachable in the phenotype
pub fn prevent_limits(arena: &mut GeneArena, id: GeneId, force: bool) -> Result<()> {
    prevent_selection_of(arena, id, force, |k| matches!(k, GeneKind::Limit))
}

fn prevent_selection_of<F>(arena: &mut GeneArena, root: GeneId, force: bool, is_target: F) -> Result<()>
where
    F: Fn(&GeneKind) -> bool,
{
    let placeholders: Vec<GeneId> = arena
        .flat_view(root)?
        .into_iter()
        .filter(|g| arena.kind(*g).map(|k| is_target(k)).unwrap_or(false))
        .collect();

    for p in placeholders {
        // an earlier array may already have dropped it
        if !arena.contains(p) {
            continue;
        }
        if !try_to_prevent_selection(arena, p)? {
            let root_name = arena.name(root)?.to_string();
            let kind = arena.kind(p)?.type_name().to_string();
            if force {
                return Err(SearchError::UnpreventableSelection { root: root_name, kind });
            }
            arena.report_anomaly(format!(
                "Could not prevent skipping gene in {} gene of type {}",
                root_name, kind
            ));
        }
    }
    Ok(())
}

/// Walk up from `id` to the closest optional (forbidden) or array (emptied)
pub fn try_to_prevent_selection(arena: &mut GeneArena, id: GeneId) -> Result<bool> {
    let mut current = arena.parent(id)?;
    while let Some(p) = current {
        match arena.kind(p)? {
            GeneKind::Optional(_) => {
                if let GeneKind::Optional(o) = arena.kind_mut(p)? {
                    o.forbid_selection();
                }
                return Ok(true);
            }
            GeneKind::Array(a) => {
                let elements = a.elements.clone();
                for e in elements {
                    arena.remove_subtree(e)?;
                }
                if let GeneKind::Array(a) = arena.kind_mut(p)? {
                    a.force_to_only_empty();
                }
                return Ok(true);
            }
            _ => current = arena.parent(p)?,
        }
    }
    Ok(false)
}

/// True if some cycle placeholder under `id` could still end up in the phenotype
pub fn has_non_handled_cycles(arena: &GeneArena, id: GeneId) -> Result<bool> {
    for g in arena.flat_view(id)? {
        if !matches!(arena.kind(g)?, GeneKind::Cycle) {
            continue;
        }
        let mut handled = false;
        let mut current = arena.parent(g)?;
        while let Some(p) = current {
            match arena.kind(p)? {
                GeneKind::Optional(o) if !o.selectable => {
                    handled = true;
                    break;
                }
                GeneKind::Array(a) if a.max_size == 0 => {
                    handled = true;
                    break;
                }
                _ => current = arena.parent(p)?,
            }
        }
        if !handled {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Every live gene reaches the arena root, and every child points back at
/// the parent listing it
pub fn verify_root_invariant(arena: &GeneArena) -> Result<()> {
    let ids: Vec<GeneId> = arena.live_ids().collect();
    for id in ids {
        if arena.root_of(id)? != arena.root() {
            return Err(SearchError::InvalidTemplate(format!(
                "gene {} does not reach the root {}",
                arena.path_of(id)?,
                arena.name(arena.root())?
            )));
        }
        for child in arena.children(id)? {
            if arena.parent(child)? != Some(id) {
                return Err(SearchError::InvalidTemplate(format!(
                    "gene {} is listed under {} but has another parent",
                    arena.name(child)?,
                    arena.path_of(id)?
                )));
            }
        }
    }
    Ok(())
}
