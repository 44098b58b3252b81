use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime, Timelike, Datelike};
use log::trace;

use super::arena::{GeneArena, GeneId};
use super::kind::GeneKind;
use super::spec::{GeneSpec, SpecKind};
use crate::error::{Result, SearchError};

/// Bind `a` and `b` to each other
pub fn add_binding(arena: &mut GeneArena, a: GeneId, b: GeneId) -> Result<()> {
    if a == b {
        return Ok(());
    }
    // both sides must exist before touching either
    arena.get(a)?;
    arena.get(b)?;
    arena.get_mut(a)?.bindings.insert(b);
    arena.get_mut(b)?.bindings.insert(a);
    Ok(())
}

pub fn is_bound_with(arena: &GeneArena, a: GeneId, b: GeneId) -> Result<bool> {
    Ok(arena.get(a)?.bindings.contains(&b) && arena.get(b)?.bindings.contains(&a))
}

/// Detach `id` from every gene it is bound with
pub fn remove_from_bindings(arena: &mut GeneArena, id: GeneId) -> Result<()> {
    let bound: Vec<GeneId> = arena.get(id)?.bindings.iter().copied().collect();
    for b in bound {
        if let Ok(node) = arena.get_mut(b) {
            node.bindings.remove(&id);
        }
    }
    arena.get_mut(id)?.bindings.clear();
    Ok(())
}

/// Drop bindings that point at removed genes. Returns how many were dropped.
pub fn clean_broken_bindings(arena: &mut GeneArena) -> Result<usize> {
    let ids: Vec<GeneId> = arena.live_ids().collect();
    let mut dropped = 0;
    for id in ids {
        let broken: Vec<GeneId> = arena
            .get(id)?
            .bindings
            .iter()
            .copied()
            .filter(|b| !arena.contains(*b))
            .collect();
        dropped += broken.len();
        let node = arena.get_mut(id)?;
        for b in broken {
            node.bindings.remove(&b);
        }
    }
    Ok(dropped)
}

/// Every binding resolves to a live gene and is symmetric
pub fn verify_bindings(arena: &GeneArena) -> Result<()> {
    for id in arena.live_ids() {
        for b in arena.get(id)?.bindings.iter() {
            let other = arena.get(*b).map_err(|_| {
                SearchError::BrokenBinding(format!("{:?} is bound to removed gene {:?}", id, b))
            })?;
            if !other.bindings.contains(&id) {
                return Err(SearchError::BrokenBinding(format!(
                    "binding {:?} -> {:?} is not symmetric",
                    id, b
                )));
            }
        }
    }
    Ok(())
}

/// Propagate the value of `id` (and of its descendants) to every gene
/// transitively bound to it. Genes refusing the value are skipped and
/// reported as arena anomalies.
pub fn sync_bindings_from(arena: &mut GeneArena, id: GeneId) -> Result<()> {
    let mut visited = HashSet::new();
    sync_from(arena, id, &mut visited)
}

fn sync_from(arena: &mut GeneArena, id: GeneId, visited: &mut HashSet<GeneId>) -> Result<()> {
    if !visited.insert(id) {
        return Ok(());
    }

    let bound: Vec<GeneId> = arena.get(id)?.bindings.iter().copied().collect();
    if !bound.is_empty() {
        let value = arena.export(id)?;
        for b in bound {
            if visited.contains(&b) {
                continue;
            }
            if !bind_value(arena, b, &value)? {
                let msg = format!(
                    "cannot bind {} ({}) with {} ({})",
                    arena.name(b)?,
                    arena.kind(b)?.type_name(),
                    value.name,
                    value.kind.type_name()
                );
                arena.report_anomaly(msg);
            }
            sync_from(arena, b, visited)?;
        }
    }

    for child in arena.children(id)? {
        sync_from(arena, child, visited)?;
    }
    Ok(())
}

/// Strict value copy: `source` must have the same variant as `target`
pub fn copy_value_from(arena: &mut GeneArena, target: GeneId, source: &GeneSpec) -> Result<()> {
    let expected = arena.kind(target)?.type_name();
    let actual = source.kind.type_name();
    if expected != actual || !bind_value(arena, target, source)? {
        return Err(SearchError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Set the value of `target` from `source`, converting across variants
/// where it makes sense. Returns `false` when the value is refused.
pub fn bind_value(arena: &mut GeneArena, target: GeneId, source: &GeneSpec) -> Result<bool> {
    // unwrap source wrappers that carry their value in an inner gene,
    // unless the target is the same wrapper
    let target_optional = matches!(arena.kind(target)?, GeneKind::Optional(_));
    let target_pk = matches!(arena.kind(target)?, GeneKind::SqlPrimaryKey(_));
    match &source.kind {
        SpecKind::Optional { gene, .. } if !target_optional => return bind_value(arena, target, gene),
        SpecKind::SqlPrimaryKey { gene, .. } if !target_pk => return bind_value(arena, target, gene),
        _ => {}
    }

    let accepted = match arena.kind(target)?.clone() {
        GeneKind::Integer(g) => match numeric_of(&source.kind) {
            Some(v) if v.fract() == 0.0 && v >= g.min as f64 && v <= g.max as f64 => {
                if let GeneKind::Integer(g) = arena.kind_mut(target)? {
                    g.value = v as i32;
                }
                true
            }
            _ => false,
        },
        GeneKind::Long(g) => match numeric_of(&source.kind) {
            Some(v) if v.fract() == 0.0 && v >= g.min as f64 && v <= g.max as f64 => {
                if let GeneKind::Long(g) = arena.kind_mut(target)? {
                    g.value = match &source.kind {
                        SpecKind::Long(s) => s.value,
                        _ => v as i64,
                    };
                }
                true
            }
            _ => false,
        },
        GeneKind::Double(g) => match numeric_of(&source.kind) {
            Some(v) if v >= g.min && v <= g.max => {
                if let GeneKind::Double(g) = arena.kind_mut(target)? {
                    g.value = v;
                }
                true
            }
            _ => false,
        },
        GeneKind::Boolean(_) => {
            let value = match &source.kind {
                SpecKind::Boolean(b) => Some(b.value),
                other => other.scalar_text().and_then(|s| s.parse::<bool>().ok()),
            };
            match value {
                Some(v) => {
                    if let GeneKind::Boolean(b) = arena.kind_mut(target)? {
                        b.value = v;
                    }
                    true
                }
                None => false,
            }
        }
        GeneKind::String(_) => match &source.kind {
            SpecKind::String(s) => {
                let value = s.current().to_string();
                if let GeneKind::String(g) = arena.kind_mut(target)? {
                    if g.matches_pattern(&value) && g.selected_specialization.is_none() {
                        g.value = value;
                    } else {
                        g.add_and_select_specialization(value);
                    }
                }
                true
            }
            other => match other.scalar_text() {
                Some(text) => {
                    if let GeneKind::String(g) = arena.kind_mut(target)? {
                        g.add_and_select_specialization(text);
                    }
                    true
                }
                None => false,
            },
        },
        GeneKind::Enum(e) => {
            let index = source
                .kind
                .scalar_text()
                .and_then(|t| e.values.iter().position(|v| *v == t));
            match index {
                Some(i) => {
                    if let GeneKind::Enum(e) = arena.kind_mut(target)? {
                        e.index = i;
                    }
                    true
                }
                None => false,
            }
        }
        GeneKind::Object(o) => match &source.kind {
            SpecKind::Object(fields) => {
                let mut all = true;
                for f in o.fields {
                    let name = arena.name(f)?.to_string();
                    match fields.iter().find(|s| s.name == name) {
                        Some(s) => all &= bind_value(arena, f, s)?,
                        None => all = false,
                    }
                }
                all
            }
            _ => false,
        },
        GeneKind::Array(a) => match &source.kind {
            SpecKind::Array { elements, .. } => {
                if elements.len() == a.elements.len() {
                    let mut all = true;
                    for (t, s) in a.elements.iter().zip(elements) {
                        all &= bind_value(arena, *t, s)?;
                    }
                    all
                } else if elements.len() > a.max_size {
                    false
                } else {
                    for e in &a.elements {
                        arena.remove_subtree(*e)?;
                    }
                    let mut fresh = Vec::with_capacity(elements.len());
                    for s in elements {
                        fresh.push(arena.insert(s, Some(target))?);
                    }
                    if let GeneKind::Array(a) = arena.kind_mut(target)? {
                        a.elements = fresh;
                    }
                    true
                }
            }
            _ => false,
        },
        GeneKind::Tuple(t) => match &source.kind {
            SpecKind::Tuple { elements, .. } if elements.len() == t.elements.len() => {
                let mut all = true;
                for (t, s) in t.elements.iter().zip(elements) {
                    all &= bind_value(arena, *t, s)?;
                }
                all
            }
            _ => false,
        },
        GeneKind::Optional(o) => {
            let (inner, active) = match &source.kind {
                SpecKind::Optional { gene, is_active, .. } => (gene.as_ref(), *is_active),
                _ => (source, true),
            };
            let ok = bind_value(arena, o.gene, inner)?;
            if ok {
                if let GeneKind::Optional(o) = arena.kind_mut(target)? {
                    o.is_active = active && o.selectable;
                }
            }
            ok
        }
        GeneKind::Date(d) => {
            let date = match &source.kind {
                SpecKind::Date { year, month, day } => Some((*year, *month, *day)),
                other => other
                    .scalar_text()
                    .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
                    .map(|d| (d.year(), d.month() as i32, d.day() as i32)),
            };
            match date {
                Some((y, m, day)) => {
                    arena.set_int_value(d.year, y)?;
                    arena.set_int_value(d.month, m)?;
                    arena.set_int_value(d.day, day)?;
                    true
                }
                None => false,
            }
        }
        GeneKind::Time(t) => {
            let time = match &source.kind {
                SpecKind::Time {
                    hour,
                    minute,
                    second,
                } => Some((*hour, *minute, *second)),
                other => other
                    .scalar_text()
                    .and_then(|s| NaiveTime::parse_from_str(&s, "%H:%M:%S").ok())
                    .map(|t| (t.hour() as i32, t.minute() as i32, t.second() as i32)),
            };
            match time {
                Some((h, m, s)) => {
                    arena.set_int_value(t.hour, h)?;
                    arena.set_int_value(t.minute, m)?;
                    arena.set_int_value(t.second, s)?;
                    true
                }
                None => false,
            }
        }
        GeneKind::SqlPrimaryKey(pk) => match &source.kind {
            SpecKind::SqlPrimaryKey { gene, .. } => bind_value(arena, pk.gene, gene)?,
            _ => bind_value(arena, pk.gene, source)?,
        },
        GeneKind::SqlForeignKey(_) => match &source.kind {
            SpecKind::SqlForeignKey(s) => {
                if let GeneKind::SqlForeignKey(fk) = arena.kind_mut(target)? {
                    fk.unique_id_of_primary_key = s.unique_id_of_primary_key;
                }
                true
            }
            _ => false,
        },
        GeneKind::Cycle => matches!(source.kind, SpecKind::Cycle),
        GeneKind::Limit => matches!(source.kind, SpecKind::Limit),
        GeneKind::SqlAutoIncrement => matches!(source.kind, SpecKind::SqlAutoIncrement),
    };

    if accepted {
        trace!("bound {} to value of {}", arena.name(target)?, source.name);
    }
    Ok(accepted)
}

fn numeric_of(kind: &SpecKind) -> Option<f64> {
    match kind {
        SpecKind::Integer(g) => Some(g.value as f64),
        SpecKind::Long(g) => Some(g.value as f64),
        SpecKind::Double(g) => Some(g.value),
        SpecKind::String(s) => s.current().trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        SpecKind::Enum(e) => e.current().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
