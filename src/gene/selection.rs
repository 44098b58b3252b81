//! GraphQL-style boolean selection: every scalar field becomes an
//! include/exclude flag, every object a (possibly optional) nested selection.

use super::arena::{GeneArena, GeneId};
use super::kind::GeneKind;
use super::spec::{GeneSpec, SpecKind};
use crate::error::{Result, SearchError};

/// Selection tree for `spec`, which must be an object (possibly optional,
/// possibly inside an array)
pub fn boolean_selection(spec: &GeneSpec) -> Result<GeneSpec> {
    if !should_apply(spec) {
        return Err(SearchError::InvalidTemplate(format!(
            "boolean selection not applicable to {} ({})",
            spec.name,
            spec.kind.type_name()
        )));
    }

    let selection = handle(spec);
    match selection.kind {
        SpecKind::Optional { gene, .. } if matches!(gene.kind, SpecKind::Object(_)) => Ok(*gene),
        SpecKind::Object(_) => Ok(selection),
        other => Err(SearchError::InvalidTemplate(format!(
            "boolean selection of {} produced {}",
            spec.name,
            other.type_name()
        ))),
    }
}

fn is_object(spec: &GeneSpec) -> bool {
    matches!(spec.kind, SpecKind::Object(_))
}

fn is_optional_object(spec: &GeneSpec) -> bool {
    matches!(&spec.kind, SpecKind::Optional { gene, .. } if is_object(gene))
}

fn should_apply(spec: &GeneSpec) -> bool {
    match &spec.kind {
        SpecKind::Object(_) => true,
        SpecKind::Optional { gene, .. } => match &gene.kind {
            SpecKind::Object(_) => true,
            SpecKind::Array { template, .. } => is_object(template) || is_optional_object(template),
            _ => false,
        },
        SpecKind::Array { template, .. } => is_object(template) || is_optional_object(template),
        _ => false,
    }
}

fn handle(spec: &GeneSpec) -> GeneSpec {
    match &spec.kind {
        SpecKind::Optional { gene, .. } => match &gene.kind {
            SpecKind::Object(_) => GeneSpec::optional(&spec.name, handle(gene)),
            SpecKind::Array { template, .. } => handle(template),
            SpecKind::Tuple {
                elements,
                last_element_treated_specially: true,
            } => special_tuple(&spec.name, elements),
            SpecKind::Tuple { .. } => gene.as_ref().clone(),
            _ => GeneSpec::boolean(&spec.name, true),
        },
        SpecKind::Cycle | SpecKind::Limit => spec.clone(),
        SpecKind::Object(fields) => GeneSpec::object(&spec.name, fields.iter().map(handle).collect()),
        SpecKind::Array { template, .. } => handle(template),
        SpecKind::Tuple {
            elements,
            last_element_treated_specially: true,
        } => special_tuple(&spec.name, elements),
        SpecKind::Tuple { .. } => spec.clone(),
        _ => GeneSpec::boolean(&spec.name, true),
    }
}

fn special_tuple(name: &str, elements: &[GeneSpec]) -> GeneSpec {
    let mut out: Vec<GeneSpec> = elements.iter().take(elements.len().saturating_sub(1)).cloned().collect();
    if let Some(last) = elements.last() {
        out.push(handle(last));
    }
    GeneSpec::tuple(name, out, true)
}

/// Guarantee at least one selected field at every selected object level.
/// When nothing is selected, the first candidate is turned on.
pub fn repair_boolean_selection(arena: &mut GeneArena, obj: GeneId) -> Result<()> {
    let fields = match arena.kind(obj)? {
        GeneKind::Object(o) => o.fields.clone(),
        other => {
            return Err(SearchError::TypeMismatch {
                expected: "ObjectGene".to_string(),
                actual: other.type_name().to_string(),
            })
        }
    };

    let mut all_selectable = !fields.is_empty();
    for f in &fields {
        all_selectable &= matches!(
            arena.kind(*f)?,
            GeneKind::Optional(_) | GeneKind::Boolean(_) | GeneKind::Tuple(_)
        );
    }
    if !all_selectable {
        return Err(SearchError::InvalidTemplate(format!(
            "selection {} needs at least one field, all optional, boolean or tuple",
            arena.name(obj)?
        )));
    }

    let mut selected = Vec::new();
    for f in &fields {
        if is_selected(arena, *f)? {
            selected.push(*f);
        }
    }

    if !selected.is_empty() {
        for s in selected {
            if let Some(nested) = nested_object(arena, s)? {
                repair_boolean_selection(arena, nested)?;
            }
        }
        return Ok(());
    }

    let mut candidate = None;
    for f in &fields {
        if is_candidate(arena, *f)? {
            candidate = Some(*f);
            break;
        }
    }
    let chosen = candidate.ok_or_else(|| {
        SearchError::InvalidTemplate(format!("no selectable field in {}", arena.name(obj).unwrap_or("?")))
    })?;

    match arena.kind(chosen)?.clone() {
        GeneKind::Tuple(t) => match t.elements.last() {
            Some(last) => select(arena, *last)?,
            None => {}
        },
        _ => select(arena, chosen)?,
    }
    Ok(())
}

fn select(arena: &mut GeneArena, id: GeneId) -> Result<()> {
    match arena.kind(id)?.clone() {
        GeneKind::Optional(o) => {
            if let GeneKind::Optional(opt) = arena.kind_mut(id)? {
                opt.is_active = true;
            }
            if matches!(arena.kind(o.gene)?, GeneKind::Object(_)) {
                repair_boolean_selection(arena, o.gene)?;
            }
        }
        GeneKind::Boolean(_) => {
            if let GeneKind::Boolean(b) = arena.kind_mut(id)? {
                b.value = true;
            }
        }
        _ => {}
    }
    Ok(())
}

fn is_selected(arena: &GeneArena, id: GeneId) -> Result<bool> {
    Ok(match arena.kind(id)? {
        GeneKind::Optional(o) => {
            o.is_active
                || match arena.kind(o.gene)? {
                    GeneKind::Tuple(t) => last_selected(arena, &t.elements)?,
                    _ => false,
                }
        }
        GeneKind::Boolean(b) => b.value,
        GeneKind::Tuple(t) => last_selected(arena, &t.elements)?,
        _ => false,
    })
}

fn last_selected(arena: &GeneArena, elements: &[GeneId]) -> Result<bool> {
    Ok(match elements.last() {
        Some(last) => match arena.kind(*last)? {
            GeneKind::Optional(o) => o.is_active,
            GeneKind::Boolean(b) => b.value,
            _ => false,
        },
        None => false,
    })
}

fn is_candidate(arena: &GeneArena, id: GeneId) -> Result<bool> {
    Ok(match arena.kind(id)? {
        GeneKind::Optional(o) => o.selectable,
        GeneKind::Boolean(_) => true,
        GeneKind::Tuple(t) => match t.elements.last() {
            Some(last) => match arena.kind(*last)? {
                GeneKind::Optional(o) => o.selectable,
                GeneKind::Boolean(_) => true,
                _ => false,
            },
            None => false,
        },
        _ => false,
    })
}

/// Object selection nested in a selected field, if any
fn nested_object(arena: &GeneArena, id: GeneId) -> Result<Option<GeneId>> {
    Ok(match arena.kind(id)? {
        GeneKind::Optional(o) if matches!(arena.kind(o.gene)?, GeneKind::Object(_)) => Some(o.gene),
        GeneKind::Tuple(t) => match t.elements.last() {
            Some(last) => match arena.kind(*last)? {
                GeneKind::Optional(o) if matches!(arena.kind(o.gene)?, GeneKind::Object(_)) => Some(o.gene),
                _ => None,
            },
            None => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::printing::{print, EscapeMode};

    fn schema() -> GeneSpec {
        GeneSpec::object(
            "User",
            vec![
                GeneSpec::integer("id", 0, 100),
                GeneSpec::string("name", 0, 10),
                GeneSpec::optional(
                    "address",
                    GeneSpec::object("Address", vec![GeneSpec::string("street", 0, 10), GeneSpec::integer("zip", 0, 99)]),
                ),
                GeneSpec::array(
                    "friends",
                    GeneSpec::object("Friend", vec![GeneSpec::string("nick", 0, 5)]),
                    0,
                    3,
                ),
            ],
        )
    }

    fn deselect_all(arena: &mut GeneArena, root: GeneId) {
        for g in arena.flat_view(root).unwrap() {
            match arena.kind_mut(g).unwrap() {
                GeneKind::Boolean(b) => b.value = false,
                GeneKind::Optional(o) => o.is_active = false,
                _ => {}
            }
        }
    }

    #[test]
    fn test_transform_shape() {
        let selection = boolean_selection(&schema()).unwrap();
        let mut kinds = Vec::new();
        selection.visit(&mut |g| kinds.push((g.name.clone(), g.kind.type_name())));
        assert_eq!(
            kinds,
            vec![
                ("User".to_string(), "ObjectGene"),
                ("id".to_string(), "BooleanGene"),
                ("name".to_string(), "BooleanGene"),
                ("address".to_string(), "OptionalGene"),
                ("Address".to_string(), "ObjectGene"),
                ("street".to_string(), "BooleanGene"),
                ("zip".to_string(), "BooleanGene"),
                ("Friend".to_string(), "ObjectGene"),
                ("nick".to_string(), "BooleanGene"),
            ]
        );
    }

    #[test]
    fn test_not_applicable_to_scalars() {
        assert!(boolean_selection(&GeneSpec::integer("x", 0, 1)).is_err());
    }

    #[test]
    fn test_repair_selects_first_candidate() {
        let selection = boolean_selection(&GeneSpec::object(
            "Q",
            vec![
                GeneSpec::optional("inner", GeneSpec::object("Inner", vec![GeneSpec::boolean("a", true)])),
                GeneSpec::integer("b", 0, 1),
            ],
        ))
        .unwrap();
        let mut arena = GeneArena::new("root");
        let root = arena.insert_top(&selection).unwrap();
        deselect_all(&mut arena, root);

        repair_boolean_selection(&mut arena, root).unwrap();
        assert_eq!(
            print(&arena, root, Some(EscapeMode::BooleanSelectionMode), None).unwrap(),
            "{inner{a}}"
        );
    }

    #[test]
    fn test_repair_fixes_nested_levels() {
        let selection = boolean_selection(&schema()).unwrap();
        let mut arena = GeneArena::new("root");
        let root = arena.insert_top(&selection).unwrap();
        let fields = arena.children(root).unwrap();
        deselect_all(&mut arena, root);

        // address selected but empty inside
        if let GeneKind::Optional(o) = arena.kind_mut(fields[2]).unwrap() {
            o.is_active = true;
        }
        repair_boolean_selection(&mut arena, root).unwrap();

        let address = arena.children(fields[2]).unwrap()[0];
        let street = arena.children(address).unwrap()[0];
        assert!(matches!(arena.kind(street).unwrap(), GeneKind::Boolean(b) if b.value));
    }
}
