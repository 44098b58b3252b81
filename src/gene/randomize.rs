use super::arena::{GeneArena, GeneId};
use super::kind::GeneKind;
use super::pattern::{has_single_match, random_match};
use super::printing::raw_value;
use super::utils::repair;
use crate::error::Result;
use crate::search::randomness::Randomness;

/// Scalar attempts before stepping to a neighbouring value
const MAX_SCALAR_TRIES: usize = 100;
/// Composite attempts before forcing children one by one
const MAX_COMPOSITE_TRIES: usize = 10;
/// Arrays never grow beyond this when sampled from scratch
pub const MAX_RANDOM_ARRAY_SIZE: usize = 5;

/// Assign a new value to `id` within its constraints.
///
/// With `force_new_value` the value is guaranteed to change whenever the gene
/// can hold more than one value. `context` lists the genes that may be
/// referenced, e.g. primary keys available to a foreign key.
pub fn randomize(
    arena: &mut GeneArena,
    id: GeneId,
    rng: &mut Randomness,
    force_new_value: bool,
    context: &[GeneId],
) -> Result<()> {
    if arena.get(id)?.locked {
        return Ok(());
    }

    match arena.kind(id)?.clone() {
        GeneKind::Integer(g) => {
            let mut next = g.value;
            for _ in 0..MAX_SCALAR_TRIES {
                next = rng.next_int(g.min as i64, g.max as i64) as i32;
                if !force_new_value || next != g.value {
                    break;
                }
            }
            if force_new_value && next == g.value && g.min < g.max {
                next = if g.value < g.max { g.value + 1 } else { g.value - 1 };
            }
            if let GeneKind::Integer(g) = arena.kind_mut(id)? {
                g.value = next;
            }
        }
        GeneKind::Long(g) => {
            let mut next = g.value;
            for _ in 0..MAX_SCALAR_TRIES {
                next = rng.next_int(g.min, g.max);
                if !force_new_value || next != g.value {
                    break;
                }
            }
            if force_new_value && next == g.value && g.min < g.max {
                next = if g.value < g.max { g.value + 1 } else { g.value - 1 };
            }
            if let GeneKind::Long(g) = arena.kind_mut(id)? {
                g.value = next;
            }
        }
        GeneKind::Double(g) => {
            let mut next = g.value;
            for _ in 0..MAX_SCALAR_TRIES {
                next = random_double(rng, g.min, g.max, g.is_float);
                if !force_new_value || next != g.value {
                    break;
                }
            }
            if force_new_value && next == g.value && g.min < g.max {
                next = if g.value < g.max { g.max } else { g.min };
            }
            if let GeneKind::Double(g) = arena.kind_mut(id)? {
                g.value = next;
            }
        }
        GeneKind::Boolean(g) => {
            let next = if force_new_value { !g.value } else { rng.next_bool() };
            if let GeneKind::Boolean(g) = arena.kind_mut(id)? {
                g.value = next;
            }
        }
        GeneKind::String(g) => {
            let before = g.current().to_string();
            let has_alternatives = g.specializations.iter().any(|s| *s != before);

            let mut chosen_specialization = None;
            let mut value = g.value.clone();

            if let Some(re) = &g.pattern {
                let candidates: Vec<usize> = (0..g.specializations.len())
                    .filter(|i| !force_new_value || g.specializations[*i] != before)
                    .filter(|i| re.is_match(&g.specializations[*i]))
                    .collect();
                let mut generated = false;
                if candidates.is_empty() || rng.next_bool() {
                    for _ in 0..MAX_SCALAR_TRIES {
                        let s = random_match(re, rng)?;
                        if re.is_match(&s) && (!force_new_value || s != before) {
                            value = s;
                            generated = true;
                            break;
                        }
                    }
                }
                if !generated {
                    chosen_specialization = rng.choose(&candidates).copied().or(g.selected_specialization);
                }
            } else if has_alternatives && rng.next_bool_with(0.5) {
                let candidates: Vec<usize> = (0..g.specializations.len())
                    .filter(|i| !force_new_value || g.specializations[*i] != before)
                    .collect();
                chosen_specialization = rng.choose(&candidates).copied();
            } else if g.max_length > 0 || !force_new_value {
                for _ in 0..MAX_SCALAR_TRIES {
                    value = random_text(rng, g.min_length, g.max_length);
                    if !force_new_value || value != before {
                        break;
                    }
                }
            }

            if let GeneKind::String(g) = arena.kind_mut(id)? {
                g.value = value;
                g.selected_specialization = chosen_specialization;
            }
        }
        GeneKind::Enum(g) => {
            let candidates: Vec<usize> = (0..g.values.len())
                .filter(|i| !force_new_value || *i != g.index)
                .collect();
            if let Some(i) = rng.choose(&candidates).copied() {
                if let GeneKind::Enum(g) = arena.kind_mut(id)? {
                    g.index = i;
                }
            }
        }
        GeneKind::Object(_) | GeneKind::Tuple(_) | GeneKind::Date(_) | GeneKind::Time(_) => {
            randomize_composite(arena, id, rng, force_new_value, context)?;
        }
        GeneKind::Array(_) => {
            let before = raw_value(arena, id)?;
            for _ in 0..MAX_COMPOSITE_TRIES {
                resample_array(arena, id, rng, context)?;
                if !force_new_value || raw_value(arena, id)? != before {
                    break;
                }
            }
        }
        GeneKind::Optional(o) => {
            if !o.selectable {
                if let GeneKind::Optional(o) = arena.kind_mut(id)? {
                    o.is_active = false;
                }
                return Ok(());
            }
            if force_new_value && (!o.is_active || rng.next_bool()) {
                if let GeneKind::Optional(o) = arena.kind_mut(id)? {
                    o.is_active = !o.is_active;
                }
                if !o.is_active {
                    randomize(arena, o.gene, rng, false, context)?;
                }
                return Ok(());
            }
            let active = force_new_value || rng.next_bool();
            if let GeneKind::Optional(o) = arena.kind_mut(id)? {
                o.is_active = active;
            }
            let before = raw_value(arena, id)?;
            randomize(arena, o.gene, rng, force_new_value, context)?;
            if force_new_value && raw_value(arena, id)? == before {
                if let GeneKind::Optional(o) = arena.kind_mut(id)? {
                    o.is_active = false;
                }
            }
        }
        GeneKind::Cycle | GeneKind::Limit | GeneKind::SqlAutoIncrement => {}
        GeneKind::SqlPrimaryKey(pk) => {
            randomize(arena, pk.gene, rng, force_new_value, context)?;
        }
        GeneKind::SqlForeignKey(fk) => {
            let mut candidates = Vec::new();
            for c in context {
                for g in arena.flat_view(*c)? {
                    if let GeneKind::SqlPrimaryKey(pk) = arena.kind(g)? {
                        if pk.table == fk.target_table {
                            candidates.push(Some(pk.unique_id));
                        }
                    }
                }
            }
            if fk.nullable {
                candidates.push(None);
            }
            candidates.retain(|c| !force_new_value || *c != fk.unique_id_of_primary_key);
            if let Some(next) = rng.choose(&candidates).copied() {
                if let GeneKind::SqlForeignKey(fk) = arena.kind_mut(id)? {
                    fk.unique_id_of_primary_key = next;
                }
            }
        }
    }
    Ok(())
}

/// Whether the gene can hold exactly one value
pub fn has_single_value(arena: &GeneArena, id: GeneId) -> Result<bool> {
    if arena.get(id)?.locked {
        return Ok(true);
    }
    Ok(match arena.kind(id)? {
        GeneKind::Integer(g) => g.min == g.max,
        GeneKind::Long(g) => g.min == g.max,
        GeneKind::Double(g) => g.min == g.max,
        GeneKind::Boolean(_) => false,
        GeneKind::String(g) => {
            if let Some(re) = &g.pattern {
                has_single_match(re)? && g.specializations.len() <= 1
            } else {
                g.max_length == 0
            }
        }
        GeneKind::Enum(g) => g.values.len() <= 1,
        GeneKind::Optional(o) => !o.selectable,
        GeneKind::Array(a) => a.max_size == 0,
        GeneKind::Cycle | GeneKind::Limit | GeneKind::SqlAutoIncrement => true,
        GeneKind::SqlForeignKey(_) => false,
        kind => {
            for c in kind.children() {
                if !has_single_value(arena, c)? {
                    return Ok(false);
                }
            }
            true
        }
    })
}

fn randomize_composite(
    arena: &mut GeneArena,
    id: GeneId,
    rng: &mut Randomness,
    force_new_value: bool,
    context: &[GeneId],
) -> Result<()> {
    let before = raw_value(arena, id)?;
    let children = arena.children(id)?;

    for _ in 0..MAX_COMPOSITE_TRIES {
        for c in &children {
            randomize(arena, *c, rng, false, context)?;
        }
        repair(arena, id)?;
        if !force_new_value || raw_value(arena, id)? != before {
            return Ok(());
        }
    }

    // force the first child that can still change
    for c in &children {
        if !has_single_value(arena, *c)? {
            randomize(arena, *c, rng, true, context)?;
            repair(arena, id)?;
            if raw_value(arena, id)? != before {
                break;
            }
        }
    }
    Ok(())
}

fn resample_array(arena: &mut GeneArena, id: GeneId, rng: &mut Randomness, context: &[GeneId]) -> Result<()> {
    let (template, old, min_size, max_size) = match arena.kind(id)? {
        GeneKind::Array(a) => (a.template.clone(), a.elements.clone(), a.min_size, a.max_size),
        _ => return Ok(()),
    };
    for e in old {
        arena.remove_subtree(e)?;
    }

    let upper = max_size.min(min_size.max(MAX_RANDOM_ARRAY_SIZE));
    let size = rng.next_int(min_size as i64, upper as i64) as usize;
    let mut elements = Vec::with_capacity(size);
    for _ in 0..size {
        let e = arena.insert(&template, Some(id))?;
        randomize(arena, e, rng, false, context)?;
        elements.push(e);
    }
    if let GeneKind::Array(a) = arena.kind_mut(id)? {
        a.elements = elements;
    }
    Ok(())
}

fn random_double(rng: &mut Randomness, min: f64, max: f64, is_float: bool) -> f64 {
    let value = if (max - min).is_finite() {
        rng.next_double_in(min, max)
    } else {
        (rng.next_gaussian() * 1_000_000.0).max(min).min(max)
    };
    if is_float {
        value as f32 as f64
    } else {
        value
    }
}

pub(crate) fn random_text(rng: &mut Randomness, min_length: usize, max_length: usize) -> String {
    let upper = max_length.min(min_length.max(16));
    let length = rng.next_int(min_length as i64, upper as i64) as usize;
    (0..length).map(|_| rng.next_letter_or_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::GeneSpec;

    fn force_new(spec: GeneSpec, seed: u64) {
        let mut arena = GeneArena::new("root");
        let mut rng = Randomness::with_seed(seed);
        let g = arena.insert_top(&spec).unwrap();
        for _ in 0..50 {
            let before = raw_value(&arena, g).unwrap();
            randomize(&mut arena, g, &mut rng, true, &[]).unwrap();
            assert_ne!(before, raw_value(&arena, g).unwrap(), "{}", spec.name);
        }
    }

    #[test]
    fn test_force_new_value_changes_value() {
        force_new(GeneSpec::integer("i", 0, 1), 1);
        force_new(GeneSpec::long("l", -5, 5), 2);
        force_new(GeneSpec::boolean("b", false), 3);
        force_new(GeneSpec::enumeration("e", &["A", "B", "C"]), 4);
        force_new(GeneSpec::string("s", 0, 4), 5);
        force_new(GeneSpec::date("d"), 6);
        force_new(
            GeneSpec::object("o", vec![GeneSpec::integer("x", 3, 3), GeneSpec::boolean("y", true)]),
            7,
        );
    }

    #[test]
    fn test_force_new_value_single_domain_is_noop() {
        let mut arena = GeneArena::new("root");
        let mut rng = Randomness::with_seed(9);
        let i = arena.insert_top(&GeneSpec::integer("i", 4, 4)).unwrap();
        let e = arena.insert_top(&GeneSpec::enumeration("e", &["ONLY"])).unwrap();

        randomize(&mut arena, i, &mut rng, true, &[]).unwrap();
        randomize(&mut arena, e, &mut rng, true, &[]).unwrap();

        assert_eq!(raw_value(&arena, i).unwrap(), "4");
        assert_eq!(raw_value(&arena, e).unwrap(), "ONLY");
        assert!(has_single_value(&arena, i).unwrap());
    }

    #[test]
    fn test_integer_stays_in_range() {
        let mut arena = GeneArena::new("root");
        let mut rng = Randomness::with_seed(11);
        let i = arena.insert_top(&GeneSpec::integer("i", -10, 10)).unwrap();
        for _ in 0..1000 {
            randomize(&mut arena, i, &mut rng, false, &[]).unwrap();
            let v = arena.int_value(i).unwrap();
            assert!((-10..=10).contains(&v));
        }
    }

    #[test]
    fn test_array_size_bounds() {
        let mut arena = GeneArena::new("root");
        let mut rng = Randomness::with_seed(12);
        let a = arena
            .insert_top(&GeneSpec::array("a", GeneSpec::integer("e", 0, 9), 1, 100))
            .unwrap();
        for _ in 0..100 {
            randomize(&mut arena, a, &mut rng, false, &[]).unwrap();
            let n = arena.children(a).unwrap().len();
            assert!((1..=MAX_RANDOM_ARRAY_SIZE).contains(&n));
        }
    }

    #[test]
    fn test_locked_gene_is_not_randomized() {
        let mut arena = GeneArena::new("root");
        let mut rng = Randomness::with_seed(13);
        let i = arena.insert_top(&GeneSpec::integer("i", 0, 1000).immutable()).unwrap();
        randomize(&mut arena, i, &mut rng, true, &[]).unwrap();
        assert_eq!(arena.int_value(i).unwrap(), 0);
    }

    #[test]
    fn test_foreign_key_picks_context_primary_key() {
        let mut arena = GeneArena::new("root");
        let mut rng = Randomness::with_seed(14);
        let pk = arena
            .insert_top(&GeneSpec::sql_primary_key("id", "FOO", 7, GeneSpec::long("id", 0, 100)))
            .unwrap();
        let fk = arena.insert_top(&GeneSpec::sql_foreign_key("foo_id", "FOO", false)).unwrap();

        randomize(&mut arena, fk, &mut rng, false, &[pk]).unwrap();
        assert_eq!(raw_value(&arena, fk).unwrap(), "7");
    }

    fn current_text(arena: &GeneArena, id: GeneId) -> String {
        match arena.kind(id).unwrap() {
            GeneKind::String(g) => g.current().to_string(),
            other => panic!("not a string: {}", other.type_name()),
        }
    }

    #[test]
    fn test_pattern_string_randomizes_to_matching_values() {
        let spec = GeneSpec::string_with_pattern("phone", "^[0-9]{3}-[0-9]{4}$", &[]).unwrap();
        let re = regex::Regex::new("^[0-9]{3}-[0-9]{4}$").unwrap();
        let mut arena = GeneArena::new("root");
        let g = arena.insert_top(&spec).unwrap();
        assert!(re.is_match(&current_text(&arena, g)));
        assert!(!has_single_value(&arena, g).unwrap());

        let mut rng = Randomness::with_seed(11);
        let mut distinct = std::collections::HashSet::new();
        for i in 0..200 {
            randomize(&mut arena, g, &mut rng, i % 2 == 0, &[]).unwrap();
            let value = current_text(&arena, g);
            assert!(re.is_match(&value), "{:?}", value);
            distinct.insert(value);
        }
        assert!(distinct.len() > 100);
    }

    #[test]
    fn test_pattern_string_mixes_examples_and_generated_values() {
        let spec = GeneSpec::string_with_pattern("code", "^[A-Z]{2}[0-9]$", &["AB1", "bad", "XY9"]).unwrap();
        let mut arena = GeneArena::new("root");
        let g = arena.insert_top(&spec).unwrap();
        assert_eq!(current_text(&arena, g), "AB1");

        let mut rng = Randomness::with_seed(12);
        let mut from_examples = 0;
        for _ in 0..100 {
            randomize(&mut arena, g, &mut rng, false, &[]).unwrap();
            let value = current_text(&arena, g);
            assert_ne!(value, "bad");
            if value == "AB1" || value == "XY9" {
                from_examples += 1;
            }
        }
        assert!(from_examples > 20 && from_examples < 100);
    }

    #[test]
    fn test_pattern_with_one_string_has_single_value() {
        let spec = GeneSpec::string_with_pattern("fixed", "^abc$", &[]).unwrap();
        let mut arena = GeneArena::new("root");
        let g = arena.insert_top(&spec).unwrap();
        assert_eq!(current_text(&arena, g), "abc");
        assert!(has_single_value(&arena, g).unwrap());
    }
}
