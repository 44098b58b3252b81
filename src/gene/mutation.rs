use log::trace;

use super::arena::{GeneArena, GeneId};
use super::binding::sync_bindings_from;
use super::kind::GeneKind;
use super::pattern::has_single_match;
use super::printing::raw_value;
use super::randomize::{random_text, randomize};
use super::utils::{is_valid, repair_genes};
use crate::error::{Result, SearchError};
use crate::search::apc::AdaptiveParameterControl;
use crate::search::impact::ImpactTracker;
use crate::search::mutation_weight::MutationWeightControl;
use crate::search::randomness::Randomness;
use crate::types::SubsetGeneSelectionStrategy;

/// Re-mutations attempted while the parent fails its validity check
const MAX_MUTATION_RETRIES: usize = 3;
/// Probability of toggling an active optional instead of mutating its content
const OPTIONAL_TOGGLE_PROBABILITY: f64 = 0.1;

/// 2^i for i in 0..=30
const INTPOW2: [i64; 31] = {
    let mut out = [0i64; 31];
    let mut i = 0;
    while i < 31 {
        out[i] = 1 << i;
        i += 1;
    }
    out
};

/// Services and state threaded through one gene mutation
pub struct MutationContext<'a> {
    pub rng: &'a mut Randomness,
    pub apc: &'a AdaptiveParameterControl,
    pub mwc: &'a MutationWeightControl,
    pub strategy: SubsetGeneSelectionStrategy,
    pub impacts: Option<&'a ImpactTracker>,
    /// Name of the action owning the mutated genes, used for impact keys
    pub action_name: String,
    /// Genes that may be referenced by the mutated ones (e.g. primary keys)
    pub context_genes: Vec<GeneId>,
    /// Leaf genes changed so far
    pub mutated: Vec<GeneId>,
}

impl<'a> MutationContext<'a> {
    pub fn new(
        rng: &'a mut Randomness,
        apc: &'a AdaptiveParameterControl,
        mwc: &'a MutationWeightControl,
        strategy: SubsetGeneSelectionStrategy,
    ) -> Self {
        Self {
            rng,
            apc,
            mwc,
            strategy,
            impacts: None,
            action_name: String::new(),
            context_genes: Vec::new(),
            mutated: Vec::new(),
        }
    }
}

/// Mutate `id` in place.
///
/// Composite genes mutate a subset of their internal genes, leaves mutate
/// their own value. Bindings are synchronized before returning.
pub fn standard_mutation(arena: &mut GeneArena, id: GeneId, ctx: &mut MutationContext) -> Result<()> {
    let internal = candidates_internal_genes(arena, id, ctx)?;

    if internal.is_empty() {
        if !mutate_leaf(arena, id, ctx)? {
            return Err(SearchError::LeafMutationUnsupported(arena.kind(id)?.type_name().to_string()));
        }
        ctx.mutated.push(id);
    } else {
        let selected = select_subset(arena, &internal, ctx)?;
        for s in selected {
            let mut counter = 0;
            loop {
                standard_mutation(arena, s, ctx)?;
                counter += 1;
                if mutation_check(arena, id)? || counter > MAX_MUTATION_RETRIES {
                    break;
                }
            }
            if !mutation_check(arena, id)? {
                trace!("repairing {} after {} mutation attempts", arena.name(id)?, counter);
                repair_genes(arena, &[id])?;
            }
        }
    }

    sync_bindings_from(arena, id)
}

/// Sub-genes eligible for subset mutation. Empty means a leaf mutation.
pub fn candidates_internal_genes(
    arena: &GeneArena,
    id: GeneId,
    ctx: &mut MutationContext,
) -> Result<Vec<GeneId>> {
    let mutable_children = |children: Vec<GeneId>| -> Result<Vec<GeneId>> {
        let mut out = Vec::new();
        for c in children {
            if is_mutable(arena, c)? {
                out.push(c);
            }
        }
        Ok(out)
    };

    match arena.kind(id)? {
        GeneKind::Object(o) => mutable_children(o.fields.clone()),
        GeneKind::Tuple(t) => mutable_children(t.elements.clone()),
        GeneKind::Date(_) | GeneKind::Time(_) => mutable_children(arena.children(id)?),
        GeneKind::Array(a) => {
            let resizable = (a.elements.len() < a.max_size) || (a.elements.len() > a.min_size);
            if a.elements.is_empty() || (resizable && ctx.rng.next_bool()) {
                Ok(Vec::new())
            } else {
                mutable_children(a.elements.clone())
            }
        }
        GeneKind::Optional(o) => {
            if o.is_active && is_mutable(arena, o.gene)? && !ctx.rng.next_bool_with(OPTIONAL_TOGGLE_PROBABILITY) {
                Ok(vec![o.gene])
            } else {
                Ok(Vec::new())
            }
        }
        GeneKind::SqlPrimaryKey(pk) => mutable_children(vec![pk.gene]),
        _ => Ok(Vec::new()),
    }
}

fn select_subset(arena: &GeneArena, internal: &[GeneId], ctx: &mut MutationContext) -> Result<Vec<GeneId>> {
    let selected: Vec<GeneId> = match ctx.strategy {
        SubsetGeneSelectionStrategy::Default => ctx.rng.choose(internal).copied().into_iter().collect(),
        SubsetGeneSelectionStrategy::DeterministicWeight => {
            let weighted = static_weights(arena, internal)?;
            ctx.mwc.select_sub_genes(&weighted, ctx.rng, ctx.apc)
        }
        SubsetGeneSelectionStrategy::AdaptiveWeight => {
            let mut weighted = static_weights(arena, internal)?;
            let mut any_impact = false;
            if let Some(impacts) = ctx.impacts {
                for (g, w) in weighted.iter_mut() {
                    let key = ImpactTracker::key(&ctx.action_name, &arena.path_of(*g)?);
                    if let Some(impact) = impacts.weight(&key) {
                        *w *= impact;
                        any_impact = true;
                    }
                }
            }
            if !any_impact {
                trace!("no impact data for {} candidates, using static weights", internal.len());
            }
            ctx.mwc.select_sub_genes(&weighted, ctx.rng, ctx.apc)
        }
    };

    if selected.is_empty() {
        return Err(SearchError::EmptySelection {
            strategy: ctx.strategy.to_string(),
            candidates: internal.len(),
        });
    }
    Ok(selected)
}

fn static_weights(arena: &GeneArena, ids: &[GeneId]) -> Result<Vec<(GeneId, f64)>> {
    ids.iter().map(|g| Ok((*g, mutation_weight(arena, *g)?))).collect()
}

/// Direct mutation of a gene without internal candidates.
/// Returns `false` when the gene has no leaf mutation.
fn mutate_leaf(arena: &mut GeneArena, id: GeneId, ctx: &mut MutationContext) -> Result<bool> {
    match arena.kind(id)?.clone() {
        GeneKind::Integer(g) => {
            let range = (g.max as i64) - (g.min as i64);
            let delta = get_delta(ctx.rng, ctx.apc, range);
            let sign = if ctx.rng.next_bool() { 1 } else { -1 };
            let next = (g.value as i64 + sign * delta).max(g.min as i64).min(g.max as i64) as i32;
            if next == g.value {
                randomize(arena, id, ctx.rng, true, &[])?;
            } else if let GeneKind::Integer(g) = arena.kind_mut(id)? {
                g.value = next;
            }
            Ok(true)
        }
        GeneKind::Long(g) => {
            let range = (g.max as i128 - g.min as i128).min(i64::MAX as i128) as i64;
            let delta = get_delta(ctx.rng, ctx.apc, range);
            let sign: i128 = if ctx.rng.next_bool() { 1 } else { -1 };
            let next = (g.value as i128 + sign * delta as i128).max(g.min as i128).min(g.max as i128) as i64;
            if next == g.value {
                randomize(arena, id, ctx.rng, true, &[])?;
            } else if let GeneKind::Long(g) = arena.kind_mut(id)? {
                g.value = next;
            }
            Ok(true)
        }
        GeneKind::Double(g) => {
            let range = g.max - g.min;
            let scale = if range.is_finite() {
                get_delta(ctx.rng, ctx.apc, range.max(1.0) as i64) as f64
            } else {
                get_delta(ctx.rng, ctx.apc, i64::MAX) as f64
            };
            let mut next = (g.value + ctx.rng.next_gaussian() * scale).max(g.min).min(g.max);
            if g.is_float {
                next = next as f32 as f64;
            }
            if next == g.value {
                randomize(arena, id, ctx.rng, true, &[])?;
            } else if let GeneKind::Double(g) = arena.kind_mut(id)? {
                g.value = next;
            }
            Ok(true)
        }
        GeneKind::Boolean(_) => {
            if let GeneKind::Boolean(g) = arena.kind_mut(id)? {
                g.value = !g.value;
            }
            Ok(true)
        }
        GeneKind::String(g) => {
            let switch_specialization = !g.specializations.is_empty() && ctx.rng.next_bool();
            if switch_specialization || g.pattern.is_some() {
                randomize(arena, id, ctx.rng, true, &[])?;
                return Ok(true);
            }

            let mut chars: Vec<char> = g.current().chars().collect();
            let can_grow = chars.len() < g.max_length;
            let can_shrink = chars.len() > g.min_length;
            let choice = ctx.rng.next_index(3);
            if choice == 0 && can_grow {
                let at = ctx.rng.next_index(chars.len() + 1);
                chars.insert(at, ctx.rng.next_letter_or_digit());
            } else if choice == 1 && can_shrink {
                let at = ctx.rng.next_index(chars.len());
                chars.remove(at);
            } else if !chars.is_empty() {
                let at = ctx.rng.next_index(chars.len());
                let old = chars[at];
                let mut c = ctx.rng.next_letter_or_digit();
                while c == old {
                    c = ctx.rng.next_letter_or_digit();
                }
                chars[at] = c;
            } else if g.max_length > 0 {
                chars = random_text(ctx.rng, g.min_length.max(1), g.max_length).chars().collect();
            }

            if let GeneKind::String(g) = arena.kind_mut(id)? {
                g.value = chars.into_iter().collect();
                g.selected_specialization = None;
            }
            Ok(true)
        }
        GeneKind::Enum(_) => {
            randomize(arena, id, ctx.rng, true, &[])?;
            Ok(true)
        }
        GeneKind::Array(a) => {
            let n = a.elements.len();
            let can_add = n < a.max_size;
            let can_remove = n > a.min_size;
            if can_add && (!can_remove || ctx.rng.next_bool()) {
                let e = arena.insert(&a.template, Some(id))?;
                randomize(arena, e, ctx.rng, false, &ctx.context_genes)?;
                if let GeneKind::Array(a) = arena.kind_mut(id)? {
                    a.elements.push(e);
                }
                Ok(true)
            } else if can_remove {
                let victim = a.elements[ctx.rng.next_index(n)];
                arena.remove_subtree(victim)?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        GeneKind::Optional(o) => {
            if !o.selectable {
                return Ok(false);
            }
            if let GeneKind::Optional(o) = arena.kind_mut(id)? {
                o.is_active = !o.is_active;
            }
            Ok(true)
        }
        GeneKind::Date(_) | GeneKind::Time(_) => {
            randomize(arena, id, ctx.rng, true, &ctx.context_genes)?;
            Ok(true)
        }
        GeneKind::SqlForeignKey(_) => {
            let context = ctx.context_genes.clone();
            randomize(arena, id, ctx.rng, true, &context)?;
            Ok(true)
        }
        GeneKind::Object(_)
        | GeneKind::Tuple(_)
        | GeneKind::Cycle
        | GeneKind::Limit
        | GeneKind::SqlAutoIncrement
        | GeneKind::SqlPrimaryKey(_) => Ok(false),
    }
}

/// Step size for numeric mutations: a power of two whose maximum exponent
/// shrinks as the search progresses, capped by `range`
pub fn get_delta(rng: &mut Randomness, apc: &AdaptiveParameterControl, range: i64) -> i64 {
    let max_index = apc.get_exploratory_value(INTPOW2.len(), 10);

    let mut n = 0;
    for i in 0..max_index.saturating_sub(1) {
        n = i + 1;
        if n >= INTPOW2.len() || INTPOW2[n] > range {
            break;
        }
    }

    rng.choose_up_to(&INTPOW2, n).copied().unwrap_or(1)
}

/// Whether mutating `id` can change the phenotype
pub fn is_mutable(arena: &GeneArena, id: GeneId) -> Result<bool> {
    if arena.get(id)?.locked {
        return Ok(false);
    }
    Ok(match arena.kind(id)? {
        GeneKind::Integer(g) => g.min < g.max,
        GeneKind::Long(g) => g.min < g.max,
        GeneKind::Double(g) => g.min < g.max,
        GeneKind::Boolean(_) => true,
        GeneKind::String(g) => {
            if let Some(re) = &g.pattern {
                !has_single_match(re)? || g.specializations.len() > 1
            } else {
                g.max_length > 0 || !g.specializations.is_empty()
            }
        }
        GeneKind::Enum(g) => g.values.len() > 1,
        GeneKind::Array(a) => {
            if a.min_size < a.max_size {
                true
            } else {
                let mut any = false;
                for e in &a.elements {
                    any |= is_mutable(arena, *e)?;
                }
                any
            }
        }
        GeneKind::Optional(o) => o.selectable,
        GeneKind::Cycle | GeneKind::Limit | GeneKind::SqlAutoIncrement => false,
        GeneKind::SqlForeignKey(_) => true,
        kind => {
            let mut any = false;
            for c in kind.children() {
                any |= is_mutable(arena, c)?;
            }
            any
        }
    })
}

/// Static weight of a gene for subset selection
pub fn mutation_weight(arena: &GeneArena, id: GeneId) -> Result<f64> {
    Ok(match arena.kind(id)? {
        GeneKind::Object(o) => {
            let mut sum = 0.0;
            for f in &o.fields {
                sum += mutation_weight(arena, *f)?;
            }
            sum.max(1.0)
        }
        GeneKind::Tuple(t) => {
            let mut sum = 0.0;
            for e in &t.elements {
                sum += mutation_weight(arena, *e)?;
            }
            sum.max(1.0)
        }
        GeneKind::Array(a) => {
            let mut sum = 1.0;
            for e in &a.elements {
                sum += mutation_weight(arena, *e)?;
            }
            sum
        }
        GeneKind::Optional(o) => 1.0 + mutation_weight(arena, o.gene)?,
        GeneKind::SqlPrimaryKey(pk) => mutation_weight(arena, pk.gene)?,
        _ => 1.0,
    })
}

/// Validity check run after a sub-gene was mutated
pub fn mutation_check(arena: &GeneArena, id: GeneId) -> Result<bool> {
    is_valid(arena, id)
}

/// Same variant and same printed value, possibly across arenas
pub fn contains_same_value_as(arena: &GeneArena, id: GeneId, other_arena: &GeneArena, other: GeneId) -> Result<bool> {
    Ok(arena.kind(id)?.type_name() == other_arena.kind(other)?.type_name()
        && raw_value(arena, id)? == raw_value(other_arena, other)?)
}

/// Heuristic identity of the same logical gene across generations
pub fn possibly_same(arena: &GeneArena, id: GeneId, other_arena: &GeneArena, other: GeneId) -> Result<bool> {
    Ok(arena.name(id)? == other_arena.name(other)?
        && arena.kind(id)?.type_name() == other_arena.kind(other)?.type_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::binding::add_binding;
    use crate::gene::GeneSpec;

    struct Services {
        rng: Randomness,
        apc: AdaptiveParameterControl,
        mwc: MutationWeightControl,
    }

    impl Services {
        fn new(seed: u64) -> Self {
            Self {
                rng: Randomness::with_seed(seed),
                apc: AdaptiveParameterControl::default(),
                mwc: MutationWeightControl::default(),
            }
        }

        fn ctx(&mut self, strategy: SubsetGeneSelectionStrategy) -> MutationContext<'_> {
            MutationContext::new(&mut self.rng, &self.apc, &self.mwc, strategy)
        }
    }

    #[test]
    fn test_leaf_mutation_changes_integer() {
        let mut services = Services::new(1);
        let mut arena = GeneArena::new("root");
        let i = arena.insert_top(&GeneSpec::integer("i", -100, 100)).unwrap();

        for _ in 0..100 {
            let before = arena.int_value(i).unwrap();
            let mut ctx = services.ctx(SubsetGeneSelectionStrategy::Default);
            standard_mutation(&mut arena, i, &mut ctx).unwrap();
            let after = arena.int_value(i).unwrap();
            assert_ne!(before, after);
            assert!((-100..=100).contains(&after));
        }
    }

    #[test]
    fn test_object_mutation_touches_one_field_by_default() {
        let mut services = Services::new(2);
        let mut arena = GeneArena::new("root");
        let o = arena
            .insert_top(&GeneSpec::object(
                "o",
                vec![GeneSpec::boolean("a", false), GeneSpec::boolean("b", false)],
            ))
            .unwrap();

        let mut ctx = services.ctx(SubsetGeneSelectionStrategy::Default);
        standard_mutation(&mut arena, o, &mut ctx).unwrap();
        assert_eq!(ctx.mutated.len(), 1);
        let printed = raw_value(&arena, o).unwrap();
        assert!(printed == "{\"a\":true,\"b\":false}" || printed == "{\"a\":false,\"b\":true}");
    }

    #[test]
    fn test_weighted_strategies_select_something() {
        let mut services = Services::new(3);
        let mut arena = GeneArena::new("root");
        let o = arena
            .insert_top(&GeneSpec::object(
                "o",
                vec![GeneSpec::integer("a", 0, 10), GeneSpec::string("b", 0, 5), GeneSpec::date("c")],
            ))
            .unwrap();

        let impacts = ImpactTracker::new();
        for strategy in [
            SubsetGeneSelectionStrategy::DeterministicWeight,
            SubsetGeneSelectionStrategy::AdaptiveWeight,
        ] {
            for _ in 0..20 {
                let mut ctx = services.ctx(strategy);
                ctx.impacts = Some(&impacts);
                standard_mutation(&mut arena, o, &mut ctx).unwrap();
                assert!(!ctx.mutated.is_empty());
            }
        }
    }

    #[test]
    fn test_placeholder_leaf_mutation_is_fatal() {
        let mut services = Services::new(4);
        let mut arena = GeneArena::new("root");
        let c = arena.insert_top(&GeneSpec::cycle("c")).unwrap();
        let mut ctx = services.ctx(SubsetGeneSelectionStrategy::Default);
        assert!(matches!(
            standard_mutation(&mut arena, c, &mut ctx),
            Err(SearchError::LeafMutationUnsupported(_))
        ));
    }

    #[test]
    fn test_mutation_propagates_to_bound_gene() {
        let mut services = Services::new(5);
        let mut arena = GeneArena::new("root");
        let a = arena.insert_top(&GeneSpec::integer("a", 0, 1000)).unwrap();
        let b = arena.insert_top(&GeneSpec::integer("b", 0, 1000)).unwrap();
        add_binding(&mut arena, a, b).unwrap();

        for _ in 0..20 {
            let mut ctx = services.ctx(SubsetGeneSelectionStrategy::Default);
            standard_mutation(&mut arena, a, &mut ctx).unwrap();
            assert_eq!(arena.int_value(a).unwrap(), arena.int_value(b).unwrap());
        }
    }

    #[test]
    fn test_date_mutation_stays_valid() {
        let mut services = Services::new(6);
        let mut arena = GeneArena::new("root");
        let d = arena.insert_top(&GeneSpec::date("d")).unwrap();
        for _ in 0..200 {
            let mut ctx = services.ctx(SubsetGeneSelectionStrategy::Default);
            standard_mutation(&mut arena, d, &mut ctx).unwrap();
            assert!(is_valid(&arena, d).unwrap());
        }
    }

    #[test]
    fn test_possibly_same_across_arenas() {
        let mut a = GeneArena::new("a");
        let mut b = GeneArena::new("b");
        let x = a.insert_top(&GeneSpec::integer("x", 0, 5)).unwrap();
        let y = b.insert_top(&GeneSpec::integer("x", 0, 5)).unwrap();
        assert!(possibly_same(&a, x, &b, y).unwrap());
        assert!(contains_same_value_as(&a, x, &b, y).unwrap());
    }

    #[test]
    fn test_pattern_string_mutation_stays_in_language() {
        let mut services = Services::new(4);
        let mut arena = GeneArena::new("root");
        let spec = GeneSpec::string_with_pattern("zip", r"^\d{5}(-\d{4})?$", &[]).unwrap();
        let g = arena.insert_top(&spec).unwrap();
        assert!(is_mutable(&arena, g).unwrap());

        let re = regex::Regex::new(r"^\d{5}(-\d{4})?$").unwrap();
        for _ in 0..50 {
            let before = raw_value(&arena, g).unwrap();
            let mut ctx = services.ctx(SubsetGeneSelectionStrategy::Default);
            standard_mutation(&mut arena, g, &mut ctx).unwrap();
            let after = raw_value(&arena, g).unwrap();
            assert_ne!(before, after);
            assert!(re.is_match(&after), "{:?}", after);
        }
    }
}
