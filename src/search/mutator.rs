use std::collections::BTreeSet;

use log::{debug, trace};

use super::apc::AdaptiveParameterControl;
use super::impact::ImpactTracker;
use super::individual::{Individual, Lineage};
use super::mutation_weight::MutationWeightControl;
use super::randomness::Randomness;
use super::sampler::Sampler;
use crate::config::{MutationConfig, SamplingConfig};
use crate::error::Result;
use crate::gene::mutation::{is_mutable, mutation_weight};
use crate::gene::{standard_mutation, GeneArena, GeneId, MutationContext};
use crate::types::SubsetGeneSelectionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    AddAction,
    RemoveAction,
    ModifyGenes,
}

/// Top-level gene of a main action, with the data needed to mutate it
struct Candidate {
    gene: GeneId,
    action_name: String,
    /// Genes of earlier rows a foreign key may point to
    context: Vec<GeneId>,
}

/// Produces offspring by structural changes (add/remove an action) or by
/// mutating a subset of genes
pub struct Mutator {
    config: MutationConfig,
    mwc: MutationWeightControl,
    impacts: ImpactTracker,
    max_test_size: usize,
    p_no_auth: f64,
}

impl Mutator {
    pub fn new(config: MutationConfig, sampling: &SamplingConfig) -> Self {
        let mwc = MutationWeightControl::new(config.starting_percentage_of_genes_to_mutate);
        Self {
            config,
            mwc,
            impacts: ImpactTracker::new(),
            max_test_size: sampling.max_test_size,
            p_no_auth: sampling.p_no_auth,
        }
    }

    pub fn impacts(&self) -> &ImpactTracker {
        &self.impacts
    }

    /// Mutated copy of `parent`. The copy passes the root, binding and
    /// initialization invariants or an error is returned.
    pub fn mutate(
        &self,
        parent: &Individual,
        sampler: &mut dyn Sampler,
        rng: &mut Randomness,
        apc: &AdaptiveParameterControl,
    ) -> Result<Individual> {
        let mut child = parent.copy()?;
        child.lineage.parent = Some(parent.id());
        child.lineage.generation = parent.lineage.generation + 1;
        child.lineage.mutated_genes.clear();

        let candidates = self.candidates(&child)?;
        let mut operators = vec![];
        if child.size() < self.max_test_size && self.config.add_action_weight > 0.0 {
            operators.push((Operator::AddAction, self.config.add_action_weight));
        }
        if child.size() > 1 && self.config.remove_action_weight > 0.0 {
            operators.push((Operator::RemoveAction, self.config.remove_action_weight));
        }
        if !candidates.is_empty() {
            operators.push((Operator::ModifyGenes, self.config.modify_weight));
        }

        match rng.choose_weighted(&operators).copied() {
            Some(Operator::AddAction) => {
                let template = sampler.sample_random_action(self.p_no_auth, rng)?;
                let position = rng.next_index(child.size() + 1);
                let index = child.add_action(&template, Some(position))?;
                child.randomize_action(index, rng)?;
                trace!("Added {} at {}", template.name, index);
            }
            Some(Operator::RemoveAction) => {
                let index = rng.next_index(child.size());
                let removed = child.remove_action(index)?;
                trace!("Removed {} at {}", removed.name(), index);
            }
            Some(Operator::ModifyGenes) => {
                let keys = self.modify_genes(&mut child, &candidates, rng, apc)?;
                child.lineage.mutated_genes = keys;
            }
            None => debug!("Individual {} has nothing to mutate", parent.id()),
        }

        child.repair_initialization_actions(rng)?;
        child.prevent_placeholders(false)?;
        child.verify_root_invariant()?;
        child.verify_bindings()?;
        Ok(child)
    }

    /// Credit the genes changed to produce an offspring with `lineage`
    pub fn record_impact(&mut self, lineage: &Lineage, improved: bool) {
        if !lineage.mutated_genes.is_empty() {
            self.impacts.record(lineage.mutated_genes.iter().cloned(), improved);
        }
    }

    fn candidates(&self, individual: &Individual) -> Result<Vec<Candidate>> {
        let arena = individual.arena();
        let mut rows = Vec::new();
        let mut out = Vec::new();

        for action in individual.see_initializing_actions() {
            for g in action.see_genes() {
                if is_mutable(arena, *g)? {
                    out.push(Candidate {
                        gene: *g,
                        action_name: action.name().to_string(),
                        context: rows.clone(),
                    });
                }
            }
            for g in action.see_genes() {
                rows.extend(arena.flat_view(*g)?);
            }
        }
        for action in individual.see_actions() {
            for g in action.see_genes() {
                if is_mutable(arena, *g)? {
                    out.push(Candidate {
                        gene: *g,
                        action_name: action.name().to_string(),
                        context: rows.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    fn modify_genes(
        &self,
        child: &mut Individual,
        candidates: &[Candidate],
        rng: &mut Randomness,
        apc: &AdaptiveParameterControl,
    ) -> Result<Vec<String>> {
        let selected = self.select_top_genes(child.arena(), candidates, rng, apc)?;
        let impacts = if self.config.adaptive_mutation {
            Some(&self.impacts)
        } else {
            None
        };

        let mut keys = BTreeSet::new();
        for index in selected {
            let candidate = &candidates[index];
            let mut ctx = MutationContext::new(rng, apc, &self.mwc, self.config.gene_selection);
            ctx.impacts = impacts;
            ctx.action_name = candidate.action_name.clone();
            ctx.context_genes = candidate.context.clone();

            standard_mutation(child.arena_mut(), candidate.gene, &mut ctx)?;
            let mutated = std::mem::take(&mut ctx.mutated);
            drop(ctx);

            for leaf in mutated {
                impact_keys(child.arena(), leaf, &candidate.action_name, &mut keys)?;
            }
        }
        Ok(keys.into_iter().collect())
    }

    /// Indices into `candidates` of the top genes to mutate; never empty
    fn select_top_genes(
        &self,
        arena: &GeneArena,
        candidates: &[Candidate],
        rng: &mut Randomness,
        apc: &AdaptiveParameterControl,
    ) -> Result<Vec<usize>> {
        if candidates.len() == 1 {
            return Ok(vec![0]);
        }
        let selected = match self.config.gene_selection {
            SubsetGeneSelectionStrategy::Default => vec![rng.next_index(candidates.len())],
            SubsetGeneSelectionStrategy::DeterministicWeight | SubsetGeneSelectionStrategy::AdaptiveWeight => {
                let mut weighted = Vec::with_capacity(candidates.len());
                for (i, c) in candidates.iter().enumerate() {
                    let mut weight = mutation_weight(arena, c.gene)?;
                    if self.config.adaptive_mutation {
                        let key = ImpactTracker::key(&c.action_name, &arena.path_of(c.gene)?);
                        if let Some(impact) = self.impacts.weight(&key) {
                            weight *= impact;
                        }
                    }
                    weighted.push((i, weight));
                }
                self.mwc.select_sub_genes(&weighted, rng, apc)
            }
        };
        Ok(selected)
    }
}

/// Impact keys of `leaf` and its ancestors up to the top-level gene
fn impact_keys(arena: &GeneArena, leaf: GeneId, action_name: &str, keys: &mut BTreeSet<String>) -> Result<()> {
    if !arena.contains(leaf) {
        return Ok(());
    }
    let root = arena.root();
    let mut current = Some(leaf);
    while let Some(id) = current {
        if id == root {
            break;
        }
        keys.insert(ImpactTracker::key(action_name, &arena.path_of(id)?));
        current = arena.parent(id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::{raw_value, GeneSpec};
    use crate::rest::{HttpVerb, ParamLocation, RestCall, RestParam};
    use crate::search::action::ActionTemplate;
    use crate::search::fitness::EvaluatedIndividual;
    use crate::types::SampleType;

    struct FixedSampler {
        template: ActionTemplate,
    }

    impl Sampler for FixedSampler {
        fn sample(&mut self, rng: &mut Randomness) -> Result<Individual> {
            self.sample_at_random(rng)
        }

        fn sample_at_random(&mut self, rng: &mut Randomness) -> Result<Individual> {
            let mut ind = Individual::new(SampleType::Random);
            let index = ind.add_action(&self.template, None)?;
            ind.randomize_action(index, rng)?;
            Ok(ind)
        }

        fn smart_sample(&mut self, rng: &mut Randomness) -> Result<Individual> {
            self.sample_at_random(rng)
        }

        fn sample_random_action(&mut self, _no_auth: f64, _rng: &mut Randomness) -> Result<ActionTemplate> {
            Ok(self.template.clone())
        }

        fn has_seeded_individuals(&self) -> bool {
            false
        }

        fn is_last_seeded_individual(&self) -> bool {
            false
        }

        fn feedback(&mut self, _evaluated: &EvaluatedIndividual) {}
    }

    fn sampler() -> FixedSampler {
        let template = RestCall::template(
            HttpVerb::Post,
            "/items",
            vec![
                (RestParam::new("x", ParamLocation::Query), GeneSpec::integer("x", 0, 1000)),
                (RestParam::new("flag", ParamLocation::Query), GeneSpec::boolean("flag", false)),
            ],
        )
        .unwrap();
        FixedSampler { template }
    }

    #[test]
    fn test_mutation_changes_something_and_keeps_invariants() {
        let mut sampler = sampler();
        let mut rng = Randomness::with_seed(3);
        let apc = AdaptiveParameterControl::default();
        let mutator = Mutator::new(MutationConfig::default(), &SamplingConfig::default());
        let parent = sampler.sample_at_random(&mut rng).unwrap();

        let mut changed = 0;
        for _ in 0..50 {
            let child = mutator.mutate(&parent, &mut sampler, &mut rng, &apc).unwrap();
            assert_ne!(child.id(), parent.id());
            assert_eq!(child.lineage.parent, Some(parent.id()));
            assert_eq!(child.lineage.generation, 1);
            child.verify_root_invariant().unwrap();

            let values = |ind: &Individual| -> Vec<String> {
                ind.see_genes(crate::search::individual::GeneFilter::All)
                    .iter()
                    .map(|g| raw_value(ind.arena(), *g).unwrap())
                    .collect()
            };
            if child.size() != parent.size() || values(&child) != values(&parent) {
                changed += 1;
            }
        }
        assert!(changed > 40);
    }

    #[test]
    fn test_size_stays_within_bounds() {
        let mut sampler = sampler();
        let mut rng = Randomness::with_seed(4);
        let apc = AdaptiveParameterControl::default();
        let sampling = SamplingConfig {
            max_test_size: 3,
            ..SamplingConfig::default()
        };
        let config = MutationConfig {
            add_action_weight: 5.0,
            remove_action_weight: 5.0,
            ..MutationConfig::default()
        };
        let mutator = Mutator::new(config, &sampling);

        let mut current = sampler.sample_at_random(&mut rng).unwrap();
        for _ in 0..200 {
            current = mutator.mutate(&current, &mut sampler, &mut rng, &apc).unwrap();
            assert!(current.size() >= 1 && current.size() <= 3);
        }
    }

    #[test]
    fn test_modification_records_impact_keys() {
        let mut sampler = sampler();
        let mut rng = Randomness::with_seed(5);
        let apc = AdaptiveParameterControl::default();
        let config = MutationConfig {
            gene_selection: SubsetGeneSelectionStrategy::AdaptiveWeight,
            adaptive_mutation: true,
            add_action_weight: 0.0,
            remove_action_weight: 0.0,
            ..MutationConfig::default()
        };
        let mut mutator = Mutator::new(config, &SamplingConfig::default());
        let parent = sampler.sample_at_random(&mut rng).unwrap();

        let child = mutator.mutate(&parent, &mut sampler, &mut rng, &apc).unwrap();
        assert!(!child.lineage.mutated_genes.is_empty());
        assert!(child.lineage.mutated_genes.iter().all(|k| k.starts_with("POST:/items::")));

        mutator.record_impact(&child.lineage, true);
        assert_eq!(mutator.impacts().len(), child.lineage.mutated_genes.len());
    }
}
