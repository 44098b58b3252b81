use std::collections::VecDeque;

use log::{debug, trace};

use super::call::RestCall;
use super::verb::HttpVerb;
use crate::config::SamplingConfig;
use crate::error::{Result, SearchError};
use crate::gene::{add_binding, bind_value};
use crate::search::action::{ActionId, ActionKind, ActionTemplate};
use crate::search::individual::Individual;
use crate::search::randomness::Randomness;
use crate::search::sampler::Sampler;
use crate::types::SampleType;

/// Probability of trying a PUT on its own instead of after a creating POST
const STANDALONE_PUT_PROBABILITY: f64 = 0.2;

/// Sampler of REST tests.
///
/// Smart sampling picks one endpoint and builds the calls it depends on:
/// a GET, PUT, DELETE or PATCH on `/x/{id}` is preceded by a POST on the
/// closest ancestor endpoint creating the resource, with path parameters
/// bound to the same values and locked.
pub struct RestSampler {
    config: SamplingConfig,
    actions: Vec<ActionTemplate>,
    auth: Vec<String>,
    seeded: VecDeque<Individual>,
    last_seeded: bool,
}

impl RestSampler {
    pub fn new(actions: Vec<ActionTemplate>, config: SamplingConfig) -> Result<Self> {
        if actions.is_empty() {
            return Err(SearchError::InvalidTemplate("empty REST action catalog".to_string()));
        }
        if let Some(a) = actions.iter().find(|a| a.as_rest().is_none()) {
            return Err(SearchError::InvalidTemplate(format!("{} is not a REST call", a.name)));
        }
        Ok(Self {
            config,
            actions,
            auth: Vec::new(),
            seeded: VecDeque::new(),
            last_seeded: false,
        })
    }

    /// Credentials to choose from for authenticated calls
    pub fn with_auth(mut self, auth: Vec<String>) -> Self {
        self.auth = auth;
        self
    }

    /// Individual handed out, in insertion order, before any sampling
    pub fn add_seeded_individual(&mut self, mut individual: Individual) {
        individual.sample_type = SampleType::Seeded;
        self.seeded.push_back(individual);
    }

    pub fn actions(&self) -> &[ActionTemplate] {
        &self.actions
    }

    fn random_auth(&self, no_auth_probability: f64, rng: &mut Randomness) -> Option<String> {
        if self.auth.is_empty() || rng.next_bool_with(no_auth_probability) {
            None
        } else {
            rng.choose(&self.auth).cloned()
        }
    }

    fn call_of<'a>(individual: &'a Individual, id: ActionId) -> Result<(usize, &'a RestCall)> {
        let index = individual
            .index_of(id)
            .ok_or_else(|| SearchError::InvalidTemplate(format!("action {} not in individual", id.value())))?;
        let call = individual
            .action(index)
            .and_then(|a| a.as_rest())
            .ok_or_else(|| SearchError::InvalidTemplate(format!("action {} is not a REST call", id.value())))?;
        Ok((index, call))
    }

    fn call_of_mut(individual: &mut Individual, id: ActionId) -> Result<&mut RestCall> {
        let index = individual
            .index_of(id)
            .ok_or_else(|| SearchError::InvalidTemplate(format!("action {} not in individual", id.value())))?;
        individual
            .action_mut(index)
            .and_then(|a| a.as_rest_mut())
            .ok_or_else(|| SearchError::InvalidTemplate(format!("action {} is not a REST call", id.value())))
    }

    fn template_named(&self, name: &str) -> Result<&ActionTemplate> {
        self.actions
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| SearchError::InvalidTemplate(format!("no template named {}", name)))
    }

    /// Smart test built around `template`; empty when its verb has no heuristic
    pub fn sample_smart_for(&self, template: &ActionTemplate, rng: &mut Randomness) -> Result<Individual> {
        let verb = template
            .as_rest()
            .map(|c| c.verb)
            .ok_or_else(|| SearchError::InvalidTemplate(format!("{} is not a REST call", template.name)))?;

        let mut individual = Individual::new(SampleType::Smart);
        let index = individual.add_action(template, None)?;
        individual.randomize_action(index, rng)?;
        let target = individual.see_actions()[index].id();

        let sample_type = match verb {
            HttpVerb::Get => self.handle_smart_get(&mut individual, target, rng)?,
            HttpVerb::Post => SampleType::Smart,
            HttpVerb::Put => {
                if !rng.next_bool_with(STANDALONE_PUT_PROBABILITY) {
                    self.create_write_operation_after_a_post(&mut individual, target, template, rng)?;
                }
                SampleType::Smart
            }
            HttpVerb::Delete | HttpVerb::Patch => {
                self.create_write_operation_after_a_post(&mut individual, target, template, rng)?;
                SampleType::Smart
            }
            // no heuristic for this verb, callers fall back to random sampling
            _ => return Ok(Individual::new(SampleType::Random)),
        };

        individual.sample_type = sample_type;
        individual.prevent_placeholders(false)?;
        trace!(
            "Smart sample for {}: {} actions ({:?})",
            template.name,
            individual.size(),
            sample_type
        );
        Ok(individual)
    }

    fn handle_smart_get(&self, individual: &mut Individual, get: ActionId, rng: &mut Randomness) -> Result<SampleType> {
        let created = self.create_resources_for(individual, get, rng)?;
        if !created {
            // read-only endpoint, nothing to create first
            return Ok(SampleType::Smart);
        }
        self.prevent_path_param_mutation(individual)?;

        let get_path = Self::call_of(individual, get)?.1.path.clone();
        if get_path.is_last_element_a_parameter() {
            return Ok(SampleType::Smart);
        }

        let last_post = &individual.see_actions()[individual.size() - 2];
        let last_post_name = last_post.name().to_string();
        let (last_post_path, last_post_location) = match last_post.as_rest() {
            Some(c) => (c.path.clone(), c.location_id.clone()),
            None => return Ok(SampleType::Smart),
        };

        let available = self.config.max_test_size.saturating_sub(individual.size());
        if last_post_path.is_equivalent(&get_path) && available > 0 {
            trace!("Creating POSTs on collection before a GET");
            let template = self.template_named(&last_post_name)?.clone();
            let k = 1 + rng.next_index(available);
            for _ in 0..k {
                let position = individual.size() - 1;
                let create = self.create_action_for(individual, &template, get, position, rng)?;
                Self::call_of_mut(individual, create)?.location_id = last_post_location.clone();
            }
            self.prevent_path_param_mutation(individual)?;
            debug!("Collection GET after {} POSTs on {}", k + 1, last_post_path);
            return Ok(SampleType::SmartGetCollection);
        }

        Ok(SampleType::Smart)
    }

    /// PUT, DELETE and PATCH: create the resource first
    fn create_write_operation_after_a_post(
        &self,
        individual: &mut Individual,
        write: ActionId,
        template: &ActionTemplate,
        rng: &mut Randomness,
    ) -> Result<()> {
        self.create_resources_for(individual, write, rng)?;

        let verb = Self::call_of(individual, write)?.1.verb;
        if verb == HttpVerb::Patch && self.config.max_test_size >= individual.size() + 1 && rng.next_bool() {
            // PATCH is not idempotent, two in a row are worth testing
            let location = Self::call_of(individual, write)?.1.location_id.clone();
            let position = individual.size();
            let second = self.create_action_for(individual, template, write, position, rng)?;
            Self::call_of_mut(individual, second)?.location_id = location;
        }

        self.prevent_path_param_mutation(individual)
    }

    /// Prepend a POST chain creating the resource `target` works on.
    /// Returns false when no creating POST exists or the size limit is hit.
    fn create_resources_for(&self, individual: &mut Individual, target: ActionId, rng: &mut Randomness) -> Result<bool> {
        if individual.size() >= self.config.max_test_size {
            return Ok(false);
        }

        let (target_path, target_name) = {
            let (index, call) = Self::call_of(individual, target)?;
            let name = individual.see_actions()[index].name().to_string();
            (call.path.clone(), name)
        };
        let template = match self.choose_closest_ancestor(&target_path, &target_name, &[HttpVerb::Post], rng) {
            Some(t) => t.clone(),
            None => return Ok(false),
        };
        let post = self.create_action_for(individual, &template, target, 0, rng)?;

        let post_path = Self::call_of(individual, post)?.1.path.clone();
        let depends_on_other_resource = (post_path.has_variable_path_parameters()
            && !post_path.is_last_element_a_parameter())
            || post_path.variable_names().len() >= 2;
        if depends_on_other_resource && !self.create_resources_for(individual, post, rng)? {
            return Ok(false);
        }

        if !post_path.is_equivalent(&target_path) {
            // POST /x then GET /x/{id}: the target uses the created location
            Self::call_of_mut(individual, post)?.save_location = true;
            Self::call_of_mut(individual, target)?.location_id = Some(post_path.last_element());
        } else {
            // same endpoint, the target reuses whatever location the POST uses
            let location = {
                let call = Self::call_of_mut(individual, post)?;
                call.save_location = false;
                call.location_id.clone()
            };
            Self::call_of_mut(individual, target)?.location_id = location;
        }
        Ok(true)
    }

    /// New action from `template` at `position`, with fresh values, the
    /// auth of `target` and path parameters bound to those of `target`
    fn create_action_for(
        &self,
        individual: &mut Individual,
        template: &ActionTemplate,
        target: ActionId,
        position: usize,
        rng: &mut Randomness,
    ) -> Result<ActionId> {
        let index = individual.add_action(template, Some(position))?;
        individual.randomize_action(index, rng)?;
        let created = individual.see_actions()[index].id();

        let auth = Self::call_of(individual, target)?.1.auth.clone();
        Self::call_of_mut(individual, created)?.auth = auth;

        self.bind_to_same_path_resolution(individual, created, target)?;
        Ok(created)
    }

    fn bind_to_same_path_resolution(&self, individual: &mut Individual, action: ActionId, target: ActionId) -> Result<()> {
        let (action_index, action_call) = Self::call_of(individual, action)?;
        let own = action_call.path_param_genes(&individual.see_actions()[action_index]);
        let (target_index, target_call) = Self::call_of(individual, target)?;
        let theirs = target_call.path_param_genes(&individual.see_actions()[target_index]);

        for (name, gene) in own {
            if let Some((_, other)) = theirs.iter().find(|(n, _)| *n == name) {
                let value = individual.arena().export(*other)?;
                let arena = individual.arena_mut();
                if !bind_value(arena, gene, &value)? {
                    debug!("Path parameter {} could not take the value of its target", name);
                }
                add_binding(arena, gene, *other)?;
            }
        }
        Ok(())
    }

    fn prevent_path_param_mutation(&self, individual: &mut Individual) -> Result<()> {
        let genes: Vec<_> = individual
            .see_actions()
            .iter()
            .filter_map(|a| a.as_rest().map(|c| c.path_param_genes(a)))
            .flatten()
            .map(|(_, g)| g)
            .collect();
        for g in genes {
            individual.arena_mut().prevent_mutation(g)?;
        }
        Ok(())
    }

    /// Among endpoints with a verb in `verbs` whose path is an ancestor of
    /// (or equivalent to) `target`, one with the longest path; never the
    /// target itself
    fn choose_closest_ancestor(
        &self,
        target: &super::path::RestPath,
        target_name: &str,
        verbs: &[HttpVerb],
        rng: &mut Randomness,
    ) -> Option<&ActionTemplate> {
        let others: Vec<&ActionTemplate> = self
            .actions
            .iter()
            .filter(|a| a.name != target_name)
            .filter(|a| {
                a.as_rest()
                    .map(|c| verbs.contains(&c.verb) && c.path.is_ancestor_of(target))
                    .unwrap_or(false)
            })
            .collect();

        let max = others.iter().filter_map(|a| a.as_rest()).map(|c| c.path.levels()).max()?;
        let candidates: Vec<&ActionTemplate> = others
            .into_iter()
            .filter(|a| a.as_rest().map(|c| c.path.levels() == max).unwrap_or(false))
            .collect();
        rng.choose(&candidates).copied()
    }

    fn random_individual(&mut self, rng: &mut Randomness) -> Result<Individual> {
        let n = rng.next_int(1, self.config.max_test_size as i64) as usize;
        let mut individual = Individual::new(SampleType::Random);
        for _ in 0..n {
            let template = self.sample_random_action(self.config.p_no_auth, rng)?;
            let index = individual.add_action(&template, None)?;
            individual.randomize_action(index, rng)?;
        }
        individual.prevent_placeholders(false)?;
        Ok(individual)
    }
}

impl Sampler for RestSampler {
    fn sample(&mut self, rng: &mut Randomness) -> Result<Individual> {
        if !self.seeded.is_empty() {
            return self.smart_sample(rng);
        }
        self.last_seeded = false;
        if rng.next_bool_with(self.config.smart_sampling_probability) {
            self.smart_sample(rng)
        } else {
            self.sample_at_random(rng)
        }
    }

    fn sample_at_random(&mut self, rng: &mut Randomness) -> Result<Individual> {
        self.random_individual(rng)
    }

    fn smart_sample(&mut self, rng: &mut Randomness) -> Result<Individual> {
        if let Some(seed) = self.seeded.pop_front() {
            self.last_seeded = self.seeded.is_empty();
            return Ok(seed);
        }

        if self.config.max_test_size <= 1 {
            // chains need at least two calls
            return self.sample_at_random(rng);
        }

        let template = self.sample_random_action(0.0, rng)?;
        let individual = self.sample_smart_for(&template, rng)?;
        if individual.size() == 0 {
            return self.sample_at_random(rng);
        }
        Ok(individual)
    }

    fn sample_random_action(&mut self, no_auth_probability: f64, rng: &mut Randomness) -> Result<ActionTemplate> {
        let mut template = rng
            .choose(&self.actions)
            .cloned()
            .ok_or_else(|| SearchError::InvalidTemplate("empty REST action catalog".to_string()))?;
        let auth = self.random_auth(no_auth_probability, rng);
        if let ActionKind::Rest(call) = &mut template.kind {
            call.auth = auth;
        }
        Ok(template)
    }

    fn has_seeded_individuals(&self) -> bool {
        !self.seeded.is_empty()
    }

    fn is_last_seeded_individual(&self) -> bool {
        self.last_seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::{raw_value, GeneSpec};
    use crate::rest::{ParamLocation, RestParam};

    fn id_param() -> Vec<(RestParam, GeneSpec)> {
        vec![(RestParam::new("id", ParamLocation::Path), GeneSpec::integer("id", 0, 1_000_000))]
    }

    fn elements_catalog() -> Vec<ActionTemplate> {
        vec![
            RestCall::template(HttpVerb::Post, "/elements", Vec::new()).unwrap(),
            RestCall::template(HttpVerb::Get, "/elements", Vec::new()).unwrap(),
            RestCall::template(HttpVerb::Get, "/elements/{id}", id_param()).unwrap(),
        ]
    }

    fn names(individual: &Individual) -> Vec<String> {
        individual.see_actions().iter().map(|a| a.name().to_string()).collect()
    }

    #[test]
    fn test_rejects_empty_catalog() {
        assert!(RestSampler::new(Vec::new(), SamplingConfig::default()).is_err());
    }

    #[test]
    fn test_random_sample_length() {
        let config = SamplingConfig {
            max_test_size: 4,
            ..SamplingConfig::default()
        };
        let mut sampler = RestSampler::new(elements_catalog(), config).unwrap();
        let mut rng = Randomness::with_seed(1);
        for _ in 0..50 {
            let ind = sampler.sample_at_random(&mut rng).unwrap();
            assert!(ind.size() >= 1 && ind.size() <= 4);
            assert_eq!(ind.sample_type, SampleType::Random);
            ind.verify_root_invariant().unwrap();
        }
    }

    #[test]
    fn test_get_collection_is_populated_first() {
        let sampler = RestSampler::new(elements_catalog(), SamplingConfig::default()).unwrap();
        let mut rng = Randomness::with_seed(2);
        let get = sampler.actions()[1].clone();

        let ind = sampler.sample_smart_for(&get, &mut rng).unwrap();
        assert_eq!(ind.sample_type, SampleType::SmartGetCollection);
        let names = names(&ind);
        assert!(names.len() >= 3 && names.len() <= 10);
        assert_eq!(names.last().unwrap(), "GET:/elements");
        assert!(names[..names.len() - 1].iter().all(|n| n == "POST:/elements"));
    }

    #[test]
    fn test_put_without_creator_stays_alone() {
        let catalog = vec![RestCall::template(HttpVerb::Put, "/things/{id}", id_param()).unwrap()];
        let sampler = RestSampler::new(catalog, SamplingConfig::default()).unwrap();
        let mut rng = Randomness::with_seed(3);
        let put = sampler.actions()[0].clone();
        let ind = sampler.sample_smart_for(&put, &mut rng).unwrap();
        assert_eq!(names(&ind), vec!["PUT:/things/{id}".to_string()]);
    }

    #[test]
    fn test_delete_binds_to_nested_creation_chain() {
        let catalog = vec![
            RestCall::template(HttpVerb::Post, "/users", Vec::new()).unwrap(),
            RestCall::template(
                HttpVerb::Post,
                "/users/{uid}/posts",
                vec![(RestParam::new("uid", ParamLocation::Path), GeneSpec::integer("uid", 0, 1_000_000))],
            )
            .unwrap(),
            RestCall::template(
                HttpVerb::Delete,
                "/users/{uid}/posts/{pid}",
                vec![
                    (RestParam::new("uid", ParamLocation::Path), GeneSpec::integer("uid", 0, 1_000_000)),
                    (RestParam::new("pid", ParamLocation::Path), GeneSpec::integer("pid", 0, 1_000_000)),
                ],
            )
            .unwrap(),
        ];
        let sampler = RestSampler::new(catalog, SamplingConfig::default()).unwrap();
        let mut rng = Randomness::with_seed(4);
        let delete = sampler.actions()[2].clone();

        let ind = sampler.sample_smart_for(&delete, &mut rng).unwrap();
        assert_eq!(
            names(&ind),
            vec!["POST:/users", "POST:/users/{uid}/posts", "DELETE:/users/{uid}/posts/{pid}"]
        );

        let posts = ind.find_gene(1, "uid").unwrap().unwrap();
        let del = ind.find_gene(2, "uid").unwrap().unwrap();
        assert_eq!(raw_value(ind.arena(), posts).unwrap(), raw_value(ind.arena(), del).unwrap());
        assert!(ind.arena().get(del).unwrap().is_locked());

        let calls: Vec<&RestCall> = ind.see_actions().iter().map(|a| a.as_rest().unwrap()).collect();
        assert!(calls[0].save_location);
        assert_eq!(calls[1].location_id.as_deref(), Some("users"));
        assert!(calls[1].save_location);
        assert_eq!(calls[2].location_id.as_deref(), Some("posts"));
    }

    #[test]
    fn test_seeded_individuals_come_first() {
        let mut sampler = RestSampler::new(elements_catalog(), SamplingConfig::default()).unwrap();
        let mut rng = Randomness::with_seed(5);
        let first = sampler.sample_at_random(&mut rng).unwrap();
        let second = sampler.sample_at_random(&mut rng).unwrap();
        let (first_id, second_id) = (first.id(), second.id());
        sampler.add_seeded_individual(first);
        sampler.add_seeded_individual(second);

        assert!(sampler.has_seeded_individuals());
        let a = sampler.sample(&mut rng).unwrap();
        assert_eq!(a.id(), first_id);
        assert_eq!(a.sample_type, SampleType::Seeded);
        assert!(!sampler.is_last_seeded_individual());

        let b = sampler.sample(&mut rng).unwrap();
        assert_eq!(b.id(), second_id);
        assert!(sampler.is_last_seeded_individual());
        assert!(!sampler.has_seeded_individuals());

        sampler.sample(&mut rng).unwrap();
        assert!(!sampler.is_last_seeded_individual());
    }

    #[test]
    fn test_random_action_auth() {
        let mut sampler = RestSampler::new(elements_catalog(), SamplingConfig::default())
            .unwrap()
            .with_auth(vec!["alice".to_string()]);
        let mut rng = Randomness::with_seed(6);
        let with = sampler.sample_random_action(0.0, &mut rng).unwrap();
        assert_eq!(with.as_rest().unwrap().auth.as_deref(), Some("alice"));
        let without = sampler.sample_random_action(1.0, &mut rng).unwrap();
        assert!(without.as_rest().unwrap().auth.is_none());
    }
}
