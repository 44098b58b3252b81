use std::sync::Arc;

use log::{debug, info};

use super::apc::AdaptiveParameterControl;
use super::archive::{Archive, ArchiveReport};
use super::budget::SearchTimeController;
use super::fitness::{EvaluatedIndividual, FitnessFunction};
use super::individual::Individual;
use super::mutator::Mutator;
use super::progress::ProgressCallback;
use super::randomness::Randomness;
use super::sampler::Sampler;
use crate::config::AppConfig;
use crate::error::Result;
use crate::gene::utils::WarnOnce;
use crate::types::TargetId;

/// Outcome of a search: a minimal set of tests covering every covered target
#[derive(Debug, Clone)]
pub struct Solution {
    pub individuals: Vec<Arc<EvaluatedIndividual>>,
    pub covered_targets: Vec<TargetId>,
    pub report: ArchiveReport,
}

impl Solution {
    fn from_archive(archive: &Archive) -> Self {
        Self {
            individuals: archive.extract_solution(),
            covered_targets: archive.covered_targets(),
            report: archive.snapshot(),
        }
    }
}

pub trait SearchAlgorithm {
    fn name(&self) -> &'static str;

    /// One iteration: sample or mutate, evaluate, update the archive
    fn search_once(&mut self) -> Result<()>;

    fn time(&self) -> &SearchTimeController;

    fn time_mut(&mut self) -> &mut SearchTimeController;

    fn archive(&self) -> &Archive;

    /// Iterate until the budget is used up. Errors from an iteration abort
    /// the search.
    fn search<C: ProgressCallback>(&mut self, mut callback: C) -> Result<Solution>
    where
        Self: Sized,
    {
        callback.on_search_start(self.name());
        info!("Starting {} search", self.name());
        self.time_mut().start_search();

        while self.time().should_continue() {
            self.search_once()?;
            callback.on_evaluation(
                self.time().evaluated_individuals(),
                self.archive().number_of_covered_targets(),
            );
        }

        let solution = Solution::from_archive(self.archive());
        info!(
            "{} search finished after {} evaluations: {} targets covered by {} tests",
            self.name(),
            self.time().evaluated_individuals(),
            solution.covered_targets.len(),
            solution.individuals.len()
        );
        callback.on_search_complete(&solution.report);
        Ok(solution)
    }
}

/// Many Independent Objective algorithm: keeps a population per target and
/// mutates individuals of the targets it sampled the least.
pub struct MioAlgorithm<S: Sampler, F: FitnessFunction> {
    config: AppConfig,
    sampler: S,
    fitness: F,
    archive: Archive,
    mutator: Mutator,
    rng: Randomness,
    apc: AdaptiveParameterControl,
    time: SearchTimeController,
    warnings: WarnOnce,
}

impl<S: Sampler, F: FitnessFunction> MioAlgorithm<S, F> {
    pub fn new(config: AppConfig, sampler: S, fitness: F) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            archive: Archive::new(config.search.archive_target_limit),
            mutator: Mutator::new(config.mutation.clone(), &config.sampling),
            rng: Randomness::new(config.search.seed),
            apc: AdaptiveParameterControl::new(config.search.focused_search_activation_time),
            time: SearchTimeController::from_config(&config.search),
            warnings: WarnOnce::new(),
            config,
            sampler,
            fitness,
        })
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn mutator(&self) -> &Mutator {
        &self.mutator
    }

    pub fn fitness(&self) -> &F {
        &self.fitness
    }

    pub fn warnings(&self) -> &WarnOnce {
        &self.warnings
    }

    fn evaluate(&mut self, individual: Individual) -> Option<EvaluatedIndividual> {
        evaluate_counted(individual, &mut self.fitness, &mut self.time, &mut self.warnings)
    }

    fn sample_fresh(&mut self) -> Result<()> {
        let individual = self.sampler.sample(&mut self.rng)?;
        if let Some(evaluated) = self.evaluate(individual) {
            self.sampler.feedback(&evaluated);
            self.archive.add_if_needed(evaluated);
        }
        if self.sampler.is_last_seeded_individual() {
            self.archive.archive_covered_statistics_by_seeded_tests();
        }
        Ok(())
    }
}

impl<S: Sampler, F: FitnessFunction> SearchAlgorithm for MioAlgorithm<S, F> {
    fn name(&self) -> &'static str {
        "MIO"
    }

    fn search_once(&mut self) -> Result<()> {
        self.apc.set_progress(self.time.percentage_used_budget());

        let random_probability = self
            .apc
            .get_base_probability(self.config.search.probability_of_random_sampling, 0.0);
        if self.archive.is_empty()
            || self.sampler.has_seeded_individuals()
            || self.rng.next_bool_with(random_probability)
        {
            return self.sample_fresh();
        }

        let parent = match self.archive.sample_individual(&mut self.rng) {
            Some(p) => p,
            None => return self.sample_fresh(),
        };
        let child = self
            .mutator
            .mutate(&parent.individual, &mut self.sampler, &mut self.rng, &self.apc)?;
        let lineage = child.lineage.clone();

        if let Some(evaluated) = self.evaluate(child) {
            let improved = self.archive.add_if_needed(evaluated);
            self.mutator.record_impact(&lineage, improved);
        }
        Ok(())
    }

    fn time(&self) -> &SearchTimeController {
        &self.time
    }

    fn time_mut(&mut self) -> &mut SearchTimeController {
        &mut self.time
    }

    fn archive(&self) -> &Archive {
        &self.archive
    }
}

/// Log the individual's pending anomalies once per run, then run the fitness
/// function. The evaluation is charged to the budget even without a result.
fn evaluate_counted<F: FitnessFunction>(
    mut individual: Individual,
    fitness: &mut F,
    time: &mut SearchTimeController,
    warnings: &mut WarnOnce,
) -> Option<EvaluatedIndividual> {
    for msg in individual.arena_mut().take_anomalies() {
        warnings.warn(&msg);
    }
    time.report_executed_individual();
    let evaluated = fitness.evaluate(individual);
    if evaluated.is_none() {
        debug!("Evaluation returned no fitness information");
    }
    evaluated
}

/// Baseline that only samples, keeping the best individuals in an archive
pub struct RandomAlgorithm<S: Sampler, F: FitnessFunction> {
    sampler: S,
    fitness: F,
    archive: Archive,
    rng: Randomness,
    time: SearchTimeController,
    warnings: WarnOnce,
}

impl<S: Sampler, F: FitnessFunction> RandomAlgorithm<S, F> {
    pub fn new(config: AppConfig, sampler: S, fitness: F) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sampler,
            fitness,
            archive: Archive::new(config.search.archive_target_limit),
            rng: Randomness::new(config.search.seed),
            time: SearchTimeController::from_config(&config.search),
            warnings: WarnOnce::new(),
        })
    }

    pub fn fitness(&self) -> &F {
        &self.fitness
    }

    pub fn warnings(&self) -> &WarnOnce {
        &self.warnings
    }
}

impl<S: Sampler, F: FitnessFunction> SearchAlgorithm for RandomAlgorithm<S, F> {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn search_once(&mut self) -> Result<()> {
        let individual = self.sampler.sample(&mut self.rng)?;
        let evaluated = evaluate_counted(individual, &mut self.fitness, &mut self.time, &mut self.warnings);
        if let Some(evaluated) = evaluated {
            self.sampler.feedback(&evaluated);
            self.archive.add_if_needed(evaluated);
        }
        if self.sampler.is_last_seeded_individual() {
            self.archive.archive_covered_statistics_by_seeded_tests();
        }
        Ok(())
    }

    fn time(&self) -> &SearchTimeController {
        &self.time
    }

    fn time_mut(&mut self) -> &mut SearchTimeController {
        &mut self.time
    }

    fn archive(&self) -> &Archive {
        &self.archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::{raw_value, GeneSpec};
    use crate::rest::{HttpVerb, ParamLocation, RestCall, RestParam};
    use crate::search::action::ActionTemplate;
    use crate::search::fitness::FitnessValue;
    use crate::search::individual::GeneFilter;
    use crate::types::SampleType;

    struct OneCallSampler {
        template: ActionTemplate,
        seeds: Vec<Individual>,
        last_seeded: bool,
    }

    impl OneCallSampler {
        fn new() -> Self {
            let template = RestCall::template(
                HttpVerb::Get,
                "/value",
                vec![(RestParam::new("x", ParamLocation::Query), GeneSpec::integer("x", 0, 100))],
            )
            .unwrap();
            Self {
                template,
                seeds: Vec::new(),
                last_seeded: false,
            }
        }
    }

    impl Sampler for OneCallSampler {
        fn sample(&mut self, rng: &mut Randomness) -> Result<Individual> {
            if let Some(seed) = self.seeds.pop() {
                self.last_seeded = self.seeds.is_empty();
                return Ok(seed);
            }
            self.last_seeded = false;
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
            !self.seeds.is_empty()
        }

        fn is_last_seeded_individual(&self) -> bool {
            self.last_seeded
        }
    }

    /// Target 0 is covered by x == 42, with distance |x - 42| / 100
    struct ValueFitness {
        calls: usize,
    }

    impl FitnessFunction for ValueFitness {
        fn calculate_coverage(&mut self, individual: &Individual) -> Option<FitnessValue> {
            self.calls += 1;
            let mut fitness = FitnessValue::new();
            for g in individual.see_genes(GeneFilter::NoSql) {
                let x: f64 = raw_value(individual.arena(), g).ok()?.parse().ok()?;
                fitness.update_target(0, (x - 42.0).abs() / 100.0);
            }
            Some(fitness)
        }
    }

    /// Answers like `ValueFitness` on every `period`-th call, `None` otherwise
    struct SparseFitness {
        period: usize,
        calls: usize,
        answered: usize,
    }

    impl SparseFitness {
        fn new(period: usize) -> Self {
            Self {
                period,
                calls: 0,
                answered: 0,
            }
        }
    }

    impl FitnessFunction for SparseFitness {
        fn calculate_coverage(&mut self, individual: &Individual) -> Option<FitnessValue> {
            self.calls += 1;
            if self.calls % self.period != 0 {
                return None;
            }
            self.answered += 1;
            let mut fitness = FitnessValue::new();
            for g in individual.see_genes(GeneFilter::NoSql) {
                let x: f64 = raw_value(individual.arena(), g).ok()?.parse().ok()?;
                fitness.update_target(0, (x - 42.0).abs() / 100.0);
            }
            Some(fitness)
        }
    }

    fn config(evaluations: u64) -> AppConfig {
        let mut config = AppConfig::default();
        config.search.seed = Some(17);
        config.search.max_evaluations = evaluations;
        config.sampling.max_test_size = 3;
        config
    }

    struct Silent;

    impl ProgressCallback for Silent {
        fn on_search_start(&mut self, _algorithm: &str) {}
        fn on_evaluation(&mut self, _evaluations: u64, _covered_targets: usize) {}
        fn on_search_complete(&mut self, _report: &ArchiveReport) {}
    }

    #[test]
    fn test_mio_respects_budget_and_improves() {
        let mut mio = MioAlgorithm::new(config(300), OneCallSampler::new(), ValueFitness { calls: 0 }).unwrap();
        let solution = mio.search(Silent).unwrap();

        assert_eq!(mio.time().evaluated_individuals(), 300);
        assert_eq!(mio.fitness.calls, 300);
        let best = mio.archive().best_distance(0).unwrap();
        assert!(best < 0.1, "best distance {}", best);
        assert_eq!(solution.report.targets.len(), 1);
    }

    #[test]
    fn test_seeds_are_used_first() {
        let mut sampler = OneCallSampler::new();
        let mut rng = Randomness::with_seed(1);
        let mut seed = sampler.sample_at_random(&mut rng).unwrap();
        seed.sample_type = SampleType::Seeded;
        let gene = seed.see_genes(GeneFilter::NoSql)[0];
        if let crate::gene::GeneKind::Integer(g) = seed.arena_mut().kind_mut(gene).unwrap() {
            g.value = 42;
        }
        sampler.seeds.push(seed);

        let mut mio = MioAlgorithm::new(config(1), sampler, ValueFitness { calls: 0 }).unwrap();
        let solution = mio.search(Silent).unwrap();
        assert_eq!(solution.covered_targets, vec![0]);
        assert_eq!(solution.report.covered_by_seeded_tests, 1);
        assert_eq!(solution.individuals.len(), 1);
        assert_eq!(solution.individuals[0].individual.sample_type, SampleType::Seeded);
    }

    #[test]
    fn test_random_algorithm_samples_only() {
        let mut random = RandomAlgorithm::new(config(20), OneCallSampler::new(), ValueFitness { calls: 0 }).unwrap();
        random.search(Silent).unwrap();
        assert_eq!(random.time().evaluated_individuals(), 20);
        assert!(random.archive().best_distance(0).is_some());
    }

    #[test]
    fn test_no_fitness_information_still_uses_budget() {
        let mut mio = MioAlgorithm::new(config(20), OneCallSampler::new(), SparseFitness::new(2)).unwrap();
        mio.search(Silent).unwrap();

        assert_eq!(mio.time().evaluated_individuals(), 20);
        assert_eq!(mio.fitness.calls, 20);
        assert_eq!(mio.fitness.answered, 10);
        assert!(mio.archive().best_distance(0).is_some());
        assert!(mio.archive().population_size(0) <= mio.fitness.answered);
    }

    #[test]
    fn test_individuals_without_fitness_are_not_archived() {
        // period larger than the budget: every call returns None
        let mut mio = MioAlgorithm::new(config(10), OneCallSampler::new(), SparseFitness::new(100)).unwrap();
        let solution = mio.search(Silent).unwrap();

        assert_eq!(mio.time().evaluated_individuals(), 10);
        assert_eq!(mio.fitness.calls, 10);
        assert!(mio.archive().is_empty());
        assert!(solution.individuals.is_empty());
        assert!(solution.covered_targets.is_empty());

        let mut random = RandomAlgorithm::new(config(10), OneCallSampler::new(), SparseFitness::new(100)).unwrap();
        random.search(Silent).unwrap();
        assert_eq!(random.time().evaluated_individuals(), 10);
        assert!(random.archive().is_empty());
    }

    #[test]
    fn test_warnings_belong_to_one_run() {
        let mut sampler = OneCallSampler::new();
        let mut rng = Randomness::with_seed(3);
        let mut seed = sampler.sample_at_random(&mut rng).unwrap();
        seed.sample_type = SampleType::Seeded;
        seed.arena_mut().report_anomaly("cannot bind x (Integer) with y (Boolean)".to_string());
        sampler.seeds.push(seed);

        let mut mio = MioAlgorithm::new(config(5), sampler, ValueFitness { calls: 0 }).unwrap();
        mio.search(Silent).unwrap();
        assert_eq!(mio.warnings().len(), 1);

        let fresh = MioAlgorithm::new(config(5), OneCallSampler::new(), ValueFitness { calls: 0 }).unwrap();
        assert!(fresh.warnings().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut bad = config(10);
        bad.search.archive_target_limit = 0;
        assert!(MioAlgorithm::new(bad, OneCallSampler::new(), ValueFitness { calls: 0 }).is_err());
    }
}
