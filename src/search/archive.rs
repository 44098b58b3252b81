use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::fitness::EvaluatedIndividual;
use super::randomness::Randomness;
use crate::types::TargetId;

/// Archived individual and its distance to one target
#[derive(Debug, Clone)]
struct Entry {
    individual: Arc<EvaluatedIndividual>,
    distance: f64,
}

impl Entry {
    fn size(&self) -> usize {
        self.individual.size()
    }

    /// Strictly better: smaller distance, or same distance and shorter
    fn is_better_than(&self, other: &Entry) -> bool {
        self.distance < other.distance || (self.distance == other.distance && self.size() < other.size())
    }
}

/// Best individuals found so far, per target.
///
/// A covered target keeps exactly one individual, replaced only by a shorter
/// one that also covers it. An open target keeps up to `target_limit`
/// individuals sorted best first; ties keep the incumbent ahead. Entries are
/// never removed, so the best distance of a target never increases.
#[derive(Debug, Clone)]
pub struct Archive {
    populations: BTreeMap<TargetId, Vec<Entry>>,
    /// Times each target was picked by `sample_individual` since its last improvement
    sampling_counters: BTreeMap<TargetId, u32>,
    target_limit: usize,
    covered_by_seeded: BTreeSet<TargetId>,
}

/// State of one target in an [`ArchiveReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub id: TargetId,
    pub best_distance: f64,
    pub population: usize,
    pub sampling_counter: u32,
}

/// Owned view of the archive, for reporting outside the search loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub covered_targets: usize,
    pub open_targets: usize,
    pub covered_by_seeded_tests: usize,
    pub targets: Vec<TargetReport>,
}

impl Archive {
    pub fn new(target_limit: usize) -> Self {
        Self {
            populations: BTreeMap::new(),
            sampling_counters: BTreeMap::new(),
            target_limit: target_limit.max(1),
            covered_by_seeded: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.populations.is_empty()
    }

    fn is_covered(population: &[Entry]) -> bool {
        population.first().map(|e| e.distance == 0.0).unwrap_or(false)
    }

    /// Store `evaluated` for every target it improves. Returns true if it
    /// was stored for at least one target.
    pub fn add_if_needed(&mut self, evaluated: EvaluatedIndividual) -> bool {
        let shared = Arc::new(evaluated);
        let mut added = false;

        let targets: Vec<(TargetId, f64)> = shared.fitness.targets().collect();
        for (target, distance) in targets {
            let candidate = Entry {
                individual: Arc::clone(&shared),
                distance,
            };
            let population = self.populations.entry(target).or_default();

            if population.is_empty() {
                population.push(candidate);
                self.sampling_counters.insert(target, 0);
                added = true;
                continue;
            }

            if Self::is_covered(population) {
                // covered targets only accept shorter covering individuals
                if distance == 0.0 && candidate.size() < population[0].size() {
                    trace!("Shorter individual for covered target {}", target);
                    population[0] = candidate;
                    added = true;
                }
                continue;
            }

            if distance == 0.0 {
                debug!("Target {} covered", target);
                population.clear();
                population.push(candidate);
                self.sampling_counters.insert(target, 0);
                added = true;
                continue;
            }

            let improves_best = candidate.is_better_than(&population[0]);
            let full = population.len() >= self.target_limit;
            let worst_is_worse = population
                .last()
                .map(|w| candidate.is_better_than(w))
                .unwrap_or(true);
            if full && !worst_is_worse {
                continue;
            }

            // insert after every entry at least as good, so ties keep the incumbent first
            let position = population
                .iter()
                .position(|e| candidate.is_better_than(e))
                .unwrap_or(population.len());
            population.insert(position, candidate);
            population.truncate(self.target_limit);
            if improves_best {
                self.sampling_counters.insert(target, 0);
            }
            added = true;
        }

        added
    }

    /// Parent for the next mutation.
    ///
    /// Among open targets the least sampled one is chosen (ties at random)
    /// and one of its individuals returned; when every target is covered a
    /// random covered target is used.
    pub fn sample_individual(&mut self, rng: &mut Randomness) -> Option<Arc<EvaluatedIndividual>> {
        let open: Vec<TargetId> = self
            .populations
            .iter()
            .filter(|(_, p)| !Self::is_covered(p))
            .map(|(t, _)| *t)
            .collect();

        let target = if open.is_empty() {
            let covered: Vec<TargetId> = self.populations.keys().copied().collect();
            *rng.choose(&covered)?
        } else {
            let min = open
                .iter()
                .map(|t| self.sampling_counters.get(t).copied().unwrap_or(0))
                .min()?;
            let least_sampled: Vec<TargetId> = open
                .into_iter()
                .filter(|t| self.sampling_counters.get(t).copied().unwrap_or(0) == min)
                .collect();
            *rng.choose(&least_sampled)?
        };

        *self.sampling_counters.entry(target).or_insert(0) += 1;
        let population = self.populations.get(&target)?;
        rng.choose(population).map(|e| Arc::clone(&e.individual))
    }

    pub fn covered_targets(&self) -> Vec<TargetId> {
        self.populations
            .iter()
            .filter(|(_, p)| Self::is_covered(p))
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn number_of_covered_targets(&self) -> usize {
        self.populations.values().filter(|p| Self::is_covered(p)).count()
    }

    /// Best distance reached so far for `target`
    pub fn best_distance(&self, target: TargetId) -> Option<f64> {
        self.populations
            .get(&target)
            .and_then(|p| p.first())
            .map(|e| e.distance)
    }

    /// Best individual stored for `target`
    pub fn best_for(&self, target: TargetId) -> Option<Arc<EvaluatedIndividual>> {
        self.populations
            .get(&target)
            .and_then(|p| p.first())
            .map(|e| Arc::clone(&e.individual))
    }

    pub fn population_size(&self, target: TargetId) -> usize {
        self.populations.get(&target).map(|p| p.len()).unwrap_or(0)
    }

    /// Remember which targets are covered once the seeded tests have run
    pub fn archive_covered_statistics_by_seeded_tests(&mut self) {
        self.covered_by_seeded = self.covered_targets().into_iter().collect();
        debug!("{} targets covered by seeded tests", self.covered_by_seeded.len());
    }

    pub fn covered_by_seeded_tests(&self) -> &BTreeSet<TargetId> {
        &self.covered_by_seeded
    }

    /// Small set of individuals covering every covered target (greedy set cover)
    pub fn extract_solution(&self) -> Vec<Arc<EvaluatedIndividual>> {
        let mut candidates: Vec<Arc<EvaluatedIndividual>> = Vec::new();
        for population in self.populations.values() {
            if let Some(best) = population.first().filter(|e| e.distance == 0.0) {
                if !candidates.iter().any(|c| Arc::ptr_eq(c, &best.individual)) {
                    candidates.push(Arc::clone(&best.individual));
                }
            }
        }

        let mut uncovered: BTreeSet<TargetId> = self.covered_targets().into_iter().collect();
        let mut solution = Vec::new();
        while !uncovered.is_empty() {
            let best = candidates
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let gain = c
                        .fitness
                        .covered_targets()
                        .iter()
                        .filter(|t| uncovered.contains(t))
                        .count();
                    (i, gain, c.size())
                })
                .filter(|(_, gain, _)| *gain > 0)
                .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));

            let (index, _, _) = match best {
                Some(b) => b,
                None => break,
            };
            let chosen = candidates.swap_remove(index);
            for t in chosen.fitness.covered_targets() {
                uncovered.remove(&t);
            }
            solution.push(chosen);
        }
        solution
    }

    pub fn snapshot(&self) -> ArchiveReport {
        let targets: Vec<TargetReport> = self
            .populations
            .iter()
            .map(|(t, p)| TargetReport {
                id: *t,
                best_distance: p.first().map(|e| e.distance).unwrap_or(f64::MAX),
                population: p.len(),
                sampling_counter: self.sampling_counters.get(t).copied().unwrap_or(0),
            })
            .collect();
        let covered = targets.iter().filter(|t| t.best_distance == 0.0).count();

        ArchiveReport {
            covered_targets: covered,
            open_targets: targets.len() - covered,
            covered_by_seeded_tests: self.covered_by_seeded.len(),
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::GeneSpec;
    use crate::rest::{HttpVerb, RestCall};
    use crate::search::fitness::FitnessValue;
    use crate::search::individual::Individual;
    use crate::types::SampleType;

    fn evaluated(size: usize, targets: &[(TargetId, f64)]) -> EvaluatedIndividual {
        let template = RestCall::template(HttpVerb::Get, "/a", Vec::new()).unwrap();
        let mut ind = Individual::new(SampleType::Random);
        for _ in 0..size {
            ind.add_action(&template, None).unwrap();
        }
        let mut fitness = FitnessValue::new();
        for (t, d) in targets {
            fitness.update_target(*t, *d);
        }
        EvaluatedIndividual::new(ind, fitness, Vec::new())
    }

    #[test]
    fn test_covered_beats_not_covered() {
        let mut archive = Archive::new(3);
        assert!(archive.add_if_needed(evaluated(1, &[(1, 0.5)])));
        assert!(archive.add_if_needed(evaluated(3, &[(1, 0.0)])));
        assert_eq!(archive.covered_targets(), vec![1]);
        assert_eq!(archive.population_size(1), 1);

        // not covering does not replace a covered target
        assert!(!archive.add_if_needed(evaluated(1, &[(1, 0.1)])));
        assert_eq!(archive.best_for(1).unwrap().size(), 3);
    }

    #[test]
    fn test_shorter_wins_among_covered_and_ties_keep_incumbent() {
        let mut archive = Archive::new(3);
        let first = evaluated(3, &[(1, 0.0)]);
        let first_id = first.individual.id();
        archive.add_if_needed(first);

        assert!(!archive.add_if_needed(evaluated(3, &[(1, 0.0)])));
        assert_eq!(archive.best_for(1).unwrap().individual.id(), first_id);

        assert!(archive.add_if_needed(evaluated(2, &[(1, 0.0)])));
        assert_eq!(archive.best_for(1).unwrap().size(), 2);
    }

    #[test]
    fn test_open_target_population_is_bounded() {
        let mut archive = Archive::new(2);
        archive.add_if_needed(evaluated(1, &[(1, 0.9)]));
        archive.add_if_needed(evaluated(1, &[(1, 0.5)]));
        assert_eq!(archive.population_size(1), 2);

        // worse than everything in a full population
        assert!(!archive.add_if_needed(evaluated(1, &[(1, 0.95)])));
        assert!(archive.add_if_needed(evaluated(1, &[(1, 0.7)])));
        assert_eq!(archive.population_size(1), 2);
        assert_eq!(archive.best_distance(1), Some(0.5));

        // equal distance: the shorter one goes first
        archive.add_if_needed(evaluated(2, &[(2, 0.4)]));
        archive.add_if_needed(evaluated(1, &[(2, 0.4)]));
        assert_eq!(archive.best_for(2).unwrap().size(), 1);
    }

    #[test]
    fn test_best_distance_is_monotonic() {
        let mut rng = Randomness::with_seed(11);
        let mut archive = Archive::new(3);
        let mut best = f64::MAX;
        for _ in 0..300 {
            let d = if rng.next_bool_with(0.05) { 0.0 } else { rng.next_double() };
            let size = rng.next_int(1, 5) as usize;
            archive.add_if_needed(evaluated(size, &[(7, d)]));
            let current = archive.best_distance(7).unwrap();
            assert!(current <= best);
            best = current;
        }
    }

    #[test]
    fn test_sample_prefers_least_sampled_open_target() {
        let mut rng = Randomness::with_seed(2);
        let mut archive = Archive::new(3);
        archive.add_if_needed(evaluated(1, &[(1, 0.3)]));
        archive.add_if_needed(evaluated(2, &[(2, 0.3)]));
        archive.add_if_needed(evaluated(3, &[(3, 0.0)]));

        let mut sizes = Vec::new();
        for _ in 0..4 {
            sizes.push(archive.sample_individual(&mut rng).unwrap().size());
        }
        sizes.sort();
        // open targets alternate, the covered one is never picked
        assert_eq!(sizes, vec![1, 1, 2, 2]);
    }

    #[test]
    fn test_sample_covered_when_all_covered() {
        let mut rng = Randomness::with_seed(2);
        let mut archive = Archive::new(3);
        assert!(archive.sample_individual(&mut rng).is_none());
        archive.add_if_needed(evaluated(2, &[(1, 0.0)]));
        assert_eq!(archive.sample_individual(&mut rng).unwrap().size(), 2);
    }

    #[test]
    fn test_extract_solution_is_minimal_cover() {
        let mut archive = Archive::new(3);
        archive.add_if_needed(evaluated(1, &[(1, 0.0)]));
        archive.add_if_needed(evaluated(1, &[(2, 0.0)]));
        archive.add_if_needed(evaluated(2, &[(1, 0.0), (2, 0.0), (3, 0.0)]));
        archive.add_if_needed(evaluated(1, &[(4, 0.5)]));

        let solution = archive.extract_solution();
        let mut covered: Vec<TargetId> = solution.iter().flat_map(|s| s.fitness.covered_targets()).collect();
        covered.sort();
        covered.dedup();
        assert_eq!(covered, vec![1, 2, 3]);
        assert!(solution.len() <= 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut archive = Archive::new(3);
        archive.add_if_needed(evaluated(1, &[(1, 0.0), (2, 0.4)]));
        archive.archive_covered_statistics_by_seeded_tests();

        let report = archive.snapshot();
        assert_eq!(report.covered_targets, 1);
        assert_eq!(report.open_targets, 1);
        assert_eq!(report.covered_by_seeded_tests, 1);
        let json = serde_json::to_string(&report).unwrap();
        let back: ArchiveReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_covering_individual_is_stored_with_its_genes() {
        let template = RestCall::template(
            HttpVerb::Post,
            "/a",
            vec![(
                crate::rest::RestParam::new("body", crate::rest::ParamLocation::Body),
                GeneSpec::integer("body", 0, 3),
            )],
        )
        .unwrap();
        let mut ind = Individual::new(SampleType::Random);
        ind.add_action(&template, None).unwrap();
        let body = ind.see_actions()[0].see_genes()[0];
        ind.arena_mut().set_int_value(body, 2).unwrap();
        let mut fitness = FitnessValue::new();
        fitness.cover_target(9);

        let mut archive = Archive::new(1);
        assert!(archive.add_if_needed(EvaluatedIndividual::new(ind, fitness, Vec::new())));
        assert_eq!(archive.covered_targets(), vec![9]);

        let stored = &archive.best_for(9).unwrap().individual;
        assert_eq!(stored.see_genes(crate::search::individual::GeneFilter::All), vec![body]);
        assert_eq!(stored.arena().int_value(body).unwrap(), 2);
    }
}
