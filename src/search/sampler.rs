use super::action::ActionTemplate;
use super::fitness::EvaluatedIndividual;
use super::individual::Individual;
use super::randomness::Randomness;
use crate::error::Result;

/// Source of new individuals
pub trait Sampler {
    /// Next individual to evaluate: seeded ones first, then smart or random
    fn sample(&mut self, rng: &mut Randomness) -> Result<Individual>;

    /// Individual of random length made of random actions
    fn sample_at_random(&mut self, rng: &mut Randomness) -> Result<Individual>;

    /// Individual built with domain heuristics
    fn smart_sample(&mut self, rng: &mut Randomness) -> Result<Individual>;

    /// One random action template, without authentication with probability
    /// `no_auth_probability`
    fn sample_random_action(&mut self, no_auth_probability: f64, rng: &mut Randomness) -> Result<ActionTemplate>;

    fn has_seeded_individuals(&self) -> bool;

    /// True right after the last seeded individual has been handed out
    fn is_last_seeded_individual(&self) -> bool;

    /// Result of evaluating a sampled individual
    fn feedback(&mut self, _evaluated: &EvaluatedIndividual) {}
}
