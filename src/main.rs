use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use covsearch::config::{AlgorithmKind, AppConfig};
use covsearch::gene::{raw_value, GeneSpec};
use covsearch::rest::{HttpVerb, ParamLocation, RestCall, RestParam, RestSampler};
use covsearch::search::{
    ActionResult, ActionTemplate, ConsoleProgressCallback, FitnessFunction, FitnessValue, Individual,
    MioAlgorithm, RandomAlgorithm, SearchAlgorithm, Solution,
};
use covsearch::types::TargetId;

/// Elements with `size` at or above this value hit a special branch
const LARGE_ELEMENT: f64 = 900.0;

/// In-memory stand-in for a REST service managing `/elements`.
///
/// Each `endpoint status` pair is a target, plus a branch on the size of
/// created elements. Calls on `/elements/{id}` succeed only when they use the
/// location of an element created earlier in the same test.
#[derive(Default)]
struct SimulatedService {
    targets: HashMap<String, TargetId>,
    results: Vec<ActionResult>,
}

impl SimulatedService {
    fn target(&mut self, description: String) -> TargetId {
        let next = self.targets.len() as TargetId;
        *self.targets.entry(description).or_insert(next)
    }

    fn describe(&self, target: TargetId) -> String {
        self.targets
            .iter()
            .find(|(_, id)| **id == target)
            .map(|(d, _)| d.clone())
            .unwrap_or_else(|| format!("target {}", target))
    }
}

impl FitnessFunction for SimulatedService {
    fn calculate_coverage(&mut self, individual: &Individual) -> Option<FitnessValue> {
        let mut fitness = FitnessValue::new();
        let mut created = 0usize;
        self.results.clear();

        for action in individual.see_actions() {
            let call = action.as_rest()?;
            let on_resource = call.path.is_last_element_a_parameter();
            let exists = on_resource && call.location_id.is_some() && created > 0;

            let status: u16 = match (call.verb, on_resource) {
                (HttpVerb::Post, false) => {
                    created += 1;
                    201
                }
                (HttpVerb::Get, false) => 200,
                (HttpVerb::Delete, true) if exists => {
                    created -= 1;
                    204
                }
                (_, true) if exists => 200,
                (_, true) => 404,
                _ => 405,
            };

            fitness.cover_target(self.target(format!("{} {}", action.name(), status)));
            if status == 404 {
                let success = self.target(format!("{} 200", action.name()));
                fitness.update_target(success, 0.5);
            }

            if call.verb == HttpVerb::Post {
                let size = action
                    .see_genes()
                    .first()
                    .and_then(|g| raw_value(individual.arena(), *g).ok())
                    .and_then(|v| v.parse::<f64>().ok());
                if let Some(size) = size {
                    let large = self.target(format!("{} large element", action.name()));
                    fitness.update_target(large, ((LARGE_ELEMENT - size) / LARGE_ELEMENT).max(0.0));
                }
            }

            let location = if call.save_location {
                Some(format!("/elements/{}", created))
            } else {
                None
            };
            self.results.push(ActionResult {
                status_code: Some(status),
                location,
                stopping: false,
            });
        }

        Some(fitness)
    }

    fn take_action_results(&mut self) -> Vec<ActionResult> {
        std::mem::take(&mut self.results)
    }
}

fn catalog() -> anyhow::Result<Vec<ActionTemplate>> {
    let id = || vec![(RestParam::new("id", ParamLocation::Path), GeneSpec::long("id", 0, i64::MAX))];
    Ok(vec![
        RestCall::template(
            HttpVerb::Post,
            "/elements",
            vec![(RestParam::new("size", ParamLocation::Body), GeneSpec::integer("size", 0, 1000))],
        )?,
        RestCall::template(HttpVerb::Get, "/elements", Vec::new())?,
        RestCall::template(HttpVerb::Get, "/elements/{id}", id())?,
        RestCall::template(HttpVerb::Patch, "/elements/{id}", id())?,
        RestCall::template(HttpVerb::Delete, "/elements/{id}", id())?,
    ])
}

fn print_solution(solution: &Solution, service: &SimulatedService) -> anyhow::Result<()> {
    println!("\nCovered targets:");
    let mut covered: Vec<String> = solution.covered_targets.iter().map(|t| service.describe(*t)).collect();
    covered.sort();
    for c in covered {
        println!("  {}", c);
    }

    println!("\nGenerated tests: {}", solution.individuals.len());
    for (i, evaluated) in solution.individuals.iter().enumerate() {
        println!("Test {} ({:?})", i + 1, evaluated.individual.sample_type);
        for action in evaluated.individual.see_actions() {
            if let Some(call) = action.as_rest() {
                let path = call.resolved_path(evaluated.individual.arena(), action)?;
                println!("  {} {}", call.verb, path);
            }
        }
    }

    println!("\n{}", serde_json::to_string_pretty(&solution.report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Configure logging (optional)
    env_logger::init();

    let config_path = std::env::args().nth(1);
    let config = AppConfig::load_layered(config_path.as_deref().map(Path::new))
        .context("Failed to load configuration")?;

    let sampler = RestSampler::new(catalog()?, config.sampling.clone())?;
    let service = SimulatedService::default();

    match config.search.algorithm {
        AlgorithmKind::Mio => {
            let mut mio = MioAlgorithm::new(config, sampler, service)?;
            let solution = mio.search(ConsoleProgressCallback)?;
            print_solution(&solution, mio.fitness())
        }
        AlgorithmKind::Random => {
            let mut random = RandomAlgorithm::new(config, sampler, service)?;
            let solution = random.search(ConsoleProgressCallback)?;
            print_solution(&solution, random.fitness())
        }
    }
}
