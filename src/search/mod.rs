pub mod action;
pub mod algorithm;
pub mod apc;
pub mod archive;
pub mod budget;
pub mod fitness;
pub mod impact;
pub mod individual;
pub mod mutation_weight;
pub mod mutator;
pub mod progress;
pub mod randomness;
pub mod sampler;

pub use action::{Action, ActionId, ActionKind, ActionTemplate};
pub use algorithm::{MioAlgorithm, RandomAlgorithm, SearchAlgorithm, Solution};
pub use apc::AdaptiveParameterControl;
pub use archive::{Archive, ArchiveReport, TargetReport};
pub use budget::SearchTimeController;
pub use fitness::{ActionResult, EvaluatedIndividual, FitnessFunction, FitnessValue};
pub use impact::{GeneImpact, ImpactTracker};
pub use individual::{GeneFilter, Individual, Lineage, ROOT_GENE_NAME};
pub use mutation_weight::MutationWeightControl;
pub use mutator::Mutator;
pub use progress::{ConsoleProgressCallback, IpcProgressCallback, ProgressCallback, ProgressMessage};
pub use randomness::Randomness;
pub use sampler::Sampler;
