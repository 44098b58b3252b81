pub mod traits;
pub mod search;
pub mod sampling;
pub mod mutation;
pub mod manager;

pub use manager::{AppConfig, ConfigManager};
pub use mutation::MutationConfig;
pub use sampling::SamplingConfig;
pub use search::{AlgorithmKind, SearchConfig};
pub use traits::{ConfigManifest, ConfigSection, FieldManifest};
