pub mod call;
pub mod path;
pub mod sampler;
pub mod verb;

pub use call::{ParamLocation, RestCall, RestParam};
pub use path::RestPath;
pub use sampler::RestSampler;
pub use verb::HttpVerb;
