pub mod error;
pub mod ledger;
pub mod metrics;
pub mod normalizer;
pub mod orchestrator;
pub mod providers;
pub mod query;
pub mod reasoning;

pub use error::*;
pub use ledger::*;
pub use metrics::*;
pub use normalizer::*;
pub use orchestrator::*;
pub use providers::*;
pub use query::*;
pub use reasoning::*;
