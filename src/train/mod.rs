pub use config::*;
pub use metrics::*;
pub use model::*;
pub use schedule::*;
pub use trainer::*;

pub mod config;
pub mod metrics;
pub mod model;
pub mod schedule;
pub mod trainer;
