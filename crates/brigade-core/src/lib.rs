pub mod actor;
pub mod aggregate;
pub mod allocator;
pub mod cancel;
pub mod config;
pub mod disruption;
pub mod environment;
pub mod error;
pub mod events;
pub mod io;
pub mod paths;
pub mod plan;
pub mod recipe;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod types;

pub use error::{BrigadeError, Result};
pub use runner::{run_all, ScenarioRunner};
