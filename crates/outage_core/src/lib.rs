pub mod automation;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod integrations;
pub mod render;
pub mod repo;
pub mod stage;
pub mod validate;
pub mod workspace;

pub use domain::{Outage, Stage};
pub use error::{AppError, ErrorKind};
pub use repo::{FinishOutcome, OutageRepository};
