pub mod chunker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod highlight;
pub mod outline;
pub mod prompt;
pub mod provider;
pub mod recovery;
pub mod repair;
pub mod report;
pub mod review;
pub mod store;
pub mod types;

pub use types::*;
