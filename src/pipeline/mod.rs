// Data processing pipeline: cleaning, queries, EDA tables and persistence

pub mod clean;
pub mod eda;
pub mod persist;
pub mod queries;
pub mod runner;

pub use runner::{ArtifactFailure, FailureStage, Pipeline, RunReport};
