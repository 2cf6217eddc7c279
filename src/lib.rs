//! stepcache - CI build-step caching
//!
//! Decides whether a build step's previous outputs can be restored instead
//! of running it again, based on a content manifest of its declared inputs,
//! a cache key derived from its definition and the current branch.

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod runner;
pub mod step;
pub mod store;
pub mod ui;

pub use error::{StepCacheError, StepCacheResult};
