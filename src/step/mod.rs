//! Step identity and branch filtering
//!
//! Everything here is derived from a step's definition alone: its slug,
//! its cache key and object keys, and whether it runs on a given branch.

pub mod branch;
pub mod key;
mod slug;

pub use branch::{disposition, resolve_current_branch, Disposition};
pub use key::{archive_paths, canonical_definition, resolve_key, StepKeys};
pub use slug::slugify;
