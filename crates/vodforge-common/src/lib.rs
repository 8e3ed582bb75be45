//! Vodforge-Common: shared types, IDs, and utilities.
//!
//! This crate provides the pieces every other vodforge crate agrees on:
//!
//! - **Typed IDs**: type-safe UUID wrapper for jobs
//! - **Core Types**: resolutions, chunk manifests, segment results, playlists
//! - **Storage Keys**: the persisted blob layout for a job
//! - **Error Handling**: the pipeline error taxonomy and result alias
//!
//! # Examples
//!
//! ```
//! use vodforge_common::{JobId, Resolution, Error, Result};
//! use vodforge_common::keys;
//!
//! let job_id = JobId::new();
//! let key = keys::segment(job_id, Resolution::P720, 3);
//! assert!(key.ends_with("outputs/720p/segments/seg_0003"));
//!
//! fn example() -> Result<()> {
//!     Err(Error::config("unknown resolution"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod keys;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
