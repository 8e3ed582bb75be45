//! The conditional-DAG workflow core.
//!
//! A job flows through: options resolution → chunk planning → transcode
//! fan-out → playlist assembly → cleanup, with thumbnail and chapter
//! branches forked alongside the mandatory track. The coordinator owns the
//! state machine; everything else here is a stage it drives.

pub mod aggregate;
pub mod assemble;
pub mod chunking;
pub mod cleanup;
pub mod context;
pub mod coordinator;
pub mod enhance;
pub mod fanout;

pub use context::{JobContext, TaskSpecs};
pub use coordinator::Coordinator;
