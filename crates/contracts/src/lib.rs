//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Feed Model
//! - `Event::index` is the feed position and never decreases within a stream
//! - Frames group events sharing one index; `{}` frames are heartbeats

mod config;
pub mod duration;
mod error;
mod event;
mod handler;
mod labels;
mod provider;
mod topic;

pub use config::*;
pub use error::*;
pub use event::*;
pub use handler::{CallbackHandler, EventHandler, HandlerClosed, LocalEventHandler};
pub use labels::LabelSet;
pub use provider::*;
pub use topic::*;
