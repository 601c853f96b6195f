//! Shipyard Core
//!
//! Core types shared by every Shipyard crate.
//!
//! This crate contains:
//! - Domain types: the hand-off values passed between pipeline stages
//!   (artifact, configuration, image, deployment, endpoint) and the run record
//! - Errors: the stage error taxonomy recorded against a failed run

pub mod domain;
pub mod error;

pub use error::{ErrorKind, StageError};
