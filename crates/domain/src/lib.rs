//! Shared contracts for the Quorum cognitive turn orchestrator.
//!
//! This crate holds the typed vocabulary every other crate speaks:
//! the event envelope and its closed payload schema, claims and agent
//! outputs, the council decision, stance and modulator state, sensor
//! names, goals, configuration, and the shared error type. It performs
//! no I/O.

pub mod agent;
pub mod claim;
pub mod config;
pub mod council;
pub mod error;
pub mod event;
pub mod goal;
pub mod model;
pub mod modulators;
pub mod sensors;
pub mod stance;

pub use error::{Error, Result};
