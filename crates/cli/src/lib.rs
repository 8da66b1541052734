//! Quorum CLI — chat REPL, replay, and config inspection around the
//! engine.

pub mod bootstrap;
pub mod cli;
