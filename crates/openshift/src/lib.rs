//! `oc`-backed platform runner for Subatomic.
//!
//! Implements [`provision::PlatformRunner`] by shelling out to the
//! OpenShift CLI. All command-output inspection lives here, at the
//! platform boundary: rollout text is parsed into the structured
//! [`provision::RolloutStatus`] before it ever reaches the core.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod rollout;
pub mod runner;

pub use cli::{CommandOutput, OcCli};
pub use runner::OcRunner;
