//! Scripted client runs against a target.
//!
//! A [`Scenario`] is loaded from JSON, optionally pointed at another target
//! with [`Scenario::set_target`], and executed by a [`Runner`], which returns
//! a [`RunReport`].

pub mod descriptor;
pub mod runner;
pub mod template;

pub use descriptor::{Emit, Engine, Expected, Response, Scenario, ScenarioEntry, ScriptConfig, Step};
pub use runner::{RunReport, Runner};
