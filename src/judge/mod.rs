//! Judging pipeline: strategies, orchestrator, and factory.
//!
//! The sandbox stays language-agnostic; runners and graders define how a
//! submission is compiled, run, and checked for each language pair.

pub mod cpp;
pub mod factory;
pub mod judger;
pub mod python;
pub mod strategy;

pub use factory::judger_for;
pub use judger::Judger;
pub use strategy::{Grader, Runner};
