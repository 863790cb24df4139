//! Strategy seams for language-specific judging.
//!
//! A runner stages the submission and enqueues its compile/run nodes; a
//! grader attaches one checker node under every run node. Both interpret the
//! executed nodes into per-case results after the sandbox has run.

use crate::error::Result;
use crate::sandbox::{NodeId, Sandbox};
use crate::types::{Language, TestCaseResult};

/// Builds and interprets the compile/run subtree for one language.
pub trait Runner: Send {
    fn language(&self) -> Language;

    /// Stage sources and inputs, enqueue the compile node and one run node
    /// per test case. Pushes the run node handles into `runs` in case order.
    fn prepare(&mut self, sandbox: &mut Sandbox, runs: &mut Vec<NodeId>) -> Result<()>;

    /// Interpret the executed nodes. Returns one result per test case.
    fn results(&self, sandbox: &Sandbox) -> Vec<TestCaseResult>;
}

/// Attaches and interprets checker nodes for one checker language.
pub trait Grader: Send {
    fn language(&self) -> Language;

    /// Stage the checker and enqueue one checker node under every run node.
    fn prepare(&mut self, sandbox: &mut Sandbox, runs: &[NodeId]) -> Result<()>;

    /// Interpret the executed checker nodes. Returns one result per test case.
    fn results(&self, sandbox: &Sandbox) -> Vec<TestCaseResult>;
}
