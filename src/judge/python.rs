//! Python strategy stubs.
//!
//! Interpreted submissions need an `Interpret` node in place of the compile
//! step; none of that is wired yet, so the factory never hands these out and
//! preparing one is an explicit error.

use crate::error::{JudgeError, Result};
use crate::judge::strategy::{Grader, Runner};
use crate::sandbox::{NodeId, Sandbox};
use crate::types::{Language, TestCaseResult};

pub struct PythonRunner;

impl Runner for PythonRunner {
    fn language(&self) -> Language {
        Language::Python
    }

    fn prepare(&mut self, _sandbox: &mut Sandbox, _runs: &mut Vec<NodeId>) -> Result<()> {
        Err(JudgeError::Config(
            "python runner is not implemented".to_string(),
        ))
    }

    fn results(&self, _sandbox: &Sandbox) -> Vec<TestCaseResult> {
        Vec::new()
    }
}

pub struct PythonGrader;

impl Grader for PythonGrader {
    fn language(&self) -> Language {
        Language::Python
    }

    fn prepare(&mut self, _sandbox: &mut Sandbox, _runs: &[NodeId]) -> Result<()> {
        Err(JudgeError::Config(
            "python grader is not implemented".to_string(),
        ))
    }

    fn results(&self, _sandbox: &Sandbox) -> Vec<TestCaseResult> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_stubs_refuse_to_prepare() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sandbox = Sandbox::create(tmp.path().join("stage")).unwrap();
        let mut runs = Vec::new();

        assert!(PythonRunner.prepare(&mut sandbox, &mut runs).is_err());
        assert!(PythonGrader.prepare(&mut sandbox, &runs).is_err());
        assert!(PythonRunner.results(&sandbox).is_empty());
    }
}
