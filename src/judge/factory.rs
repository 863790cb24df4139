//! Strategy selection by language pair.

use crate::error::{JudgeError, Result};
use crate::judge::cpp::{CppGrader, CppRunner};
use crate::judge::judger::Judger;
use crate::judge::strategy::{Grader, Runner};
use crate::types::{JudgeConfig, Language, Problem, Solution};
use std::sync::Arc;

/// Build a judger for `(solution.language, problem.checker_language)`.
/// Only the C++ solution / C++ checker pair is wired; anything else yields
/// no judger.
pub fn judger_for(
    config: JudgeConfig,
    problem: Arc<Problem>,
    solution: Arc<Solution>,
) -> Result<Judger> {
    let runner: Box<dyn Runner> = match solution.language {
        Language::Cpp => Box::new(CppRunner::new(problem.clone(), solution.clone())),
        other => return Err(JudgeError::Unsupported(other, problem.checker_language)),
    };

    let grader: Box<dyn Grader> = match problem.checker_language {
        Language::Cpp => Box::new(CppGrader::new(problem.clone(), solution.clone())),
        other => return Err(JudgeError::Unsupported(solution.language, other)),
    };

    Ok(Judger::new(config, problem, solution, runner, grader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TestCase;
    use std::path::PathBuf;

    fn problem(checker_language: Language) -> Arc<Problem> {
        Arc::new(Problem {
            id: "p1".to_string(),
            name: "demo".to_string(),
            checker_path: PathBuf::from("/nonexistent/checker"),
            checker_language,
            test_cases: vec![TestCase {
                id: 0,
                data_path: PathBuf::from("/nonexistent/0.in"),
                answer_path: PathBuf::from("/nonexistent/0.ans"),
                time_limit_ms: 1000,
                mem_limit_bytes: 64 * 1024 * 1024,
                score: 100,
            }],
            score: 100,
            difficulty: 1,
        })
    }

    fn solution(language: Language) -> Arc<Solution> {
        Arc::new(Solution {
            id: "s1".to_string(),
            text_path: PathBuf::from("/nonexistent/s1.cc"),
            language,
        })
    }

    #[test]
    fn cpp_cpp_pair_is_wired() {
        let judger = judger_for(
            JudgeConfig::default(),
            problem(Language::Cpp),
            solution(Language::Cpp),
        );
        assert!(judger.is_ok());
    }

    #[test]
    fn unknown_pairs_yield_no_judger() {
        for (solution_language, checker_language) in [
            (Language::Python, Language::Cpp),
            (Language::Cpp, Language::Python),
            (Language::Java, Language::Internal),
        ] {
            let result = judger_for(
                JudgeConfig::default(),
                problem(checker_language),
                solution(solution_language),
            );
            assert!(matches!(result, Err(JudgeError::Unsupported(..))));
        }
    }
}
