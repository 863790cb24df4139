//! One judging run: sandbox creation, strategy preparation, execution, and
//! convergence of runner and grader results into a final report.

use crate::error::Result;
use crate::judge::strategy::{Grader, Runner};
use crate::sandbox::Sandbox;
use crate::types::{JudgeConfig, JudgeReport, Problem, Solution, TestCaseResult, Verdict};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;

pub struct Judger {
    config: JudgeConfig,
    problem: Arc<Problem>,
    solution: Arc<Solution>,
    runner: Box<dyn Runner>,
    grader: Box<dyn Grader>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl Judger {
    pub fn new(
        config: JudgeConfig,
        problem: Arc<Problem>,
        solution: Arc<Solution>,
        runner: Box<dyn Runner>,
        grader: Box<dyn Grader>,
    ) -> Self {
        let (done_tx, done_rx) = bounded(1);
        Self {
            config,
            problem,
            solution,
            runner,
            grader,
            done_tx,
            done_rx,
        }
    }

    /// One-shot completion signal for callers awaiting this run from another
    /// thread; fires whether the run succeeded or failed.
    pub fn completion(&self) -> Receiver<()> {
        self.done_rx.clone()
    }

    /// Run the full pipeline. Infrastructure faults come back as `Err`; every
    /// submission-side outcome is encoded in the report.
    pub fn judge(&mut self) -> Result<JudgeReport> {
        let outcome = self.run_pipeline();
        let _ = self.done_tx.try_send(());
        if let Err(e) = &outcome {
            log::error!(
                "judging solution {} on problem {} failed: {}",
                self.solution.id,
                self.problem.id,
                e
            );
        }
        outcome
    }

    fn run_pipeline(&mut self) -> Result<JudgeReport> {
        let stage = self.config.stage_root.join(format!(
            "{}_{}",
            self.solution.language.tag(),
            self.solution.id
        ));
        let mut sandbox = Sandbox::create(stage)?;

        let mut runs = Vec::new();
        self.runner.prepare(&mut sandbox, &mut runs)?;
        self.grader.prepare(&mut sandbox, &runs)?;

        sandbox.run();

        let runner_results = self.runner.results(&sandbox);
        let grader_results = self.grader.results(&sandbox);
        Ok(converge(
            &self.problem,
            &self.solution,
            runner_results,
            grader_results,
        ))
    }
}

/// Fold runner and grader results into the final report.
///
/// For every case the runner judged accepted, the grader's verdict, info and
/// score replace it; all other runner verdicts stand. The overall state is
/// `Ce` as soon as any case is `Ce`, `Mul` when several distinct non-accepted
/// states appear, otherwise the shared non-accepted state or `Ac`.
pub(crate) fn converge(
    problem: &Problem,
    solution: &Solution,
    runner: Vec<TestCaseResult>,
    grader: Vec<TestCaseResult>,
) -> JudgeReport {
    assert_eq!(runner.len(), grader.len());

    let mut cases = runner;
    for (case, graded) in cases.iter_mut().zip(grader) {
        if case.verdict == Verdict::Ac {
            case.verdict = graded.verdict;
            case.info = graded.info;
            case.score = graded.score;
        }
    }

    let mut overall = Verdict::Ac;
    let mut info = String::new();
    let mut total = 0;

    for case in &cases {
        if case.verdict != Verdict::Ac {
            // Compile errors apply to the submission as a whole.
            if case.verdict == Verdict::Ce {
                overall = Verdict::Ce;
                info = case.info.clone();
                break;
            }
            if overall != Verdict::Ac && overall != case.verdict {
                overall = Verdict::Mul;
            } else {
                overall = case.verdict;
            }
        }
        total += case.score;
    }

    JudgeReport {
        cases,
        overall,
        problem_id: problem.id.clone(),
        solution_id: solution.id.clone(),
        score: total,
        info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Language, TestCase};
    use std::path::PathBuf;

    fn problem(case_count: usize) -> Problem {
        Problem {
            id: "p1".to_string(),
            name: "demo".to_string(),
            checker_path: PathBuf::from("/nonexistent/checker"),
            checker_language: Language::Cpp,
            test_cases: (0..case_count)
                .map(|i| TestCase {
                    id: i as u32,
                    data_path: PathBuf::from(format!("/nonexistent/{i}.in")),
                    answer_path: PathBuf::from(format!("/nonexistent/{i}.ans")),
                    time_limit_ms: 1000,
                    mem_limit_bytes: 64 * 1024 * 1024,
                    score: 33,
                })
                .collect(),
            score: 100,
            difficulty: 3,
        }
    }

    fn solution() -> Solution {
        Solution {
            id: "s1".to_string(),
            text_path: PathBuf::from("/nonexistent/s1.cc"),
            language: Language::Cpp,
        }
    }

    fn case(verdict: Verdict, score: i64) -> TestCaseResult {
        TestCaseResult {
            verdict,
            score,
            ..Default::default()
        }
    }

    #[test]
    fn accepted_cases_take_grader_verdict_and_score() {
        let report = converge(
            &problem(2),
            &solution(),
            vec![case(Verdict::Ac, 0), case(Verdict::Ac, 0)],
            vec![case(Verdict::Ac, 33), case(Verdict::Ac, 33)],
        );
        assert_eq!(report.overall, Verdict::Ac);
        assert_eq!(report.score, 66);
        assert!(report.cases.iter().all(|c| c.verdict == Verdict::Ac));
    }

    #[test]
    fn runner_verdicts_shadow_grader_results() {
        let report = converge(
            &problem(2),
            &solution(),
            vec![case(Verdict::Tle, 0), case(Verdict::Ac, 0)],
            vec![case(Verdict::Ac, 33), case(Verdict::Wa, 5)],
        );
        assert_eq!(report.cases[0].verdict, Verdict::Tle);
        assert_eq!(report.cases[1].verdict, Verdict::Wa);
        assert_eq!(report.score, 5);
    }

    #[test]
    fn compile_error_short_circuits_the_fold() {
        let mut first = case(Verdict::Ce, 0);
        first.info = "expected ';' before '}' token".to_string();
        let report = converge(
            &problem(2),
            &solution(),
            vec![first, case(Verdict::Ce, 0)],
            vec![case(Verdict::Ukn, 0), case(Verdict::Ukn, 0)],
        );
        assert_eq!(report.overall, Verdict::Ce);
        assert!(report.info.contains("expected"));
        assert_eq!(report.score, 0);
    }

    #[test]
    fn one_shared_failure_state_becomes_overall() {
        let report = converge(
            &problem(3),
            &solution(),
            vec![
                case(Verdict::Tle, 0),
                case(Verdict::Tle, 0),
                case(Verdict::Tle, 0),
            ],
            vec![
                case(Verdict::Ukn, 0),
                case(Verdict::Ukn, 0),
                case(Verdict::Ukn, 0),
            ],
        );
        assert_eq!(report.overall, Verdict::Tle);
    }

    #[test]
    fn mixed_failure_states_become_multiple() {
        let report = converge(
            &problem(3),
            &solution(),
            vec![
                case(Verdict::Tle, 0),
                case(Verdict::Re, 0),
                case(Verdict::Ac, 0),
            ],
            vec![
                case(Verdict::Ukn, 0),
                case(Verdict::Ukn, 0),
                case(Verdict::Ac, 33),
            ],
        );
        assert_eq!(report.overall, Verdict::Mul);
        assert_eq!(report.score, 33);
    }

    #[test]
    fn partial_credit_sums_across_cases() {
        let report = converge(
            &problem(2),
            &solution(),
            vec![case(Verdict::Ac, 0), case(Verdict::Ac, 0)],
            vec![case(Verdict::Wa, 10), case(Verdict::Ac, 33)],
        );
        assert_eq!(report.overall, Verdict::Wa);
        assert_eq!(report.score, 43);
    }

    #[test]
    fn convergence_is_idempotent_over_accepted_cases() {
        let runner = vec![case(Verdict::Ac, 0), case(Verdict::Re, 0)];
        let grader = vec![case(Verdict::Ac, 33), case(Verdict::Ac, 33)];
        let report = converge(&problem(2), &solution(), runner.clone(), grader.clone());

        // Accepted-by-runner cases equal the grader's result; everything else
        // equals the runner's result, untouched.
        assert_eq!(report.cases[0].verdict, grader[0].verdict);
        assert_eq!(report.cases[0].score, grader[0].score);
        assert_eq!(report.cases[1].verdict, runner[1].verdict);
        assert_eq!(report.cases[1].score, runner[1].score);
    }
}
