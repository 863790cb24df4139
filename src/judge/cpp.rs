//! C++ runner and grader.
//!
//! The runner stages the submission as `./<id>_solution.cc`, compiles it with
//! a statically linked `g++` build (the produced binary must run inside the
//! chrooted stage), and enqueues one run node per test case. The grader
//! stages the reference checker as `./<id>_judger` and attaches one checker
//! node to every run node.

use crate::error::{JudgeError, Result};
use crate::judge::strategy::{Grader, Runner};
use crate::sandbox::{NodeId, ProgramKind, ProgramNode, ProgramSpec, Sandbox};
use crate::types::{Language, Problem, Solution, TestCaseResult, Verdict};
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::fs;
use std::sync::Arc;

const COMPILE_LOG: &str = "./compile.log";
const COMPILE_MEM_LIMIT: u64 = 1024 * 1024 * 1024;

pub struct CppRunner {
    problem: Arc<Problem>,
    solution: Arc<Solution>,
    program: String,
    compile: Option<NodeId>,
    runs: Vec<NodeId>,
}

impl CppRunner {
    pub fn new(problem: Arc<Problem>, solution: Arc<Solution>) -> Self {
        Self {
            problem,
            solution,
            program: String::new(),
            compile: None,
            runs: Vec::new(),
        }
    }
}

impl Runner for CppRunner {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn prepare(&mut self, sandbox: &mut Sandbox, runs: &mut Vec<NodeId>) -> Result<()> {
        self.program = format!("./{}_solution", self.solution.id);
        let source = format!("{}.cc", self.program);
        sandbox.add_file(&source, &self.solution.text_path)?;

        let compile = sandbox.add_program(ProgramSpec {
            kind: ProgramKind::Compile,
            exe: "g++".to_string(),
            args: vec![
                "-static".to_string(),
                "-O2".to_string(),
                source,
                "-o".to_string(),
                self.program.clone(),
            ],
            stderr: Some(COMPILE_LOG.to_string()),
            mem_limit_bytes: Some(COMPILE_MEM_LIMIT),
            ..Default::default()
        });

        for (index, case) in self.problem.test_cases.iter().enumerate() {
            let input = format!("./{index}.in");
            let output = format!("./{index}.out");
            sandbox.add_file(&input, &case.data_path)?;

            let run = sandbox.add_child(
                compile,
                ProgramSpec {
                    kind: ProgramKind::Program,
                    exe: self.program.clone(),
                    stdin: Some(input),
                    stdout: Some(output),
                    time_limit_ms: Some(case.time_limit_ms),
                    mem_limit_bytes: Some(case.mem_limit_bytes),
                    ..Default::default()
                },
            );
            runs.push(run);
        }

        self.compile = Some(compile);
        self.runs = runs.clone();
        Ok(())
    }

    fn results(&self, sandbox: &Sandbox) -> Vec<TestCaseResult> {
        let mut results: Vec<TestCaseResult> = self
            .problem
            .test_cases
            .iter()
            .map(|case| TestCaseResult {
                id: case.id,
                ..Default::default()
            })
            .collect();

        let compile = match self.compile {
            Some(id) => id,
            None => return results,
        };

        if !sandbox.node(compile).normal_exit {
            log::info!(
                "compile failed for solution {}: {:?}",
                self.solution.id,
                sandbox.node(compile).wait
            );
            let diagnostic =
                fs::read_to_string(sandbox.stage_path(COMPILE_LOG)).unwrap_or_default();
            if let Some(first) = results.first_mut() {
                first.info = diagnostic;
            }
            for result in &mut results {
                result.verdict = Verdict::Ce;
                result.score = 0;
            }
            return results;
        }

        for (index, run) in self.runs.iter().enumerate() {
            classify_run(sandbox.node(*run), &mut results[index]);
        }
        results
    }
}

/// Map one executed run node to a verdict.
///
/// Signals are inspected first; a SIGKILL without an OOM event falls through
/// to the limit checks so supervisor kills surface as TLE rather than RE.
pub(crate) fn classify_run(node: &ProgramNode, result: &mut TestCaseResult) {
    result.verdict = Verdict::Ac;
    result.time_ms = node.time_ms;
    result.mem_bytes = node.mem_bytes;
    result.score = 0;

    if !node.normal_exit {
        match node.wait {
            Some(WaitStatus::Exited(_, code)) if code != 0 => {
                result.verdict = Verdict::Re;
                result.info = "return value is not zero.".to_string();
                return;
            }
            Some(WaitStatus::Signaled(_, Signal::SIGSEGV, _)) => {
                result.verdict = Verdict::Re;
                result.info = "segment fault.".to_string();
                return;
            }
            Some(WaitStatus::Signaled(_, Signal::SIGFPE, _)) => {
                result.verdict = Verdict::Fpe;
                result.info = "Float error.".to_string();
                return;
            }
            Some(WaitStatus::Signaled(_, Signal::SIGKILL, _)) => {
                if node.cgroup_oom {
                    result.verdict = Verdict::Mle;
                    result.info = "MLE".to_string();
                    return;
                }
                result.verdict = Verdict::Re;
            }
            Some(WaitStatus::Signaled(_, signal, _)) => {
                result.verdict = Verdict::Re;
                result.info = format!("killed by {signal}.");
            }
            _ => {}
        }
    }

    if let Some(limit) = node.spec.time_limit_ms {
        if node.time_ms > limit {
            result.verdict = Verdict::Tle;
            return;
        }
    }
    if let Some(limit) = node.spec.mem_limit_bytes {
        if node.mem_bytes > limit {
            result.verdict = Verdict::Mle;
        }
    }
}

pub struct CppGrader {
    problem: Arc<Problem>,
    solution: Arc<Solution>,
    checker: String,
    checks: Vec<NodeId>,
}

impl CppGrader {
    pub fn new(problem: Arc<Problem>, solution: Arc<Solution>) -> Self {
        Self {
            problem,
            solution,
            checker: String::new(),
            checks: Vec::new(),
        }
    }
}

impl Grader for CppGrader {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn prepare(&mut self, sandbox: &mut Sandbox, runs: &[NodeId]) -> Result<()> {
        self.checker = format!("./{}_judger", self.solution.id);
        sandbox.add_file(&self.checker, &self.problem.checker_path)?;

        for (index, run) in runs.iter().enumerate() {
            let run_stdout = sandbox.node(*run).spec.stdout.clone().ok_or_else(|| {
                JudgeError::Sandbox(format!("run node {index} has no stdout to grade"))
            })?;

            let check = sandbox.add_child(
                *run,
                ProgramSpec {
                    kind: ProgramKind::Checker,
                    exe: self.checker.clone(),
                    args: vec![index.to_string()],
                    stdin: Some(run_stdout),
                    stdout: Some(format!("./{index}.res")),
                    ..Default::default()
                },
            );
            self.checks.push(check);
        }
        Ok(())
    }

    fn results(&self, sandbox: &Sandbox) -> Vec<TestCaseResult> {
        let mut results = Vec::with_capacity(self.checks.len());
        for (index, check) in self.checks.iter().enumerate() {
            let case = &self.problem.test_cases[index];
            let mut result = TestCaseResult {
                id: case.id,
                ..Default::default()
            };

            let node = sandbox.node(*check);
            if !node.normal_exit {
                result.verdict = Verdict::Ukn;
                result.info = "judge error".to_string();
                results.push(result);
                continue;
            }

            let raw = match fs::read_to_string(sandbox.stage_path(&format!("./{index}.res"))) {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!("checker output for case {index} unreadable: {e}");
                    result.verdict = Verdict::Ukn;
                    result.info = "judge error".to_string();
                    results.push(result);
                    continue;
                }
            };

            let (verdict, score, info) = parse_checker_output(&raw, case.score);
            result.verdict = verdict;
            result.score = score;
            result.info = info;
            results.push(result);
        }
        results
    }
}

/// Parse the two-line checker protocol.
///
/// Line 1 is an integer score where `-1` means full credit; line 2 is an
/// optional diagnostic. Anything unparseable or out of range is a judge
/// fault, not a submission fault.
pub(crate) fn parse_checker_output(raw: &str, full_score: i64) -> (Verdict, i64, String) {
    let mut lines = raw.lines();

    let score: i64 = match lines
        .next()
        .and_then(|line| line.split_whitespace().next())
        .and_then(|token| token.parse().ok())
    {
        Some(score) => score,
        None => return (Verdict::Ukn, 0, "judge error".to_string()),
    };
    let info = lines.next().unwrap_or("").to_string();

    if score > full_score || score < -1 {
        return (Verdict::Ukn, 0, "judge error".to_string());
    }
    if score == full_score || score == -1 {
        return (Verdict::Ac, full_score, info);
    }
    (Verdict::Wa, score, info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    fn node_with(wait: Option<WaitStatus>, oom: bool) -> ProgramNode {
        let mut node = ProgramNode::new(ProgramSpec {
            time_limit_ms: Some(1000),
            mem_limit_bytes: Some(64 * 1024 * 1024),
            ..Default::default()
        });
        node.wait = wait;
        node.normal_exit = matches!(wait, Some(WaitStatus::Exited(_, 0)));
        node.cgroup_oom = oom;
        node.time_ms = 10;
        node.mem_bytes = 1024;
        node
    }

    fn classify(node: &ProgramNode) -> TestCaseResult {
        let mut result = TestCaseResult::default();
        classify_run(node, &mut result);
        result
    }

    #[test]
    fn clean_exit_within_limits_is_accepted() {
        let node = node_with(Some(WaitStatus::Exited(Pid::from_raw(1), 0)), false);
        let result = classify(&node);
        assert_eq!(result.verdict, Verdict::Ac);
        assert_eq!(result.time_ms, 10);
        assert_eq!(result.mem_bytes, 1024);
    }

    #[test]
    fn nonzero_exit_is_runtime_error() {
        let node = node_with(Some(WaitStatus::Exited(Pid::from_raw(1), 2)), false);
        let result = classify(&node);
        assert_eq!(result.verdict, Verdict::Re);
        assert_eq!(result.info, "return value is not zero.");
    }

    #[test]
    fn sigsegv_is_runtime_error_with_diagnostic() {
        let node = node_with(
            Some(WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGSEGV, false)),
            false,
        );
        let result = classify(&node);
        assert_eq!(result.verdict, Verdict::Re);
        assert_eq!(result.info, "segment fault.");
    }

    #[test]
    fn sigfpe_is_float_error() {
        let node = node_with(
            Some(WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGFPE, false)),
            false,
        );
        assert_eq!(classify(&node).verdict, Verdict::Fpe);
    }

    #[test]
    fn sigkill_with_oom_is_memory_limit() {
        let node = node_with(
            Some(WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGKILL, false)),
            true,
        );
        assert_eq!(classify(&node).verdict, Verdict::Mle);
    }

    #[test]
    fn sigkill_over_time_budget_is_time_limit() {
        let mut node = node_with(
            Some(WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGKILL, false)),
            false,
        );
        node.time_ms = 1500;
        assert_eq!(classify(&node).verdict, Verdict::Tle);
    }

    #[test]
    fn sigkill_without_evidence_is_runtime_error() {
        let node = node_with(
            Some(WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGKILL, false)),
            false,
        );
        assert_eq!(classify(&node).verdict, Verdict::Re);
    }

    #[test]
    fn seccomp_kill_is_runtime_error() {
        let node = node_with(
            Some(WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGSYS, false)),
            false,
        );
        let result = classify(&node);
        assert_eq!(result.verdict, Verdict::Re);
        assert!(result.info.contains("SIGSYS"));
    }

    #[test]
    fn peak_over_limit_is_memory_limit() {
        let mut node = node_with(Some(WaitStatus::Exited(Pid::from_raw(1), 0)), false);
        node.mem_bytes = 128 * 1024 * 1024;
        assert_eq!(classify(&node).verdict, Verdict::Mle);
    }

    #[test]
    fn checker_full_score_sentinel_grants_full_credit() {
        assert_eq!(
            parse_checker_output("-1\nOK\n", 33),
            (Verdict::Ac, 33, "OK".to_string())
        );
    }

    #[test]
    fn checker_explicit_full_score_is_accepted() {
        assert_eq!(
            parse_checker_output("33\n", 33),
            (Verdict::Ac, 33, String::new())
        );
    }

    #[test]
    fn checker_partial_score_is_wrong_answer() {
        assert_eq!(
            parse_checker_output("10\nhalf right\n", 33),
            (Verdict::Wa, 10, "half right".to_string())
        );
        assert_eq!(
            parse_checker_output("0\nall wrong\n", 33),
            (Verdict::Wa, 0, "all wrong".to_string())
        );
    }

    #[test]
    fn checker_out_of_range_score_is_judge_error() {
        assert_eq!(parse_checker_output("34\n", 33).0, Verdict::Ukn);
        assert_eq!(parse_checker_output("-2\n", 33).0, Verdict::Ukn);
    }

    #[test]
    fn checker_garbage_is_judge_error() {
        assert_eq!(parse_checker_output("", 33).0, Verdict::Ukn);
        assert_eq!(parse_checker_output("ok then\n", 33).0, Verdict::Ukn);
    }
}
