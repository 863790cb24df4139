//! Data model shared by the sandbox, the strategies, and the orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Source language of a submission or checker.
///
/// Only `Cpp` is fully wired today. `Internal` denotes a built-in diff-style
/// checker rather than a user-provided one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Python,
    Java,
    Go,
    JavaScript,
    CSharp,
    Sql,
    Internal,
}

impl Language {
    /// Short uppercase tag used in stage directory names.
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Cpp => "CPP",
            Language::Python => "PY",
            Language::Java => "JAVA",
            Language::Go => "GO",
            Language::JavaScript => "JS",
            Language::CSharp => "CS",
            Language::Sql => "SQL",
            Language::Internal => "INT",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" | "cc" => Ok(Language::Cpp),
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "go" | "golang" => Ok(Language::Go),
            "javascript" | "js" => Ok(Language::JavaScript),
            "csharp" | "cs" => Ok(Language::CSharp),
            "sql" => Ok(Language::Sql),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// Per-case verdict, also used for the overall state of a run.
///
/// `Mul` marks a run whose cases ended in several different non-accepted
/// states. `Ukn` is a judge-side fault: the checker crashed, produced
/// unparseable output, or reported an out-of-range score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Ac,
    Wa,
    Re,
    Ce,
    Tle,
    Mle,
    Fpe,
    Mul,
    #[default]
    Ukn,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Verdict::Ac => "AC",
            Verdict::Wa => "WA",
            Verdict::Re => "RE",
            Verdict::Ce => "CE",
            Verdict::Tle => "TLE",
            Verdict::Mle => "MLE",
            Verdict::Fpe => "FPE",
            Verdict::Mul => "MUL",
            Verdict::Ukn => "UKN",
        };
        write!(f, "{tag}")
    }
}

/// One test case of a problem. Immutable during a judging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    /// Input file fed to the submission's stdin.
    pub data_path: PathBuf,
    /// Reference answer, available to the checker.
    pub answer_path: PathBuf,
    pub time_limit_ms: u64,
    pub mem_limit_bytes: u64,
    /// Full score of this case, `>= 0`.
    pub score: i64,
}

/// Problem definition. Immutable during a judging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub name: String,
    /// Local path of the checker binary, delivered by the file cache.
    pub checker_path: PathBuf,
    pub checker_language: Language,
    pub test_cases: Vec<TestCase>,
    pub score: i64,
    pub difficulty: u32,
}

/// A user submission. Immutable during a judging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub id: String,
    /// Local path of the submitted source text.
    pub text_path: PathBuf,
    pub language: Language,
}

/// Outcome of one test case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub verdict: Verdict,
    pub id: u32,
    pub score: i64,
    /// Short human-readable diagnostic.
    pub info: String,
    pub time_ms: u64,
    pub mem_bytes: u64,
}

/// Final report of one judging run.
///
/// `cases` has exactly one entry per problem test case, in order, and
/// `score` is the sum of the per-case scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReport {
    pub cases: Vec<TestCaseResult>,
    pub overall: Verdict,
    pub problem_id: String,
    pub solution_id: String,
    pub score: i64,
    pub info: String,
}

/// Process-level knobs for a judging run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Directory under which per-submission stage directories are created.
    pub stage_root: PathBuf,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            stage_root: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parses_common_aliases() {
        assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("CPP".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert!("brainfuck".parse::<Language>().is_err());
    }

    #[test]
    fn verdict_displays_short_tags() {
        assert_eq!(Verdict::Ac.to_string(), "AC");
        assert_eq!(Verdict::Tle.to_string(), "TLE");
        assert_eq!(Verdict::Ukn.to_string(), "UKN");
    }

    #[test]
    fn default_case_result_is_unknown_with_zero_score() {
        let result = TestCaseResult::default();
        assert_eq!(result.verdict, Verdict::Ukn);
        assert_eq!(result.score, 0);
        assert!(result.info.is_empty());
    }
}
