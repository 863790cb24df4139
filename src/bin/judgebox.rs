//! Judge a single submission from the command line.
//!
//! The problem definition is a JSON file matching [`judgebox::Problem`]; the
//! report is printed to stdout as JSON. Requires root, a cgroup-v2 mount at
//! /sys/fs/cgroup, and a working `g++`.

use anyhow::{Context, Result};
use clap::Parser;
use judgebox::types::{JudgeConfig, Language, Problem, Solution};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "judgebox", about = "Sandboxed judging of a single submission")]
struct Cli {
    /// Problem definition (JSON).
    #[arg(long)]
    problem: PathBuf,

    /// Submitted source file.
    #[arg(long)]
    solution: PathBuf,

    /// Submission language.
    #[arg(long, default_value = "cpp")]
    language: Language,

    /// Identifier for this submission; derived from the source file name when
    /// omitted.
    #[arg(long)]
    solution_id: Option<String>,

    /// Directory for per-submission stage directories.
    #[arg(long, default_value = ".")]
    stage_root: PathBuf,
}

fn main() -> Result<()> {
    judgebox::logging::init();
    let cli = Cli::parse();

    let problem: Problem = serde_json::from_reader(
        File::open(&cli.problem)
            .with_context(|| format!("open problem file {}", cli.problem.display()))?,
    )
    .context("parse problem definition")?;

    let solution_id = cli.solution_id.unwrap_or_else(|| {
        let stem = cli
            .solution
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "submission".to_string());
        format!("{}_{}", stem, std::process::id())
    });

    let solution = Solution {
        id: solution_id,
        text_path: cli.solution.clone(),
        language: cli.language,
    };

    let config = JudgeConfig {
        stage_root: cli.stage_root,
    };

    let mut judger = judgebox::judger_for(config, Arc::new(problem), Arc::new(solution))
        .context("select judging strategies")?;
    let report = judger.judge().context("judging run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
