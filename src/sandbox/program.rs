//! Program nodes: the unit of execution inside a sandbox.
//!
//! Nodes live in an arena owned by the [`crate::sandbox::Sandbox`]; builders
//! receive [`NodeId`] handles and read measured outcomes back through them
//! once the sandbox has run.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// What kind of program a node is. Compile steps keep the host filesystem
/// view (the toolchain lives outside the stage); everything else is chrooted
/// and seccomp-filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgramKind {
    Compile,
    Interpret,
    #[default]
    Program,
    Checker,
}

/// Handle to a node in a sandbox's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub(crate) usize);

/// Build-time description of a program to execute.
///
/// `stdin`/`stdout`/`stderr` are stage-relative paths; for chrooted kinds the
/// stage root is `/` by the time they are opened.
#[derive(Debug, Clone, Default)]
pub struct ProgramSpec {
    pub kind: ProgramKind,
    pub exe: String,
    pub args: Vec<String>,
    /// `KEY=VALUE` pairs; `None` inherits the supervisor environment.
    pub env: Option<Vec<String>>,
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub time_limit_ms: Option<u64>,
    pub mem_limit_bytes: Option<u64>,
}

/// A program node plus its measured outcome.
///
/// Outcome fields are written exactly once, by the sandbox, between fork and
/// reap of the node's child process.
#[derive(Debug)]
pub struct ProgramNode {
    pub spec: ProgramSpec,
    pub children: Vec<NodeId>,

    /// Raw wait status as reported by `waitpid`. `None` if the node was
    /// never executed (parent failed, or launch aborted).
    pub wait: Option<WaitStatus>,
    /// CPU time charged to the node's cgroup, in milliseconds.
    pub time_ms: u64,
    /// Peak resident memory charged to the node's cgroup, in bytes.
    pub mem_bytes: u64,
    /// True iff the process exited normally with status 0.
    pub normal_exit: bool,
    /// True iff the node's cgroup recorded an OOM event.
    pub cgroup_oom: bool,
}

impl ProgramNode {
    pub(crate) fn new(spec: ProgramSpec) -> Self {
        Self {
            spec,
            children: Vec::new(),
            wait: None,
            time_ms: 0,
            mem_bytes: 0,
            normal_exit: false,
            cgroup_oom: false,
        }
    }

    /// Exit code, when the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.wait {
            Some(WaitStatus::Exited(_, code)) => Some(code),
            _ => None,
        }
    }

    /// Terminating signal, when the process was killed by one.
    pub fn term_signal(&self) -> Option<Signal> {
        match self.wait {
            Some(WaitStatus::Signaled(_, signal, _)) => Some(signal),
            _ => None,
        }
    }
}
