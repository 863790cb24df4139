//! Single-node execution: clone into fresh namespaces, place the child in a
//! cgroup, release the start gate, supervise, and record the outcome.
//!
//! Startup ordering is load-bearing: the child blocks on a pipe read until
//! the parent has attached its PID to the cgroup and written the memory
//! limit, so no user instruction runs unaccounted.

use crate::cgroup::ResourceGroup;
use crate::error::{JudgeError, Result};
use crate::sandbox::program::{ProgramKind, ProgramNode};
use crate::sandbox::seccomp;
use crate::utils;
use nix::fcntl::{open, OFlag};
use nix::sched::{clone, CloneCb, CloneFlags};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{chdir, chroot, close, execvp, execvpe, pipe, read, write, Pid};
use seccompiler::BpfProgram;
use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Supervisor poll interval.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);

/// Absolute wall-clock ceiling per child, guarding the supervisor itself.
const MAX_PROCESS_WALL: Duration = Duration::from_secs(10);

const CHILD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Execute one node. Launch failures are logged and leave the node with
/// `normal_exit == false`, which prunes its subtree.
pub(crate) fn execute_node(stage: &Path, node: &mut ProgramNode) {
    if let Err(e) = try_execute(stage, node) {
        log::error!("failed to execute {}: {}", node.spec.exe, e);
    }
}

fn try_execute(stage: &Path, node: &mut ProgramNode) -> Result<()> {
    let plan = ChildPlan::prepare(stage, node)?;

    let (gate_read, gate_write) =
        pipe().map_err(|e| JudgeError::Process(format!("pipe: {e}")))?;

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    let cb: CloneCb = Box::new(|| plan.run_child(gate_read, gate_write));
    let flags = CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWUTS;

    // SAFETY: the callback only performs exec-preparation syscalls and does
    // not touch parent-owned locks before execvp.
    let child = match unsafe { clone(cb, &mut stack, flags, Some(libc::SIGCHLD)) } {
        Ok(pid) => pid,
        Err(e) => {
            let _ = close(gate_read);
            let _ = close(gate_write);
            return Err(JudgeError::Process(format!("clone: {e}")));
        }
    };

    let mut group = match ResourceGroup::acquire(utils::file_name(&node.spec.exe)) {
        Ok(group) => group,
        Err(e) => {
            abort_child(child, gate_read, gate_write);
            return Err(e);
        }
    };

    if let Err(e) = group.add_process(child) {
        abort_child(child, gate_read, gate_write);
        return Err(e);
    }

    if let Some(bytes) = node.spec.mem_limit_bytes {
        if let Err(e) = group.set_mem_limit(bytes) {
            abort_child(child, gate_read, gate_write);
            return Err(e);
        }
    }

    if let Some(ms) = node.spec.time_limit_ms {
        // Advisory only; actual enforcement is the polling loop below.
        if let Err(e) = group.set_time_limit_ms(ms) {
            log::debug!("cpu.max for {}: {}", group.name(), e);
        }
    }

    if write(gate_write, &[1u8]).is_err() {
        abort_child(child, gate_read, gate_write);
        return Err(JudgeError::Process("start gate write failed".into()));
    }
    let _ = close(gate_read);
    let _ = close(gate_write);

    supervise(child, &group, node)
}

/// Kill a child whose setup failed, reap it, and drop the gate fds.
fn abort_child(child: Pid, gate_read: RawFd, gate_write: RawFd) {
    let _ = kill(child, Signal::SIGKILL);
    let _ = close(gate_read);
    let _ = close(gate_write);
    let _ = waitpid(child, None);
}

fn supervise(child: Pid, group: &ResourceGroup, node: &mut ProgramNode) -> Result<()> {
    let started = Instant::now();

    let status = loop {
        match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                let over_cpu = node
                    .spec
                    .time_limit_ms
                    .map(|limit| group.cpu_time_ms().unwrap_or(0) > limit)
                    .unwrap_or(false);
                if over_cpu || started.elapsed() > MAX_PROCESS_WALL {
                    log::info!("killing {} (pid {child}): over time budget", node.spec.exe);
                    let _ = kill(child, Signal::SIGKILL);
                    // Keep polling until the kill is reaped.
                    continue;
                }
                std::thread::sleep(SUPERVISE_INTERVAL);
            }
            Ok(status @ WaitStatus::Exited(..)) => break status,
            Ok(status @ WaitStatus::Signaled(..)) => break status,
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(JudgeError::Process(format!("waitpid({child}): {e}"))),
        }
    };

    node.wait = Some(status);
    node.normal_exit = matches!(status, WaitStatus::Exited(_, 0));
    node.time_ms = group.cpu_time_ms().unwrap_or(0);
    node.mem_bytes = group.peak_memory();
    node.cgroup_oom = group.is_oom();

    log::debug!(
        "{} finished: {:?}, {} ms, {} bytes, oom={}",
        node.spec.exe,
        status,
        node.time_ms,
        node.mem_bytes,
        node.cgroup_oom
    );
    Ok(())
}

/// Everything the child needs, prepared before `clone` so the child itself
/// performs no allocation beyond what exec requires.
struct ChildPlan {
    kind: ProgramKind,
    stage: PathBuf,
    exe: CString,
    argv: Vec<CString>,
    envp: Option<Vec<CString>>,
    stdin: Option<CString>,
    stdout: Option<CString>,
    stderr: Option<CString>,
    filter: Option<BpfProgram>,
}

impl ChildPlan {
    fn prepare(stage: &Path, node: &ProgramNode) -> Result<Self> {
        let spec = &node.spec;
        let exe = utils::c_string(&spec.exe)?;

        let mut argv = vec![exe.clone()];
        for arg in &spec.args {
            argv.push(utils::c_string(arg)?);
        }

        let envp = match &spec.env {
            Some(pairs) => {
                let mut envp = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    envp.push(utils::c_string(pair)?);
                }
                Some(envp)
            }
            None => None,
        };

        let filter = if spec.kind == ProgramKind::Compile {
            None
        } else {
            Some(seccomp::submission_filter()?)
        };

        Ok(Self {
            kind: spec.kind,
            stage: stage.to_path_buf(),
            exe,
            argv,
            envp,
            stdin: spec.stdin.as_deref().map(utils::c_string).transpose()?,
            stdout: spec.stdout.as_deref().map(utils::c_string).transpose()?,
            stderr: spec.stderr.as_deref().map(utils::c_string).transpose()?,
            filter,
        })
    }

    /// Child-side setup. Runs after `clone`, before `exec`; every failure
    /// path exits nonzero so the parent records an abnormal node.
    fn run_child(&self, gate_read: RawFd, gate_write: RawFd) -> isize {
        if chdir(&self.stage).is_err() {
            return 1;
        }

        if self.kind != ProgramKind::Compile {
            if chroot(".").is_err() {
                return 1;
            }
            if chdir("/").is_err() {
                return 1;
            }
        }

        if let Some(path) = &self.stdin {
            if !redirect(libc::STDIN_FILENO, path, OFlag::O_RDONLY | OFlag::O_CREAT) {
                return 1;
            }
        }
        if let Some(path) = &self.stdout {
            if !redirect(
                libc::STDOUT_FILENO,
                path,
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
            ) {
                return 1;
            }
        }
        if let Some(path) = &self.stderr {
            if !redirect(
                libc::STDERR_FILENO,
                path,
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
            ) {
                return 1;
            }
        }

        if let Some(filter) = &self.filter {
            // SAFETY: plain prctl with integer arguments.
            if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) } != 0 {
                return 1;
            }
            if seccomp::apply(filter).is_err() {
                return 1;
            }
        }

        // Block until the parent has placed us in the cgroup.
        let mut token = [0u8; 1];
        match read(gate_read, &mut token) {
            Ok(1) => {}
            _ => return 1,
        }
        let _ = close(gate_read);
        let _ = close(gate_write);

        let result = match &self.envp {
            Some(envp) => execvpe(&self.exe, &self.argv, envp),
            None => execvp(&self.exe, &self.argv),
        };

        // exec only returns on failure.
        let _ = result;
        1
    }
}

/// Re-open `fd` onto `path`. The standard descriptor is closed first so the
/// lowest-fd rule lands the new file exactly on `fd`.
fn redirect(fd: RawFd, path: &CString, flags: OFlag) -> bool {
    let _ = close(fd);
    match open(path.as_c_str(), flags, Mode::from_bits_truncate(0o644)) {
        Ok(got) if got == fd => true,
        Ok(got) => {
            let _ = close(got);
            false
        }
        Err(_) => false,
    }
}
