//! Syscall filtering for sandboxed programs.
//!
//! Submissions and checkers run under a default-allow BPF filter that kills
//! the process on any syscall from the deny list: networking, destructive
//! filesystem operations, process creation and credential changes, kernel
//! tampering, and mount/chroot. Compile steps are exempt.
//!
//! The filter program is built in the supervisor before `clone` so the child
//! only has to load it; loading requires `PR_SET_NO_NEW_PRIVS` to be set
//! first.

use crate::error::{JudgeError, Result};
use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule};
use std::collections::BTreeMap;

#[cfg(target_arch = "x86_64")]
const DENIED_SYSCALLS: &[libc::c_long] = &[
    // network
    libc::SYS_socket,
    libc::SYS_connect,
    libc::SYS_accept,
    libc::SYS_bind,
    libc::SYS_listen,
    libc::SYS_sendto,
    libc::SYS_recvfrom,
    libc::SYS_sendmsg,
    libc::SYS_recvmsg,
    libc::SYS_shutdown,
    // filesystem mutation
    libc::SYS_mknod,
    libc::SYS_mkdir,
    libc::SYS_rmdir,
    libc::SYS_unlink,
    libc::SYS_link,
    libc::SYS_symlink,
    libc::SYS_rename,
    libc::SYS_chmod,
    libc::SYS_chown,
    libc::SYS_fchmod,
    libc::SYS_fchown,
    libc::SYS_truncate,
    libc::SYS_ftruncate,
    // process creation and control
    libc::SYS_fork,
    libc::SYS_vfork,
    libc::SYS_clone,
    libc::SYS_kill,
    libc::SYS_tkill,
    libc::SYS_tgkill,
    libc::SYS_prctl,
    libc::SYS_setpriority,
    libc::SYS_setpgid,
    libc::SYS_setuid,
    libc::SYS_setgid,
    libc::SYS_setresuid,
    libc::SYS_setresgid,
    libc::SYS_setreuid,
    libc::SYS_setregid,
    // kernel tampering
    libc::SYS_ptrace,
    libc::SYS_syslog,
    libc::SYS_reboot,
    libc::SYS_swapon,
    libc::SYS_swapoff,
    libc::SYS_init_module,
    libc::SYS_finit_module,
    libc::SYS_delete_module,
    // mount / escape
    libc::SYS_mount,
    libc::SYS_umount2,
    libc::SYS_chroot,
];

// aarch64 has no legacy path syscalls; the *at variants cover the same ground.
#[cfg(target_arch = "aarch64")]
const DENIED_SYSCALLS: &[libc::c_long] = &[
    // network
    libc::SYS_socket,
    libc::SYS_connect,
    libc::SYS_accept,
    libc::SYS_bind,
    libc::SYS_listen,
    libc::SYS_sendto,
    libc::SYS_recvfrom,
    libc::SYS_sendmsg,
    libc::SYS_recvmsg,
    libc::SYS_shutdown,
    // filesystem mutation
    libc::SYS_mknodat,
    libc::SYS_mkdirat,
    libc::SYS_unlinkat,
    libc::SYS_linkat,
    libc::SYS_symlinkat,
    libc::SYS_renameat,
    libc::SYS_fchmod,
    libc::SYS_fchmodat,
    libc::SYS_fchown,
    libc::SYS_fchownat,
    libc::SYS_truncate,
    libc::SYS_ftruncate,
    // process creation and control
    libc::SYS_clone,
    libc::SYS_kill,
    libc::SYS_tkill,
    libc::SYS_tgkill,
    libc::SYS_prctl,
    libc::SYS_setpriority,
    libc::SYS_setpgid,
    libc::SYS_setuid,
    libc::SYS_setgid,
    libc::SYS_setresuid,
    libc::SYS_setresgid,
    libc::SYS_setreuid,
    libc::SYS_setregid,
    // kernel tampering
    libc::SYS_ptrace,
    libc::SYS_syslog,
    libc::SYS_reboot,
    libc::SYS_swapon,
    libc::SYS_swapoff,
    libc::SYS_init_module,
    libc::SYS_finit_module,
    libc::SYS_delete_module,
    // mount / escape
    libc::SYS_mount,
    libc::SYS_umount2,
    libc::SYS_chroot,
];

/// Build the default-allow, kill-on-deny filter for submissions and checkers.
pub fn submission_filter() -> Result<BpfProgram> {
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
    for nr in DENIED_SYSCALLS {
        // An empty rule list matches the syscall unconditionally.
        rules.insert(*nr as i64, vec![]);
    }

    let arch = std::env::consts::ARCH
        .try_into()
        .map_err(|e| JudgeError::Sandbox(format!("unsupported seccomp arch: {e:?}")))?;

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow,
        SeccompAction::KillProcess,
        arch,
    )
    .map_err(|e| JudgeError::Sandbox(format!("build seccomp filter: {e}")))?;

    filter
        .try_into()
        .map_err(|e| JudgeError::Sandbox(format!("compile seccomp filter: {e}")))
}

/// Load a prebuilt filter into the current process. Irreversible.
pub fn apply(filter: &BpfProgram) -> Result<()> {
    seccompiler::apply_filter(filter)
        .map_err(|e| JudgeError::Sandbox(format!("apply seccomp filter: {e}")))
}
