//! The sandbox: a staging directory plus a tree of program nodes.
//!
//! Strategies stage files and enqueue programs; [`Sandbox::run`] executes
//! every root in insertion order, walking each tree depth-first and skipping
//! any subtree whose parent did not exit cleanly. The stage directory is
//! removed when the sandbox drops.

mod exec;
pub mod program;
pub mod seccomp;

pub use program::{NodeId, ProgramKind, ProgramNode, ProgramSpec};

use crate::error::{JudgeError, Result};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};

pub struct Sandbox {
    stage: PathBuf,
    nodes: Vec<ProgramNode>,
    roots: Vec<NodeId>,
}

impl Sandbox {
    /// Create the stage directory. An existing directory is reused.
    pub fn create(stage: impl Into<PathBuf>) -> Result<Self> {
        let stage = stage.into();
        fs::create_dir_all(&stage).map_err(|e| {
            JudgeError::Sandbox(format!("create stage {}: {}", stage.display(), e))
        })?;
        log::debug!("created sandbox stage {}", stage.display());
        Ok(Self {
            stage,
            nodes: Vec::new(),
            roots: Vec::new(),
        })
    }

    pub fn stage(&self) -> &Path {
        &self.stage
    }

    /// Resolve a stage-relative path like `./0.in` to its host location.
    pub fn stage_path(&self, relative: &str) -> PathBuf {
        self.stage.join(relative.trim_start_matches("./"))
    }

    /// Stage a file from outside the sandbox, preferring a hardlink.
    pub fn add_file(&mut self, dst: &str, src: &Path) -> Result<()> {
        utils::stage_link(&self.stage_path(dst), src)
    }

    /// Stage a file by forced copy (cross-device fallback).
    pub fn copy_file(&mut self, dst: &str, src: &Path) -> Result<()> {
        utils::copy_file(&self.stage_path(dst), src)
    }

    /// Append a root program to the execution list.
    pub fn add_program(&mut self, spec: ProgramSpec) -> NodeId {
        let id = self.push_node(spec);
        self.roots.push(id);
        id
    }

    /// Append a child under `parent`; it only runs if `parent` exits cleanly.
    pub fn add_child(&mut self, parent: NodeId, spec: ProgramSpec) -> NodeId {
        let id = self.push_node(spec);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_node(&mut self, spec: ProgramSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ProgramNode::new(spec));
        id
    }

    pub fn node(&self, id: NodeId) -> &ProgramNode {
        &self.nodes[id.0]
    }

    /// Execute all roots in insertion order.
    pub fn run(&mut self) {
        let roots = self.roots.clone();
        for root in roots {
            self.run_tree(root);
        }
    }

    /// Depth-first over one tree; sibling order is preserved and a subtree is
    /// pruned as soon as its parent fails to exit cleanly.
    fn run_tree(&mut self, root: NodeId) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            exec::execute_node(&self.stage, &mut self.nodes[id.0]);

            let node = &self.nodes[id.0];
            if node.normal_exit {
                pending.extend(node.children.iter().rev().copied());
            } else if !node.children.is_empty() {
                log::debug!(
                    "{} did not exit cleanly, skipping {} queued child(ren)",
                    node.spec.exe,
                    node.children.len()
                );
            }
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if let Err(e) = utils::remove_dir_recursive(&self.stage) {
            log::warn!("failed to remove stage {}: {}", self.stage.display(), e);
        }
    }
}
