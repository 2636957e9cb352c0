//! Project records
//!
//! [`ProjectCore`] is the mutable heart of a project: metadata, pipeline
//! state, version counter, recent tasks, and the outgoing trigger edges.
//! The server wraps it in a per-project lock; only the owning worker and the
//! handlers serialized on that lock ever touch it.

use std::collections::HashMap;

use crate::domain::state::State;
use crate::domain::task::TaskRecord;

/// How many recent tasks a project keeps in memory. Older tasks remain in
/// the store but are dropped from snapshots.
pub const RECENT_TASKS: usize = 5;

/// Capacity of a project's action queue. Publishers block when it is full;
/// that blocking is the sole admission control.
pub const QUEUE_DEPTH: usize = 10;

/// A queued request to run one pipeline stage.
///
/// `trigger` is a free-form label forwarded to the BUILD child as
/// `RACS_TRIGGER`; upstream pushes set it to their rendered tag.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub stage: State,
    pub trigger: String,
}

/// Mutable state of one project.
#[derive(Debug, Clone)]
pub struct ProjectCore {
    pub name: String,
    pub labels: String,
    pub url: String,
    pub branch: String,
    pub destination: String,
    pub tag: String,
    pub build_spec: String,
    pub package_spec: String,
    pub build_hash: Vec<u8>,
    pub state: State,
    pub version: i64,
    /// The `RECENT_TASKS` most recent tasks, oldest first.
    pub tasks: Vec<TaskRecord>,
    /// Outgoing trigger edges: target project id to the stage to enqueue
    /// there when this project reaches PUSH_SUCCESS.
    pub triggers: HashMap<i64, State>,
    /// Source project whose artifact image feeds this project's PREPARE.
    pub prepare_dep: Option<i64>,
    /// Source project whose artifact image feeds this project's PACKAGE.
    pub package_dep: Option<i64>,
}

impl ProjectCore {
    /// A freshly created project: default spec filenames, version 0, and
    /// CREATE_SUCCESS so the first cascade step is CLEANING.
    pub fn created(name: String, url: String, branch: String, destination: String, tag: String) -> Self {
        Self {
            name,
            labels: String::new(),
            url,
            branch,
            destination,
            tag,
            build_spec: "BuildSpec".to_string(),
            package_spec: "PackageSpec".to_string(),
            build_hash: Vec::new(),
            state: State::CreateSuccess,
            version: 0,
            tasks: Vec::new(),
            triggers: HashMap::new(),
            prepare_dep: None,
            package_dep: None,
        }
    }

    /// Append a task, evicting the oldest beyond [`RECENT_TASKS`].
    pub fn push_task(&mut self, task: TaskRecord) {
        self.tasks.push(task);
        if self.tasks.len() > RECENT_TASKS {
            self.tasks.remove(0);
        }
    }

    /// The project's tag template with `$VERSION` substituted.
    pub fn rendered_tag(&self) -> String {
        render_tag(&self.tag, self.version)
    }
}

/// Substitute every `$VERSION` in a tag template with the decimal version.
pub fn render_tag(template: &str, version: i64) -> String {
    template.replace("$VERSION", &version.to_string())
}
