//! Stage → command table
//!
//! Translates a requested pipeline stage into the external command that
//! performs it. Stages without external work (and states that are not
//! actions at all) translate to `None`; the worker then only applies the
//! cascade.

use std::path::Path;

use racs_core::domain::project::ProjectCore;
use racs_core::domain::state::State;

/// One planned child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub program: String,
    pub args: Vec<String>,
}

impl Action {
    fn new(program: &str, args: Vec<String>) -> Action {
        Action {
            program: program.to_string(),
            args,
        }
    }

    /// The command line written as the log header.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Build the command for `stage` against project `id`.
///
/// `registry_url` is the resolved destination for PUSHING (already
/// login-refreshed); `trigger` is the label exported to BUILD children.
pub fn plan(
    stage: State,
    id: i64,
    core: &ProjectCore,
    projects_root: &Path,
    trigger: &str,
    registry_url: Option<&str>,
) -> Option<Action> {
    let dir = projects_root.join(id.to_string());
    let dir = dir.display();

    match stage {
        State::Cleaning => Some(Action::new(
            "rm",
            vec!["-rfv".into(), format!("{dir}/workspace/source")],
        )),
        State::Cloning => Some(Action::new(
            "git",
            vec![
                "clone".into(),
                "-v".into(),
                "--recursive".into(),
                "-b".into(),
                core.branch.clone(),
                core.url.clone(),
                format!("{dir}/workspace/source"),
            ],
        )),
        State::Preparing => {
            let mut args = vec![
                "build".into(),
                "--squash-all".into(),
                "-f".into(),
                format!("{dir}/{}", core.build_spec),
                "-t".into(),
                format!("builder-{id}"),
            ];
            if let Some(dep) = core.prepare_dep {
                args.push("--from".into());
                args.push(format!("project-{dep}"));
            }
            args.push(format!("{dir}/context"));
            Some(Action::new("podman", args))
        }
        State::Pulling => Some(Action::new(
            "git",
            vec![
                "-C".into(),
                format!("{dir}/workspace/source"),
                "pull".into(),
                "--recurse-submodules".into(),
            ],
        )),
        State::Building => Some(Action::new(
            "podman",
            vec![
                "run".into(),
                "--network=host".into(),
                "--rm=true".into(),
                "-e".into(),
                format!("RACS_TRIGGER={trigger}"),
                "-v".into(),
                format!("{dir}/workspace:/workspace"),
                "--read-only".into(),
                format!("builder-{id}"),
            ],
        )),
        State::Packaging => {
            let mut args = vec![
                "build".into(),
                "-v".into(),
                format!("{dir}/workspace:/workspace"),
                "--squash".into(),
                "-f".into(),
                format!("{dir}/{}", core.package_spec),
                "-t".into(),
                format!("project-{id}"),
            ];
            if let Some(dep) = core.package_dep {
                args.push("--from".into());
                args.push(format!("project-{dep}"));
            }
            args.push(format!("{dir}/context"));
            Some(Action::new("podman", args))
        }
        State::Pushing => match registry_url {
            Some(url) if !url.is_empty() => Some(Action::new(
                "podman",
                vec![
                    "push".into(),
                    format!("project-{id}"),
                    format!("{url}/{}", core.rendered_tag()),
                ],
            )),
            _ => Some(Action::new("echo", vec!["no destination".into()])),
        },
        State::Deleting => Some(Action::new("rm", vec!["-vrf".into(), format!("{dir}")])),
        _ => None,
    }
}
