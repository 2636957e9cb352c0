//! Pipeline state ladder
//!
//! A single enumeration covering the quiescent state, the DELETE stage, and
//! one `{RUNNING, ERROR, SUCCESS}` triple per forward pipeline stage. The
//! numeric encoding is a contract the workers rely on: for every stage,
//! `ERROR = RUNNING + 1` and `SUCCESS = RUNNING + 2`, so finishing an action
//! advances the state by one on failure and by two on success.

use std::fmt;
use std::str::FromStr;

/// Pipeline state of a project.
///
/// The discriminants are persisted indirectly (the store keeps the string
/// form) but their spacing is load-bearing, see [`State::completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum State {
    Deleting = -3,
    DeleteError = -2,
    DeleteSuccess = -1,
    None = 0,
    Creating = 1,
    CreateError = 2,
    CreateSuccess = 3,
    Cleaning = 4,
    CleanError = 5,
    CleanSuccess = 6,
    Cloning = 7,
    CloneError = 8,
    CloneSuccess = 9,
    Preparing = 10,
    PrepareError = 11,
    PrepareSuccess = 12,
    Pulling = 13,
    PullError = 14,
    PullSuccess = 15,
    Building = 16,
    BuildError = 17,
    BuildSuccess = 18,
    Packaging = 19,
    PackageError = 20,
    PackageSuccess = 21,
    Pushing = 22,
    PushError = 23,
    PushSuccess = 24,
}

impl State {
    /// Every state, in discriminant order.
    pub const ALL: [State; 28] = [
        State::Deleting,
        State::DeleteError,
        State::DeleteSuccess,
        State::None,
        State::Creating,
        State::CreateError,
        State::CreateSuccess,
        State::Cleaning,
        State::CleanError,
        State::CleanSuccess,
        State::Cloning,
        State::CloneError,
        State::CloneSuccess,
        State::Preparing,
        State::PrepareError,
        State::PrepareSuccess,
        State::Pulling,
        State::PullError,
        State::PullSuccess,
        State::Building,
        State::BuildError,
        State::BuildSuccess,
        State::Packaging,
        State::PackageError,
        State::PackageSuccess,
        State::Pushing,
        State::PushError,
        State::PushSuccess,
    ];

    /// The RUNNING variants that can be requested on a project's queue.
    pub const ACTIONS: [State; 8] = [
        State::Cleaning,
        State::Cloning,
        State::Preparing,
        State::Pulling,
        State::Building,
        State::Packaging,
        State::Pushing,
        State::Deleting,
    ];

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<State> {
        State::ALL.iter().copied().find(|s| *s as i32 == value)
    }

    /// Advance a RUNNING state by the outcome of its action: +1 on error,
    /// +2 on success. Falls back to [`State::None`] if called on a state
    /// without an outcome triple above it.
    pub fn completed(self, success: bool) -> State {
        let step = if success { 2 } else { 1 };
        State::from_i32(self as i32 + step).unwrap_or(State::None)
    }

    /// The persisted string form, e.g. `CLONE_SUCCESS`.
    pub fn name(self) -> &'static str {
        match self {
            State::Deleting => "DELETING",
            State::DeleteError => "DELETE_ERROR",
            State::DeleteSuccess => "DELETE_SUCCESS",
            State::None => "NONE",
            State::Creating => "CREATING",
            State::CreateError => "CREATE_ERROR",
            State::CreateSuccess => "CREATE_SUCCESS",
            State::Cleaning => "CLEANING",
            State::CleanError => "CLEAN_ERROR",
            State::CleanSuccess => "CLEAN_SUCCESS",
            State::Cloning => "CLONING",
            State::CloneError => "CLONE_ERROR",
            State::CloneSuccess => "CLONE_SUCCESS",
            State::Preparing => "PREPARING",
            State::PrepareError => "PREPARE_ERROR",
            State::PrepareSuccess => "PREPARE_SUCCESS",
            State::Pulling => "PULLING",
            State::PullError => "PULL_ERROR",
            State::PullSuccess => "PULL_SUCCESS",
            State::Building => "BUILDING",
            State::BuildError => "BUILD_ERROR",
            State::BuildSuccess => "BUILD_SUCCESS",
            State::Packaging => "PACKAGING",
            State::PackageError => "PACKAGE_ERROR",
            State::PackageSuccess => "PACKAGE_SUCCESS",
            State::Pushing => "PUSHING",
            State::PushError => "PUSH_ERROR",
            State::PushSuccess => "PUSH_SUCCESS",
        }
    }

    /// Parse the short stage word used by the HTTP surface and the trigger
    /// table (`clean`, `clone`, `prepare`, `pull`, `build`, `package`,
    /// `push`) into the matching RUNNING state.
    pub fn parse_stage(word: &str) -> Option<State> {
        match word {
            "clean" => Some(State::Cleaning),
            "clone" => Some(State::Cloning),
            "prepare" => Some(State::Preparing),
            "pull" => Some(State::Pulling),
            "build" => Some(State::Building),
            "package" => Some(State::Packaging),
            "push" => Some(State::Pushing),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a persisted state string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError(pub String);

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown state '{}'", self.0)
    }
}

impl std::error::Error for ParseStateError {}

impl FromStr for State {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<State, ParseStateError> {
        State::ALL
            .iter()
            .copied()
            .find(|state| state.name() == s)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_spacing() {
        for running in State::ACTIONS {
            assert_eq!(
                running.completed(false) as i32,
                running as i32 + 1,
                "{running} error variant"
            );
            assert_eq!(
                running.completed(true) as i32,
                running as i32 + 2,
                "{running} success variant"
            );
        }
    }

    #[test]
    fn test_completed_named_variants() {
        assert_eq!(State::Cloning.completed(true), State::CloneSuccess);
        assert_eq!(State::Cloning.completed(false), State::CloneError);
        assert_eq!(State::Deleting.completed(true), State::DeleteSuccess);
        assert_eq!(State::Deleting.completed(false), State::DeleteError);
        assert_eq!(State::Pushing.completed(true), State::PushSuccess);
    }

    #[test]
    fn test_string_round_trip() {
        for state in State::ALL {
            assert_eq!(state.name().parse::<State>(), Ok(state));
        }
        assert!("BOGUS".parse::<State>().is_err());
    }

    #[test]
    fn test_numeric_round_trip() {
        for state in State::ALL {
            assert_eq!(State::from_i32(state as i32), Some(state));
        }
        assert_eq!(State::from_i32(25), None);
        assert_eq!(State::from_i32(-4), None);
    }

    #[test]
    fn test_parse_stage() {
        assert_eq!(State::parse_stage("clean"), Some(State::Cleaning));
        assert_eq!(State::parse_stage("clone"), Some(State::Cloning));
        assert_eq!(State::parse_stage("prepare"), Some(State::Preparing));
        assert_eq!(State::parse_stage("pull"), Some(State::Pulling));
        assert_eq!(State::parse_stage("build"), Some(State::Building));
        assert_eq!(State::parse_stage("package"), Some(State::Packaging));
        assert_eq!(State::parse_stage("push"), Some(State::Pushing));
        assert_eq!(State::parse_stage("delete"), None);
        assert_eq!(State::parse_stage(""), None);
    }
}
