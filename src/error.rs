//! This module defines the error types used throughout the `taskrunner` library.

use std::path::PathBuf;

/// Error enum for the application
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// error in clap
    #[error("error in CLI option parsing: {0}")]
    ClapError(
        #[source]
        #[from]
        clap::Error,
    ),
    /// error parsing log filter
    #[error("error parsing log filter: {0}")]
    LogFilterParseError(
        #[source]
        #[from]
        tracing_subscriber::filter::ParseError,
    ),
    /// error constructing tracing-journald layer
    #[cfg(target_os = "linux")]
    #[error("error constructing tracing-journald layer: {0}")]
    TracingJournaldError(#[source] std::io::Error),
    /// error generating man pages
    #[error("error generating man pages: {0}")]
    GenerateManpageError(#[source] std::io::Error),
    /// error generating shell completion
    #[error("error generating shell completion: {0}")]
    GenerateShellCompletionError(#[source] std::io::Error),
    /// no task name was given on the command line
    #[error("no task given")]
    NoTaskGiven,
    /// a task invocation could not be parsed (e.g. a dangling `:` separator)
    #[error("could not parse task invocation: {0}")]
    BadTaskInvocation(String),
    /// the manifest could not be found by walking up from the starting directory
    #[error("no manifest found starting from {0}")]
    ManifestNotFound(PathBuf),
    /// the manifest file could not be read
    #[error("could not read manifest {0}: {1}")]
    ManifestReadError(PathBuf, #[source] std::io::Error),
    /// the manifest could not be parsed as TOML, or did not match any known dialect
    #[error("could not parse manifest {path}: {detail}")]
    ManifestParse {
        /// path to the offending manifest
        path: PathBuf,
        /// human-readable detail, usually including a line/column hint
        detail: String,
    },
    /// the manifest was parsed but declared no tasks table under any recognized dialect
    #[error("manifest {0} declares no tasks")]
    NoTasks(PathBuf),
    /// a task record contained a key not in the recognized set
    #[error("task {task} in {path}: unknown key `{key}`")]
    UnknownTaskKey {
        /// manifest the task was declared in
        path: PathBuf,
        /// name of the task
        task: String,
        /// the unrecognized key
        key: String,
    },
    /// a task record set more than one body key (`shell`/`cmd`/`composite`)
    #[error("task {task} in {path}: specifies more than one of `shell`, `cmd`, `composite`")]
    AmbiguousTaskBody {
        /// manifest the task was declared in
        path: PathBuf,
        /// name of the task
        task: String,
    },
    /// a task record set none of the body keys
    #[error("task {task} in {path}: specifies none of `shell`, `cmd`, `composite`")]
    EmptyTaskBody {
        /// manifest the task was declared in
        path: PathBuf,
        /// name of the task
        task: String,
    },
    /// a task name was empty or contained whitespace
    #[error("invalid task name `{0}`: names must be non-empty and contain no whitespace")]
    InvalidTaskName(String),
    /// the requested task does not exist in the manifest
    #[error("unknown task `{0}`")]
    UnknownTask(String),
    /// expanding a composite task revisited a task already on the expansion stack
    #[error("cyclic task reference: {}", .0.join(" -> "))]
    CyclicTask(Vec<String>),
    /// a glob pattern used as a composite include matched no task names
    #[error("pattern `{0}` matched no tasks")]
    PatternMatchedNothing(String),
    /// an argument placeholder template contained an unrecognized `$` form
    #[error("bad placeholder in `{template}` at byte offset {offset}")]
    BadPlaceholder {
        /// the offending template
        template: String,
        /// byte offset of the `$` that starts the bad placeholder
        offset: usize,
    },
    /// failure parsing a composite step's filter/reference grammar
    #[error("could not parse step `{step}`: {detail}")]
    BadStep {
        /// the offending step text
        step: String,
        /// human-readable detail
        detail: String,
    },
    /// error reading an env file
    #[error("could not read env file {0}: {1}")]
    EnvFileReadError(PathBuf, #[source] std::io::Error),
    /// a line in an env file was not of the form `KEY=VALUE`
    #[error("malformed line in env file {path}: `{line}`")]
    EnvFileMalformed {
        /// path of the offending env file
        path: PathBuf,
        /// the offending line
        line: String,
    },
    /// an `-e` command-line override was not of the form `KEY=VALUE`
    #[error("malformed -e override: `{0}` (expected KEY=VALUE)")]
    BadEnvOverride(String),
    /// a child process could not be spawned at all
    #[error("could not execute `{command}` in `{cwd}`: {source}")]
    CommandExecutionError {
        /// directory the command was attempted in
        cwd: PathBuf,
        /// the command and its arguments
        command: String,
        /// underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// a step exited non-zero and the owning task does not have `keep_going` set
    #[error("step `{command}` in `{cwd}` exited with status {code}")]
    ChildFailure {
        /// directory the command ran in
        cwd: PathBuf,
        /// the command that failed
        command: String,
        /// its exit code, or -1 if terminated by a signal
        code: i32,
    },
    /// the runner was interrupted by SIGINT/SIGTERM
    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// the process exit code this error maps to, per the documented exit-code taxonomy
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoTaskGiven
            | Self::BadTaskInvocation(_)
            | Self::ClapError(_)
            | Self::BadEnvOverride(_) => 1,
            Self::ChildFailure { code, .. } => *code,
            Self::Interrupted => 130,
            _ => 2,
        }
    }
}
