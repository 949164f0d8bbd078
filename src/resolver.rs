//! Converts a `(task_name, args)` request, plus a loaded manifest's task table, into a flat
//! [`ExecutionPlan`]: expanding composite tasks, matching glob patterns over task names,
//! forwarding caller arguments per `crate::argstring`, and detecting cycles.
//!
//! Patterns are matched with ordered-insertion set semantics, not expanded lazily during a
//! single walk, so that an exclude later in the same composite can remove a name an earlier
//! include pattern matched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::argstring;
use crate::envfile;
use crate::error::Error;
use crate::filesystem::Filesystem;
use crate::pattern::{self, StepToken};
use crate::task::{Body, Task};

/// A single resolved step's command form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCommand {
    /// run through the user's shell (`$SHELL -c <text>` or the platform equivalent)
    Shell(String),
    /// exec'd directly, already tokenized
    Argv(Vec<String>),
}

/// One flattened, fully resolved unit of execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// the command to run
    pub resolved_command: ResolvedCommand,
    /// the absolute directory to run it in
    pub cwd: PathBuf,
    /// environment to layer over the process environment (right-biased)
    pub env: BTreeMap<String, String>,
    /// whether a non-zero exit from this step should abort the remainder of the plan
    pub keep_going: bool,
    /// the name of the task this step was produced from
    pub source_task_name: String,
}

/// An ordered sequence of [`PlanStep`]s, ready to hand to `crate::executor`.
pub type ExecutionPlan = Vec<PlanStep>;

/// Resolves `task_name` against `tasks`, forwarding `args` to it (subject to the argument
/// forwarding rule below). Sub-references reached through composites receive no forwarded args.
///
/// # Errors
///
/// Returns [`Error::UnknownTask`], [`Error::CyclicTask`], [`Error::PatternMatchedNothing`],
/// [`Error::BadPlaceholder`], [`Error::BadStep`], [`Error::EnvFileReadError`] or
/// [`Error::EnvFileMalformed`] as documented on the respective variants.
pub fn resolve(
    fs: &impl Filesystem,
    manifest_root: &Path,
    tasks: &BTreeMap<String, Task>,
    task_name: &str,
    args: &[String],
) -> Result<ExecutionPlan, Error> {
    let mut stack = Vec::new();
    expand_task(
        fs,
        manifest_root,
        tasks,
        task_name,
        args,
        &BTreeMap::new(),
        None,
        &mut stack,
    )
}

/// Expands a single task reference into its flattened sub-plan, pushing `task_name` onto `stack`
/// for the duration (cycle guard).
fn expand_task(
    fs: &impl Filesystem,
    manifest_root: &Path,
    tasks: &BTreeMap<String, Task>,
    task_name: &str,
    args: &[String],
    inherited_env: &BTreeMap<String, String>,
    inherited_cwd: Option<&Path>,
    stack: &mut Vec<String>,
) -> Result<ExecutionPlan, Error> {
    let Some(task) = tasks.get(task_name) else {
        return Err(Error::UnknownTask(task_name.to_string()));
    };
    if stack.iter().any(|name| name == task_name) {
        let mut cycle = stack.clone();
        cycle.push(task_name.to_string());
        return Err(Error::CyclicTask(cycle));
    }
    stack.push(task_name.to_string());

    let mut env = inherited_env.clone();
    env.extend(effective_task_env(fs, manifest_root, task)?);
    let cwd = task.cwd.as_deref().or(inherited_cwd);

    let plan = match &task.body {
        Body::Command {
            text,
            argv,
            allow_shell,
        } => vec![resolve_command_step(
            task,
            text,
            argv.as_deref(),
            *allow_shell,
            args,
            &env,
            cwd,
            manifest_root,
        )?],
        Body::Steps(steps) => {
            resolve_composite(fs, manifest_root, tasks, task, steps, &env, cwd, stack)?
        }
    };

    stack.pop();
    Ok(plan)
}

/// Resolves an optional task/parent `cwd` against `manifest_root`: a relative `cwd` is joined
/// onto the manifest root (per the documented "relative to the manifest root" semantics), an
/// absolute one is used as-is, and `None` falls back to the manifest root itself.
fn resolve_cwd(manifest_root: &Path, cwd: Option<&Path>) -> PathBuf {
    match cwd {
        None => manifest_root.to_path_buf(),
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => manifest_root.join(path),
    }
}

/// Merges a task's `env_file` (if any) beneath its `env` table.
fn effective_task_env(
    fs: &impl Filesystem,
    manifest_root: &Path,
    task: &Task,
) -> Result<BTreeMap<String, String>, Error> {
    let mut env = BTreeMap::new();
    if let Some(env_file) = &task.env_file {
        let path = if env_file.is_absolute() {
            env_file.clone()
        } else {
            manifest_root.join(env_file)
        };
        env.extend(envfile::load(fs, &path)?);
    }
    env.extend(task.env.clone());
    Ok(env)
}

/// Builds the single [`PlanStep`] for a `Command` body, applying argument interpolation and the
/// "forward unused args" auto-append rule, unless `task.verbatim` suppresses it.
fn resolve_command_step(
    task: &Task,
    text: &str,
    argv: Option<&[String]>,
    allow_shell: bool,
    args: &[String],
    env: &BTreeMap<String, String>,
    cwd: Option<&Path>,
    manifest_root: &Path,
) -> Result<PlanStep, Error> {
    let resolved_command = if allow_shell {
        let final_text = if task.verbatim {
            text.to_string()
        } else {
            let interpolated = argstring::interpolate(text, args)?;
            let mut resolved_text = interpolated.text;
            if interpolated.forwards_nothing() && !args.is_empty() {
                if !resolved_text.is_empty() {
                    resolved_text.push(' ');
                }
                resolved_text.push_str(&args.join(" "));
            }
            resolved_text
        };
        ResolvedCommand::Shell(final_text)
    } else {
        let argv = argv.unwrap_or_default();
        let final_argv = if task.verbatim {
            argv.to_vec()
        } else {
            let mut out = Vec::with_capacity(argv.len());
            let mut any_consumed = false;
            let mut used_all = false;
            for element in argv {
                let interpolated = argstring::interpolate(element, args)?;
                if !interpolated.consumed.is_empty() {
                    any_consumed = true;
                }
                if interpolated.used_all {
                    used_all = true;
                }
                out.push(interpolated.text);
            }
            if !any_consumed && !used_all {
                out.extend(args.iter().cloned());
            }
            out
        };
        ResolvedCommand::Argv(final_argv)
    };

    Ok(PlanStep {
        resolved_command,
        cwd: resolve_cwd(manifest_root, cwd),
        env: env.clone(),
        keep_going: task.keep_going,
        source_task_name: task.name.clone(),
    })
}

/// A single entry in the flattened composite sequence: either a reference-resolved task name
/// (expanded into its own sub-plan) or an inline command step, in the order each first appeared.
enum CompositeEntry {
    /// a resolved reference, expanded recursively
    TaskName(String),
    /// a step that is not a task reference, run verbatim (no interpolation, no forwarding)
    Inline(String),
}

/// Expands a composite task's raw step list into a flat plan.
#[expect(clippy::too_many_arguments, reason = "mirrors the resolver's single recursive walk")]
fn resolve_composite(
    fs: &impl Filesystem,
    manifest_root: &Path,
    tasks: &BTreeMap<String, Task>,
    owning_task: &Task,
    steps: &[String],
    env: &BTreeMap<String, String>,
    cwd: Option<&Path>,
    stack: &mut Vec<String>,
) -> Result<ExecutionPlan, Error> {
    let all_names: BTreeSet<String> = tasks.keys().cloned().collect();

    let mut ordered: Vec<CompositeEntry> = Vec::new();
    let mut included_names: BTreeSet<String> = BTreeSet::new();
    let mut any_include_matched = false;
    let mut first_failed_pattern: Option<String> = None;

    let mut include = |text: &str,
                        ordered: &mut Vec<CompositeEntry>,
                        included_names: &mut BTreeSet<String>,
                        any_include_matched: &mut bool,
                        first_failed_pattern: &mut Option<String>|
     -> Result<(), Error> {
        let matched = resolve_reference_names(text, &all_names)?;
        if matched.is_empty() {
            if first_failed_pattern.is_none() {
                *first_failed_pattern = Some(text.to_string());
            }
        } else {
            *any_include_matched = true;
        }
        for name in matched {
            if included_names.insert(name.clone()) {
                ordered.push(CompositeEntry::TaskName(name));
            }
        }
        Ok(())
    };

    for raw in steps {
        match pattern::parse_step(raw)? {
            StepToken::Include(text) => include(
                &text,
                &mut ordered,
                &mut included_names,
                &mut any_include_matched,
                &mut first_failed_pattern,
            )?,
            StepToken::Exclude(text) => {
                for name in resolve_reference_names(&text, &all_names)? {
                    if included_names.remove(&name) {
                        ordered.retain(
                            |entry| !matches!(entry, CompositeEntry::TaskName(n) if n == &name),
                        );
                    }
                }
            }
            StepToken::Bare(text) => {
                if all_names.contains(&text) {
                    any_include_matched = true;
                    if included_names.insert(text.clone()) {
                        ordered.push(CompositeEntry::TaskName(text));
                    }
                } else if pattern::is_pattern(&text) {
                    include(
                        &text,
                        &mut ordered,
                        &mut included_names,
                        &mut any_include_matched,
                        &mut first_failed_pattern,
                    )?;
                } else {
                    ordered.push(CompositeEntry::Inline(text));
                }
            }
        }
    }

    if included_names.is_empty() && !any_include_matched {
        if let Some(pattern_text) = first_failed_pattern {
            return Err(Error::PatternMatchedNothing(pattern_text));
        }
    }

    let mut plan = Vec::new();
    for entry in ordered {
        match entry {
            CompositeEntry::TaskName(name) => {
                let sub_plan =
                    expand_task(fs, manifest_root, tasks, &name, &[], env, cwd, stack)?;
                plan.extend(sub_plan);
            }
            CompositeEntry::Inline(text) => {
                plan.push(PlanStep {
                    resolved_command: ResolvedCommand::Shell(text),
                    cwd: resolve_cwd(manifest_root, cwd),
                    env: env.clone(),
                    keep_going: owning_task.keep_going,
                    source_task_name: owning_task.name.clone(),
                });
            }
        }
    }
    Ok(plan)
}

/// Resolves a composite reference's text (after any `+`/`-`/`!` sigil has been stripped) to the
/// set of task names it denotes: an exact match wins outright; otherwise, if it looks like a
/// glob, it is matched against every task name (possibly matching none); otherwise it is an
/// unresolvable reference.
fn resolve_reference_names(text: &str, all_names: &BTreeSet<String>) -> Result<Vec<String>, Error> {
    if all_names.contains(text) {
        return Ok(vec![text.to_string()]);
    }
    if pattern::is_pattern(text) {
        return Ok(all_names
            .iter()
            .filter(|name| pattern::glob_match(text, name))
            .cloned()
            .collect());
    }
    Err(Error::UnknownTask(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFilesystem;
    use pretty_assertions::assert_eq;

    fn command_task(name: &str, text: &str) -> Task {
        Task {
            name: name.to_string(),
            help: None,
            cwd: None,
            env: BTreeMap::new(),
            env_file: None,
            keep_going: false,
            verbatim: false,
            body: Body::Command {
                text: text.to_string(),
                argv: None,
                allow_shell: true,
            },
        }
    }

    fn steps_task(name: &str, steps: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            help: None,
            cwd: None,
            env: BTreeMap::new(),
            env_file: None,
            keep_going: false,
            verbatim: false,
            body: Body::Steps(steps.iter().map(ToString::to_string).collect()),
        }
    }

    fn tasks(list: Vec<Task>) -> BTreeMap<String, Task> {
        list.into_iter().map(|t| (t.name.clone(), t)).collect()
    }

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn simple_command_appends_unused_args() {
        let tasks = tasks(vec![command_task("greet", "echo hi")]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "greet", &args(&["world"]))
            .expect("should resolve");
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan[0].resolved_command,
            ResolvedCommand::Shell("echo hi world".to_string())
        );
    }

    #[test]
    fn placeholder_template_suppresses_auto_append() {
        let tasks = tasks(vec![command_task("greet", "echo ${1:-stranger}")]);
        let fs = MemoryFilesystem::new();
        let no_args = resolve(&fs, Path::new("/project"), &tasks, "greet", &args(&[]))
            .expect("should resolve");
        assert_eq!(
            no_args[0].resolved_command,
            ResolvedCommand::Shell("echo stranger".to_string())
        );
        let with_arg = resolve(&fs, Path::new("/project"), &tasks, "greet", &args(&["alice"]))
            .expect("should resolve");
        assert_eq!(
            with_arg[0].resolved_command,
            ResolvedCommand::Shell("echo alice".to_string())
        );
    }

    #[test]
    fn composite_expands_pattern_and_honors_exclude() {
        let tasks = tasks(vec![
            steps_task("lint", &["ruff-*", "-ruff-docs"]),
            command_task("ruff-fmt", "ruff format"),
            command_task("ruff-lint", "ruff check"),
            command_task("ruff-docs", "ruff docs"),
        ]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "lint", &args(&[]))
            .expect("should resolve");
        let names: Vec<&str> = plan.iter().map(|s| s.source_task_name.as_str()).collect();
        assert_eq!(names, vec!["ruff-fmt", "ruff-lint"]);
    }

    #[test]
    fn cyclic_composite_is_detected() {
        let tasks = tasks(vec![steps_task("a", &["b"]), steps_task("b", &["a"])]);
        let fs = MemoryFilesystem::new();
        let err = resolve(&fs, Path::new("/project"), &tasks, "a", &args(&[])).unwrap_err();
        match err {
            Error::CyclicTask(cycle) => assert_eq!(cycle, vec!["a", "b", "a"]),
            other => panic!("expected CyclicTask, got {other:?}"),
        }
    }

    #[test]
    fn unknown_task_is_an_error() {
        let tasks = tasks(vec![]);
        let fs = MemoryFilesystem::new();
        let err = resolve(&fs, Path::new("/project"), &tasks, "missing", &args(&[])).unwrap_err();
        assert!(matches!(err, Error::UnknownTask(name) if name == "missing"));
    }

    #[test]
    fn pattern_matching_nothing_is_fatal_only_when_composite_ends_up_empty() {
        let tasks = tasks(vec![steps_task("lint", &["nothing-*"])]);
        let fs = MemoryFilesystem::new();
        let err = resolve(&fs, Path::new("/project"), &tasks, "lint", &args(&[])).unwrap_err();
        assert!(matches!(err, Error::PatternMatchedNothing(p) if p == "nothing-*"));
    }

    #[test]
    fn args_are_not_forwarded_into_composite_sub_tasks() {
        let tasks = tasks(vec![
            steps_task("ci", &["build"]),
            command_task("build", "cargo build"),
        ]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "ci", &args(&["--release"]))
            .expect("should resolve");
        assert_eq!(
            plan[0].resolved_command,
            ResolvedCommand::Shell("cargo build".to_string())
        );
    }

    #[test]
    fn inline_composite_steps_are_taken_verbatim() {
        let tasks = tasks(vec![steps_task("ci", &["echo hello $1"])]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "ci", &args(&["world"]))
            .expect("should resolve");
        assert_eq!(
            plan[0].resolved_command,
            ResolvedCommand::Shell("echo hello $1".to_string())
        );
    }

    #[test]
    fn env_layers_over_inherited_env_with_sub_task_winning() {
        let mut parent = steps_task("ci", &["build"]);
        parent.env.insert("SCOPE".to_string(), "parent".to_string());
        parent.env.insert("ONLY_PARENT".to_string(), "1".to_string());
        let mut child = command_task("build", "cargo build");
        child.env.insert("SCOPE".to_string(), "child".to_string());
        let tasks = tasks(vec![parent, child]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "ci", &args(&[]))
            .expect("should resolve");
        assert_eq!(plan[0].env.get("SCOPE").map(String::as_str), Some("child"));
        assert_eq!(plan[0].env.get("ONLY_PARENT").map(String::as_str), Some("1"));
    }

    #[test]
    fn cwd_falls_back_through_task_then_parent_then_manifest_root() {
        let mut child = command_task("build", "cargo build");
        child.cwd = Some(PathBuf::from("crates/core"));
        let tasks = tasks(vec![child]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "build", &args(&[]))
            .expect("should resolve");
        assert_eq!(plan[0].cwd, PathBuf::from("/project/crates/core"));
    }

    #[test]
    fn cwd_defaults_to_manifest_root_when_unset() {
        let tasks = tasks(vec![command_task("build", "cargo build")]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "build", &args(&[]))
            .expect("should resolve");
        assert_eq!(plan[0].cwd, PathBuf::from("/project"));
    }

    #[test]
    fn sequence_cmd_forwards_unused_args_as_extra_argv_elements() {
        let mut task = command_task("build", "");
        task.body = Body::Command {
            text: "cargo build".to_string(),
            argv: Some(vec!["cargo".to_string(), "build".to_string()]),
            allow_shell: false,
        };
        let tasks = tasks(vec![task]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "build", &args(&["--release"]))
            .expect("should resolve");
        assert_eq!(
            plan[0].resolved_command,
            ResolvedCommand::Argv(vec![
                "cargo".to_string(),
                "build".to_string(),
                "--release".to_string()
            ])
        );
    }

    #[test]
    fn verbatim_task_suppresses_interpolation() {
        let mut task = command_task("greet", "echo $1");
        task.verbatim = true;
        let tasks = tasks(vec![task]);
        let fs = MemoryFilesystem::new();
        let plan = resolve(&fs, Path::new("/project"), &tasks, "greet", &args(&["world"]))
            .expect("should resolve");
        assert_eq!(
            plan[0].resolved_command,
            ResolvedCommand::Shell("echo $1".to_string())
        );
    }
}
