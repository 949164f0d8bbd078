//! Runs a resolved [`crate::resolver::ExecutionPlan`]: spawns each step's process in turn,
//! layering environment variables, honoring each step's working directory and keep-going policy,
//! and aggregating an overall exit code. Also renders a dry-run preview without spawning anything,
//! and fans a single invocation out across declared workspace members.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::instrument;

use crate::error::Error;
use crate::filesystem::Filesystem;
use crate::manifest;
use crate::resolver::{self, ExecutionPlan, PlanStep, ResolvedCommand};
use crate::task::Task;

/// Options governing how a plan is executed, independent of the plan's own steps.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// if true, print each step instead of spawning it
    pub dry_run: bool,
    /// `-e KEY=VALUE` overrides from the command line; applied over every step's own environment
    pub cli_env_overrides: BTreeMap<String, String>,
}

/// Executes `plan` in order.
///
/// A step whose owning task does not have `keep_going` set aborts the remainder of the plan on
/// non-zero exit, surfaced as [`Error::ChildFailure`]. A `keep_going` step's failure is logged
/// at `warn` and does not stop the plan; the last such code seen is returned if every step ran.
/// An interrupt (Ctrl-C) kills the in-flight child and aborts immediately with
/// [`Error::Interrupted`].
///
/// # Errors
///
/// Returns [`Error::CommandExecutionError`] if a child process could not be spawned at all,
/// [`Error::ChildFailure`] if a non-`keep_going` step exits non-zero, or
/// [`Error::Interrupted`] if the run is interrupted.
pub fn execute(plan: &ExecutionPlan, options: &ExecutionOptions) -> Result<i32, Error> {
    if options.dry_run {
        for step in plan {
            print_dry_run_step(step);
        }
        return Ok(0);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupted);
    // best-effort: a second `execute` call in the same process simply replaces the handler
    if let Err(source) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        tracing::debug!(%source, "could not install interrupt handler");
    }

    let mut last_code = 0;
    for step in plan {
        let code = run_step(step, options, &interrupted)?;
        if code != 0 {
            let command = describe_command(&step.resolved_command);
            if step.keep_going {
                tracing::warn!(
                    command = %command,
                    cwd = %step.cwd.display(),
                    code,
                    "step failed, continuing (keep_going)"
                );
                last_code = code;
            } else {
                return Err(Error::ChildFailure {
                    cwd: step.cwd.clone(),
                    command,
                    code,
                });
            }
        }
        if interrupted.load(Ordering::SeqCst) {
            return Err(Error::Interrupted);
        }
    }
    Ok(last_code)
}

/// Spawns and waits for a single step, polling `interrupted` while the child runs.
#[instrument(skip(options, interrupted))]
fn run_step(
    step: &PlanStep,
    options: &ExecutionOptions,
    interrupted: &Arc<AtomicBool>,
) -> Result<i32, Error> {
    let mut cmd = match &step.resolved_command {
        ResolvedCommand::Shell(text) => {
            let (shell, flag) = shell_command();
            let mut cmd = Command::new(shell);
            cmd.arg(flag).arg(text);
            cmd
        }
        ResolvedCommand::Argv(argv) => {
            let Some((program, rest)) = argv.split_first() else {
                return Ok(0);
            };
            let mut cmd = Command::new(program);
            cmd.args(rest);
            cmd
        }
    };

    cmd.current_dir(&step.cwd);
    for (key, value) in &step.env {
        cmd.env(key, value);
    }
    for (key, value) in &options.cli_env_overrides {
        cmd.env(key, value);
    }

    let command_text = describe_command(&step.resolved_command);
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| Error::CommandExecutionError {
        cwd: step.cwd.clone(),
        command: command_text.clone(),
        source,
    })?;

    let status = loop {
        if interrupted.load(Ordering::SeqCst) {
            wait_out_interrupt(&mut child);
            return Err(Error::Interrupted);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => std::thread::sleep(std::time::Duration::from_millis(25)),
            Err(source) => {
                return Err(Error::CommandExecutionError {
                    cwd: step.cwd.clone(),
                    command: command_text,
                    source,
                });
            }
        }
    };

    tracing::debug!(
        command = %command_text,
        elapsed = %humantime::format_duration(start.elapsed()),
        "step finished"
    );

    Ok(status.code().unwrap_or(-1))
}

/// How many 25ms polls to wait for a child to exit on its own after being sent an interrupt,
/// before escalating to a hard kill. ~2 seconds.
const INTERRUPT_GRACE_POLLS: u32 = 80;

/// Forwards the user's interrupt to `child` and waits up to a short grace period for it to exit
/// on its own, escalating to a hard kill (and reaping it) if it hasn't by then.
fn wait_out_interrupt(child: &mut std::process::Child) {
    forward_interrupt(child);

    let mut remaining_polls = INTERRUPT_GRACE_POLLS;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {
                remaining_polls = remaining_polls.saturating_sub(1);
                if remaining_polls == 0 {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(25));
            }
            Err(source) => {
                tracing::debug!(%source, "could not poll interrupted child");
                break;
            }
        }
    }

    if let Err(source) = child.kill() {
        tracing::debug!(%source, "could not kill interrupted child");
    }
    if let Err(source) = child.wait() {
        tracing::debug!(%source, "could not reap interrupted child");
    }
}

/// Sends the actual interrupt signal (`SIGINT`) to `child`, so a child that handles it can shut
/// down gracefully instead of being hard-killed outright.
#[cfg(unix)]
fn forward_interrupt(child: &std::process::Child) {
    match i32::try_from(child.id()) {
        Ok(raw_pid) => {
            let pid = nix::unistd::Pid::from_raw(raw_pid);
            if let Err(source) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGINT) {
                tracing::debug!(%source, "could not send SIGINT to child");
            }
        }
        Err(source) => {
            tracing::debug!(%source, "child pid does not fit a signed pid_t, cannot signal it");
        }
    }
}

/// Windows has no `SIGINT`-equivalent signal deliverable through the standard library, so an
/// interrupted child is killed outright once the grace period elapses.
#[cfg(windows)]
fn forward_interrupt(_child: &std::process::Child) {}

/// Prints a step's would-be command, cwd and environment additions without running it.
#[expect(clippy::print_stdout, reason = "this is the dry-run UI, not logging")]
fn print_dry_run_step(step: &PlanStep) {
    println!(
        "[{}] cwd={} command={}",
        step.source_task_name,
        step.cwd.display(),
        describe_command(&step.resolved_command)
    );
    for (key, value) in &step.env {
        println!("  env: {key}={value}");
    }
}

/// A human-readable rendering of a resolved command, for error messages, logging and dry-run.
fn describe_command(command: &ResolvedCommand) -> String {
    match command {
        ResolvedCommand::Shell(text) => text.clone(),
        ResolvedCommand::Argv(argv) => argv.join(" "),
    }
}

/// Returns the shell program and the flag used to hand it an inline command string.
#[cfg(unix)]
fn shell_command() -> (String, &'static str) {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    (shell, "-c")
}

/// Returns the shell program and the flag used to hand it an inline command string.
#[cfg(windows)]
fn shell_command() -> (String, &'static str) {
    let shell = std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string());
    (shell, "/C")
}

/// Resolves and runs `task_name` once per declared workspace member, in declaration order.
///
/// Members are treated as literal relative directory paths (not glob patterns): each is
/// independently re-discovered as its own manifest. A member's non-`keep_going` step failure
/// surfaces as [`Error::ChildFailure`] and aborts the remaining members (`execute`'s own
/// semantics propagate unchanged); a `keep_going` failure is absorbed and the last such code is
/// returned once every member has run.
///
/// # Errors
///
/// Propagates any [`Error`] from manifest discovery, resolution or execution of a member.
pub fn run_for_members(
    fs: &impl Filesystem,
    manifest_root: &Path,
    members: &[String],
    task_name: &str,
    args: &[String],
    options: &ExecutionOptions,
) -> Result<i32, Error> {
    let mut last_code = 0;
    for member in members {
        let member_dir: PathBuf = manifest_root.join(member);
        let member_manifest = manifest::discover(fs, &member_dir, None)?;
        let tasks: BTreeMap<String, Task> =
            crate::task::normalize_all(&member_manifest.path, &member_manifest.tasks)?;
        let plan = resolver::resolve(fs, &member_manifest.root, &tasks, task_name, args)?;
        let code = execute(&plan, options)?;
        if code != 0 {
            last_code = code;
        }
    }
    Ok(last_code)
}
