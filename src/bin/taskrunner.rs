#![doc = include_str!("../../README.md")]

use std::collections::BTreeMap;
use std::path::PathBuf;

use taskrunner::error::Error;
use taskrunner::executor::{self, ExecutionOptions};
use taskrunner::filesystem::RealFilesystem;
use taskrunner::resolver::{self, ExecutionPlan};
use taskrunner::{manifest, task};
use tracing::instrument;
use tracing_subscriber::{
    EnvFilter, Layer as _, Registry, filter::LevelFilter, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

/// The Clap type for all the commandline parameters.
#[derive(clap::Parser, Debug)]
#[clap(name = "taskrunner",
       about = clap::crate_description!(),
       author = clap::crate_authors!(),
       version = clap::crate_version!(),
       )]
struct Options {
    /// explicit path to a manifest, bypassing upward discovery
    #[clap(short = 'f', long)]
    file: Option<PathBuf>,
    /// directory to start manifest discovery from, and the default task working directory
    #[clap(long)]
    cwd: Option<PathBuf>,
    /// list the tasks declared in the discovered manifest and exit
    #[clap(short, long)]
    list: bool,
    /// print the resolved plan instead of running it
    #[clap(short = 'n', long)]
    dry_run: bool,
    /// `KEY=VALUE` environment override, may be repeated; takes precedence over task/step env
    #[clap(short = 'e', long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,
    /// path to a `KEY=VALUE` file whose contents are applied with the same precedence as `-e`
    #[clap(long)]
    env_file: Option<PathBuf>,
    /// generate man pages into this directory and exit
    #[clap(long)]
    generate_manpage: Option<PathBuf>,
    /// generate shell completion for the given shell and exit
    #[clap(long)]
    generate_shell_completion: Option<clap_complete::aot::Shell>,
    /// `NAME [args...] [: NAME [args...]]*`
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    invocation: Vec<String>,
}

/// Splits a flat `[NAME, arg, arg, ":", NAME, arg, ...]` token stream into invocations.
///
/// # Errors
///
/// Returns [`Error::BadTaskInvocation`] for a dangling `:` (no name following it) or
/// [`Error::NoTaskGiven`] if `tokens` is empty.
fn parse_invocations(tokens: &[String]) -> Result<Vec<(String, Vec<String>)>, Error> {
    if tokens.is_empty() {
        return Err(Error::NoTaskGiven);
    }
    let mut invocations = Vec::new();
    for chunk in tokens.split(|token| token == ":") {
        let Some((name, args)) = chunk.split_first() else {
            return Err(Error::BadTaskInvocation(
                "`:` must be followed by a task name".to_string(),
            ));
        };
        invocations.push((name.clone(), args.to_vec()));
    }
    Ok(invocations)
}

/// Parses a single `-e KEY=VALUE` override.
fn parse_env_override(raw: &str) -> Result<(String, String), Error> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| Error::BadEnvOverride(raw.to_string()))
}

/// Prints the discovered manifest's task names and their `help` line, one task per line.
#[expect(clippy::print_stdout, reason = "this is part of the UI, not logging")]
fn list_tasks(tasks: &BTreeMap<String, task::Task>) {
    for (name, task) in tasks {
        match &task.help {
            Some(help) => println!("{name}\t{help}"),
            None => println!("{name}"),
        }
    }
}

/// Expands a leading `~` (or `~/...`) in a user-supplied path to the home directory, the way a
/// shell would before a command ever sees the argument.
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    let Some(rest) = path.to_str().and_then(|s| s.strip_prefix('~')) else {
        return path.to_path_buf();
    };
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    home.join(rest)
}

/// The main behaviour of the binary: manifest discovery, task resolution and execution.
///
/// # Errors
///
/// Returns an [`Error`] for any failure in option parsing, manifest discovery, normalization,
/// resolution or execution; on success returns the aggregate exit code of the executed plan(s).
#[instrument(skip(options))]
fn do_stuff(options: &Options) -> Result<i32, Error> {
    let fs = RealFilesystem;
    let start_dir = options
        .cwd
        .as_deref()
        .map(expand_tilde)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let explicit_manifest = options.file.as_deref().map(expand_tilde);

    let discovered = manifest::discover(&fs, &start_dir, explicit_manifest.as_deref())?;
    let tasks = task::normalize_all(&discovered.path, &discovered.tasks)?;

    if options.list {
        list_tasks(&tasks);
        return Ok(0);
    }

    let mut cli_env_overrides = BTreeMap::new();
    if let Some(env_file) = &options.env_file {
        cli_env_overrides.extend(taskrunner::envfile::load(&fs, &expand_tilde(env_file))?);
    }
    for raw in &options.env {
        let (key, value) = parse_env_override(raw)?;
        cli_env_overrides.insert(key, value);
    }

    let execution_options = ExecutionOptions {
        dry_run: options.dry_run,
        cli_env_overrides,
    };

    let invocations = parse_invocations(&options.invocation)?;

    if discovered.members.is_empty() {
        let mut plan: ExecutionPlan = Vec::new();
        for (name, args) in &invocations {
            plan.extend(resolver::resolve(&fs, &discovered.root, &tasks, name, args)?);
        }
        executor::execute(&plan, &execution_options)
    } else {
        let mut last_code = 0;
        for (name, args) in &invocations {
            let code = executor::run_for_members(
                &fs,
                &discovered.root,
                &discovered.members,
                name,
                args,
                &execution_options,
            )?;
            if code != 0 {
                return Ok(code);
            }
            last_code = code;
        }
        Ok(last_code)
    }
}

/// The main function mainly just handles setting up tracing and handling any Err results.
#[tokio::main]
async fn main() -> Result<(), Error> {
    let terminal_env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))?;
    let file_env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::TRACE.into())
        .parse(std::env::var("RUNNER_LOG").unwrap_or_else(|_| "trace".to_string()))?;
    #[cfg(target_os = "linux")]
    let journald_env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::TRACE.into())
        .parse(std::env::var("RUNNER_JOURNALD_LOG").unwrap_or_else(|_| "info".to_string()))?;

    let registry = Registry::default();
    let registry =
        registry.with(tracing_subscriber::fmt::Layer::default().with_filter(terminal_env_filter));
    let log_dir = std::env::var("RUNNER_LOG_DIR");
    let file_layer = if let Ok(log_dir) = log_dir {
        let log_file =
            std::env::var("RUNNER_LOG_FILE").unwrap_or_else(|_| "taskrunner.log".to_string());
        let file_appender = tracing_appender::rolling::never(log_dir, log_file);
        Some(
            tracing_subscriber::fmt::Layer::default()
                .with_writer(file_appender)
                .with_filter(file_env_filter),
        )
    } else {
        None
    };
    let registry = registry.with(file_layer);
    #[cfg(target_os = "linux")]
    let registry = registry.with(
        tracing_journald::layer()
            .map_err(Error::TracingJournaldError)?
            .with_filter(journald_env_filter),
    );
    registry.init();
    log_panics::init();

    let options = <Options as clap::Parser>::parse();
    tracing::debug!("{:#?}", options);

    if let Some(output_dir) = &options.generate_manpage {
        clap_mangen::generate_to(<Options as clap::CommandFactory>::command(), output_dir)
            .map_err(Error::GenerateManpageError)?;
        return Ok(());
    }
    if let Some(shell) = options.generate_shell_completion {
        let mut out = std::io::stdout();
        let mut command = <Options as clap::CommandFactory>::command();
        clap_complete::generate(shell, &mut command, "taskrunner", &mut out);
        return Ok(());
    }

    #[expect(
        clippy::print_stderr,
        reason = "this is the final print in our error chain and tracing output may not be visible to the user"
    )]
    match do_stuff(&options) {
        Ok(code) => {
            tracing::debug!(code, "exiting");
            std::process::exit(code);
        }
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_a_single_invocation() {
        let invocations = parse_invocations(&tok(&["build", "--release"])).expect("should parse");
        assert_eq!(invocations, vec![("build".to_string(), tok(&["--release"]))]);
    }

    #[test]
    fn parses_chained_invocations_separated_by_colon() {
        let invocations =
            parse_invocations(&tok(&["lint", ":", "test", "--all"])).expect("should parse");
        assert_eq!(
            invocations,
            vec![
                ("lint".to_string(), Vec::new()),
                ("test".to_string(), tok(&["--all"])),
            ]
        );
    }

    #[test]
    fn empty_invocation_is_an_error() {
        let err = parse_invocations(&[]).unwrap_err();
        assert!(matches!(err, Error::NoTaskGiven));
    }

    #[test]
    fn dangling_colon_is_an_error() {
        let err = parse_invocations(&tok(&["build", ":"])).unwrap_err();
        assert!(matches!(err, Error::BadTaskInvocation(_)));
    }

    #[test]
    fn env_override_parses_key_value() {
        let (key, value) = parse_env_override("FOO=bar").expect("should parse");
        assert_eq!(key, "FOO");
        assert_eq!(value, "bar");
    }

    #[test]
    fn env_override_without_equals_is_an_error() {
        let err = parse_env_override("FOO").unwrap_err();
        assert!(matches!(err, Error::BadEnvOverride(_)));
    }
}
