//! Canonical task data model and the normalizer that folds the three raw task shapes (bare
//! string, sequence of steps, structured record) into it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// The recognized structured-record keys, used to reject unknown ones (`UnknownTaskKey`).
const RECOGNIZED_KEYS: &[&str] = &[
    "help",
    "cwd",
    "env",
    "env_file",
    "keep_going",
    "verbatim",
    "shell",
    "cmd",
    "composite",
];

/// The body of a normalized [`Task`]: either a single command line, or a composite made of raw
/// step entries. Step entries are left unresolved (a bare string may turn out to be an inline
/// command or a reference/pattern) since that decision needs the full task table and is made by
/// the resolver, not here.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Body {
    /// a single command, plus whether it should be exec'd directly (argv) or via a shell
    Command {
        /// the command text, or the joined display form if it was given as a sequence
        text: String,
        /// tokenized form, set only when the record's `cmd` key was a sequence of strings
        argv: Option<Vec<String>>,
        /// whether this command should be run through `$SHELL -c` rather than exec'd directly
        allow_shell: bool,
    },
    /// an ordered sequence of raw step entries, lexically classified by `crate::pattern`
    Steps(Vec<String>),
}

/// A task, normalized from whichever raw shape the manifest declared it in.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Task {
    /// the task's name
    pub name: String,
    /// optional single-line description
    pub help: Option<String>,
    /// working directory override, relative to the manifest root
    pub cwd: Option<PathBuf>,
    /// environment variables merged over the inherited environment
    pub env: BTreeMap<String, String>,
    /// optional path (relative to the manifest root) to a `KEY=VALUE` env file
    pub env_file: Option<PathBuf>,
    /// when true, a non-zero exit from a step does not abort the plan
    pub keep_going: bool,
    /// when true, argument forwarding is suppressed and the command text is used exactly
    pub verbatim: bool,
    /// the task's body
    pub body: Body,
}

/// Normalizes every entry of a manifest's raw task table.
///
/// # Errors
///
/// Returns the first validation error encountered (`UnknownTaskKey`, `AmbiguousTaskBody`,
/// `EmptyTaskBody`, or `InvalidTaskName`).
pub fn normalize_all(
    path: &Path,
    raw: &BTreeMap<String, toml::Value>,
) -> Result<BTreeMap<String, Task>, Error> {
    raw.iter()
        .map(|(name, value)| {
            validate_name(name)?;
            let task = normalize_one(path, name, value)?;
            Ok((name.clone(), task))
        })
        .collect()
}

/// Rejects task names that are empty or contain whitespace.
fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidTaskName(name.to_string()));
    }
    Ok(())
}

fn normalize_one(path: &Path, name: &str, value: &toml::Value) -> Result<Task, Error> {
    match value {
        toml::Value::String(command) => Ok(Task {
            name: name.to_string(),
            help: None,
            cwd: None,
            env: BTreeMap::new(),
            env_file: None,
            keep_going: false,
            verbatim: false,
            body: Body::Command {
                text: command.clone(),
                argv: None,
                allow_shell: true,
            },
        }),
        toml::Value::Array(entries) => {
            let steps = entries
                .iter()
                .map(|entry| {
                    entry.as_str().map(ToString::to_string).ok_or_else(|| {
                        Error::BadStep {
                            step: entry.to_string(),
                            detail: "composite step entries must be strings".to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Task {
                name: name.to_string(),
                help: None,
                cwd: None,
                env: BTreeMap::new(),
                env_file: None,
                keep_going: false,
                verbatim: false,
                body: Body::Steps(steps),
            })
        }
        toml::Value::Table(table) => normalize_record(path, name, table),
        other => Err(Error::ManifestParse {
            path: path.to_path_buf(),
            detail: format!("task `{name}` has an unsupported shape: {other}"),
        }),
    }
}

fn normalize_record(
    path: &Path,
    name: &str,
    table: &toml::map::Map<String, toml::Value>,
) -> Result<Task, Error> {
    for key in table.keys() {
        if !RECOGNIZED_KEYS.contains(&key.as_str()) {
            return Err(Error::UnknownTaskKey {
                path: path.to_path_buf(),
                task: name.to_string(),
                key: key.clone(),
            });
        }
    }

    let help = table
        .get("help")
        .and_then(toml::Value::as_str)
        .map(ToString::to_string);
    let cwd = table
        .get("cwd")
        .and_then(toml::Value::as_str)
        .map(PathBuf::from);
    let env_file = table
        .get("env_file")
        .and_then(toml::Value::as_str)
        .map(PathBuf::from);
    let keep_going = table
        .get("keep_going")
        .and_then(toml::Value::as_bool)
        .unwrap_or(false);
    let verbatim = table
        .get("verbatim")
        .and_then(toml::Value::as_bool)
        .unwrap_or(false);
    let env = table
        .get("env")
        .and_then(toml::Value::as_table)
        .map(|env_table| {
            env_table
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|value| (key.clone(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let body_keys = ["shell", "cmd", "composite"];
    let present: Vec<&&str> = body_keys.iter().filter(|key| table.contains_key(**key)).collect();

    let body = match present.as_slice() {
        [] => {
            return Err(Error::EmptyTaskBody {
                path: path.to_path_buf(),
                task: name.to_string(),
            });
        }
        [key] if **key == "shell" => {
            let text = table
                .get("shell")
                .and_then(toml::Value::as_str)
                .ok_or_else(|| Error::ManifestParse {
                    path: path.to_path_buf(),
                    detail: format!("task `{name}`: `shell` must be a string"),
                })?;
            Body::Command {
                text: text.to_string(),
                argv: None,
                allow_shell: true,
            }
        }
        [key] if **key == "cmd" => normalize_cmd(path, name, &table["cmd"])?,
        [key] if **key == "composite" => {
            let entries = table
                .get("composite")
                .and_then(toml::Value::as_array)
                .ok_or_else(|| Error::ManifestParse {
                    path: path.to_path_buf(),
                    detail: format!("task `{name}`: `composite` must be a sequence"),
                })?;
            let steps = entries
                .iter()
                .map(|entry| {
                    entry.as_str().map(ToString::to_string).ok_or_else(|| {
                        Error::BadStep {
                            step: entry.to_string(),
                            detail: "composite step entries must be strings".to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Body::Steps(steps)
        }
        _ => {
            return Err(Error::AmbiguousTaskBody {
                path: path.to_path_buf(),
                task: name.to_string(),
            });
        }
    };

    Ok(Task {
        name: name.to_string(),
        help,
        cwd,
        env,
        env_file,
        keep_going,
        verbatim,
        body,
    })
}

fn normalize_cmd(path: &Path, name: &str, value: &toml::Value) -> Result<Body, Error> {
    match value {
        toml::Value::String(text) => Ok(Body::Command {
            text: text.clone(),
            argv: None,
            allow_shell: true,
        }),
        toml::Value::Array(entries) => {
            let argv = entries
                .iter()
                .map(|entry| {
                    entry.as_str().map(ToString::to_string).ok_or_else(|| {
                        Error::ManifestParse {
                            path: path.to_path_buf(),
                            detail: format!("task `{name}`: `cmd` sequence entries must be strings"),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let text = argv.join(" ");
            Ok(Body::Command {
                text,
                argv: Some(argv),
                allow_shell: false,
            })
        }
        _ => Err(Error::ManifestParse {
            path: path.to_path_buf(),
            detail: format!("task `{name}`: `cmd` must be a string or a sequence of strings"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, toml::Value)]) -> BTreeMap<String, toml::Value> {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn bare_string_becomes_a_shell_command() {
        let raw = table(&[("build", toml::Value::String("cargo build".to_string()))]);
        let tasks = normalize_all(Path::new("runner.toml"), &raw).expect("should normalize");
        let task = &tasks["build"];
        assert!(matches!(
            &task.body,
            Body::Command { text, allow_shell: true, .. } if text == "cargo build"
        ));
    }

    #[test]
    fn sequence_becomes_steps() {
        let raw = table(&[(
            "ci",
            toml::Value::Array(vec![
                toml::Value::String("lint".to_string()),
                toml::Value::String("test".to_string()),
            ]),
        )]);
        let tasks = normalize_all(Path::new("runner.toml"), &raw).expect("should normalize");
        assert_eq!(
            tasks["ci"].body,
            Body::Steps(vec!["lint".to_string(), "test".to_string()])
        );
    }

    #[test]
    fn record_with_shell_key() {
        let mut record = toml::map::Map::new();
        record.insert("shell".to_string(), toml::Value::String("echo hi".to_string()));
        record.insert("keep_going".to_string(), toml::Value::Boolean(true));
        let raw = table(&[("greet", toml::Value::Table(record))]);
        let tasks = normalize_all(Path::new("runner.toml"), &raw).expect("should normalize");
        let task = &tasks["greet"];
        assert!(task.keep_going);
        assert!(matches!(&task.body, Body::Command { allow_shell: true, .. }));
    }

    #[test]
    fn record_with_cmd_sequence_is_argv() {
        let mut record = toml::map::Map::new();
        record.insert(
            "cmd".to_string(),
            toml::Value::Array(vec![
                toml::Value::String("cargo".to_string()),
                toml::Value::String("build".to_string()),
            ]),
        );
        let raw = table(&[("build", toml::Value::Table(record))]);
        let tasks = normalize_all(Path::new("runner.toml"), &raw).expect("should normalize");
        match &tasks["build"].body {
            Body::Command { argv, allow_shell, .. } => {
                assert_eq!(argv.as_deref(), Some(["cargo".to_string(), "build".to_string()].as_slice()));
                assert!(!allow_shell);
            }
            Body::Steps(_) => panic!("expected a Command body"),
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut record = toml::map::Map::new();
        record.insert("shell".to_string(), toml::Value::String("echo hi".to_string()));
        record.insert("allow_fail".to_string(), toml::Value::Boolean(true));
        let raw = table(&[("greet", toml::Value::Table(record))]);
        let err = normalize_all(Path::new("runner.toml"), &raw).unwrap_err();
        assert!(matches!(err, Error::UnknownTaskKey { .. }));
    }

    #[test]
    fn ambiguous_body_is_rejected() {
        let mut record = toml::map::Map::new();
        record.insert("shell".to_string(), toml::Value::String("echo hi".to_string()));
        record.insert("cmd".to_string(), toml::Value::String("echo bye".to_string()));
        let raw = table(&[("greet", toml::Value::Table(record))]);
        let err = normalize_all(Path::new("runner.toml"), &raw).unwrap_err();
        assert!(matches!(err, Error::AmbiguousTaskBody { .. }));
    }

    #[test]
    fn empty_body_is_rejected() {
        let record = toml::map::Map::new();
        let raw = table(&[("greet", toml::Value::Table(record))]);
        let err = normalize_all(Path::new("runner.toml"), &raw).unwrap_err();
        assert!(matches!(err, Error::EmptyTaskBody { .. }));
    }

    #[test]
    fn whitespace_in_name_is_rejected() {
        let raw = table(&[("bad name", toml::Value::String("echo hi".to_string()))]);
        let err = normalize_all(Path::new("runner.toml"), &raw).unwrap_err();
        assert!(matches!(err, Error::InvalidTaskName(_)));
    }
}
