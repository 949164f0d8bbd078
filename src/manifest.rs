//! Locates a project's task manifest by walking upward from a starting directory, and parses
//! it under whichever of the three recognized dialects matches.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::filesystem::Filesystem;

/// The name of the dedicated manifest file, checked first at each directory level: it carries
/// both the embedded (`[tool.runner.tasks]`) and the standalone (top-level `tasks`) dialect.
const STANDALONE_MANIFEST: &str = "runner.toml";

/// The name of the package manifest probed for the compat dialect (a top-level `scripts`
/// table), checked at each directory level only when `STANDALONE_MANIFEST` isn't present
/// there: an already-present top-of-tree manifest most Rust projects carry regardless of this
/// tool, the same way an npm-alike reuses `package.json`'s `scripts` table rather than asking
/// for a dedicated file. Its absence of a `scripts` table at a given level is not an error — the
/// walk simply continues upward, since a `Cargo.toml` with no `scripts` table is the ordinary
/// case.
const COMPAT_MANIFEST: &str = "Cargo.toml";

/// A fully loaded and parsed manifest: tasks are still in their raw TOML form here, normalized
/// into [`crate::task::Task`] by `task::normalize_all` once discovery has picked a single file.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// absolute path to the manifest file
    pub path: PathBuf,
    /// directory containing `path`; the default cwd for every task
    pub root: PathBuf,
    /// raw task table, keyed by task name
    pub tasks: BTreeMap<String, toml::Value>,
    /// ordered list of workspace member directories (relative to `root`), if declared
    pub members: Vec<String>,
}

/// Discovers and parses a manifest, starting from `explicit_path` if given, or by walking
/// upward from `start_dir` otherwise.
///
/// At each directory level, `runner.toml` is tried first (any of the embedded, standalone or
/// compat dialects); if it isn't there, `Cargo.toml` is tried for the compat dialect only, and
/// a `Cargo.toml` without a `scripts` table does not stop the walk.
///
/// # Errors
///
/// Returns [`Error::ManifestNotFound`] if no recognized file exists on the walk, or
/// [`Error::ManifestParse`]/[`Error::NoTasks`] if a candidate file is found but does not parse
/// under any recognized dialect.
pub fn discover(
    fs: &impl Filesystem,
    start_dir: &Path,
    explicit_path: Option<&Path>,
) -> Result<Manifest, Error> {
    if let Some(path) = explicit_path {
        let contents = fs
            .read_to_string(path)
            .ok_or_else(|| Error::ManifestNotFound(path.to_path_buf()))?;
        return parse(path, &contents);
    }

    for dir in start_dir.ancestors() {
        let candidate = dir.join(STANDALONE_MANIFEST);
        if fs.is_file(&candidate) {
            let contents = fs
                .read_to_string(&candidate)
                .ok_or_else(|| Error::ManifestNotFound(candidate.clone()))?;
            return parse(&candidate, &contents);
        }

        let compat_candidate = dir.join(COMPAT_MANIFEST);
        if fs.is_file(&compat_candidate) {
            let contents = fs
                .read_to_string(&compat_candidate)
                .ok_or_else(|| Error::ManifestNotFound(compat_candidate.clone()))?;
            if let Some(manifest) = parse_compat(&compat_candidate, &contents)? {
                return Ok(manifest);
            }
        }
    }

    Err(Error::ManifestNotFound(start_dir.to_path_buf()))
}

/// Parses the contents of a manifest file found at `path`, trying each dialect in priority
/// order: embedded, then standalone, then compat `scripts`.
fn parse(path: &Path, contents: &str) -> Result<Manifest, Error> {
    let document: toml::Value = contents.parse().map_err(|err: toml::de::Error| {
        Error::ManifestParse {
            path: path.to_path_buf(),
            detail: render_parse_error(contents, &err),
        }
    })?;

    let root = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let table = document
        .as_table()
        .ok_or_else(|| Error::ManifestParse {
            path: path.to_path_buf(),
            detail: "top-level document is not a TOML table".to_string(),
        })?;

    // dialect 1: embedded `[tool.runner.tasks]` table
    let embedded = table
        .get("tool")
        .and_then(toml::Value::as_table)
        .and_then(|tool| tool.get("runner"))
        .and_then(toml::Value::as_table)
        .and_then(|runner| runner.get("tasks"))
        .and_then(toml::Value::as_table);

    // dialect 2: standalone top-level `tasks` table
    let standalone = table.get("tasks").and_then(toml::Value::as_table);

    // dialect 3: compat mode, a top-level `scripts` table (every entry becomes a Command)
    let scripts = table.get("scripts").and_then(toml::Value::as_table);

    let (raw_tasks, compat) = if let Some(tasks) = embedded {
        (tasks.clone(), false)
    } else if let Some(tasks) = standalone {
        (tasks.clone(), false)
    } else if let Some(tasks) = scripts {
        (tasks.clone(), true)
    } else {
        return Err(Error::NoTasks(path.to_path_buf()));
    };

    if raw_tasks.is_empty() {
        return Err(Error::NoTasks(path.to_path_buf()));
    }

    let tasks = if compat {
        raw_tasks
            .into_iter()
            .map(|(name, value)| (name, compat_task_value(&value)))
            .collect()
    } else {
        raw_tasks.into_iter().collect()
    };

    let members = table
        .get("members")
        .and_then(toml::Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(toml::Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Manifest {
        path: path.to_path_buf(),
        root,
        tasks,
        members,
    })
}

/// Parses `contents` at `path` looking only for dialect 3 (a top-level `scripts` table).
///
/// Returns `Ok(None)` when the file parses fine but has no `scripts` table, so `discover` can
/// keep walking upward past an ordinary manifest that never opted into task running. A `scripts`
/// table that is present but empty is still `NoTasks`, the same as the other two dialects.
///
/// # Errors
///
/// Returns [`Error::ManifestParse`] if `contents` is not valid TOML, or [`Error::NoTasks`] if
/// `scripts` is present but empty.
fn parse_compat(path: &Path, contents: &str) -> Result<Option<Manifest>, Error> {
    let document: toml::Value = contents.parse().map_err(|err: toml::de::Error| {
        Error::ManifestParse {
            path: path.to_path_buf(),
            detail: render_parse_error(contents, &err),
        }
    })?;

    let table = document
        .as_table()
        .ok_or_else(|| Error::ManifestParse {
            path: path.to_path_buf(),
            detail: "top-level document is not a TOML table".to_string(),
        })?;

    let Some(scripts) = table.get("scripts").and_then(toml::Value::as_table) else {
        return Ok(None);
    };

    if scripts.is_empty() {
        return Err(Error::NoTasks(path.to_path_buf()));
    }

    let root = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let tasks = scripts
        .iter()
        .map(|(name, value)| (name.clone(), compat_task_value(value)))
        .collect();

    Ok(Some(Manifest {
        path: path.to_path_buf(),
        root,
        tasks,
        members: Vec::new(),
    }))
}

/// Every `scripts` entry is a bare command line regardless of its original shape, so coerce it
/// to a string the way a `package.json`-alike `scripts` table is always interpreted.
fn compat_task_value(value: &toml::Value) -> toml::Value {
    match value {
        toml::Value::String(_) => value.clone(),
        other => toml::Value::String(other.to_string()),
    }
}

/// Renders a `toml` parse error with a one-line-of-context hint, via `ariadne`.
fn render_parse_error(source: &str, err: &toml::de::Error) -> String {
    let Some(span) = err.span() else {
        return err.message().to_string();
    };

    let mut rendered = Vec::new();
    let report = ariadne::Report::build(ariadne::ReportKind::Error, (), span.start)
        .with_message(err.message())
        .with_label(
            ariadne::Label::new(span)
                .with_message(err.message())
                .with_color(ariadne::Color::Red),
        )
        .finish();
    if report
        .write(ariadne::Source::from(source), &mut rendered)
        .is_err()
    {
        return err.message().to_string();
    }
    String::from_utf8_lossy(&rendered).into_owned()
}
