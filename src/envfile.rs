//! Parsing of `KEY=VALUE` environment files, shared by a task's `env_file` key and the CLI's
//! `--env-file` flag. Blank lines and lines starting with `#` are skipped, the common convention
//! for this style of file.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;
use crate::filesystem::Filesystem;

/// Parses the already-read `contents` of an env file at `path` (used only for error messages).
///
/// # Errors
///
/// Returns [`Error::EnvFileMalformed`] for any non-blank, non-comment line that is not of the
/// form `KEY=VALUE`.
pub fn parse(contents: &str, path: &Path) -> Result<BTreeMap<String, String>, Error> {
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(Error::EnvFileMalformed {
                path: path.to_path_buf(),
                line: line.to_string(),
            });
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

/// Reads and parses the env file at `path` via `fs`.
///
/// # Errors
///
/// Returns [`Error::EnvFileReadError`] if the file cannot be read, or
/// [`Error::EnvFileMalformed`] if a line does not parse.
pub fn load(fs: &impl Filesystem, path: &Path) -> Result<BTreeMap<String, String>, Error> {
    let contents = fs.read_to_string(path).ok_or_else(|| {
        Error::EnvFileReadError(
            path.to_path_buf(),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        )
    })?;
    parse(&contents, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFilesystem;

    #[test]
    fn parses_key_value_lines_and_skips_blanks_and_comments() {
        let contents = "FOO=bar\n\n# a comment\nBAZ=qux\n";
        let map = parse(contents, Path::new("test.env")).expect("should parse");
        assert_eq!(map.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(map.get("BAZ").map(String::as_str), Some("qux"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let err = parse("NOT_A_PAIR\n", Path::new("test.env")).unwrap_err();
        assert!(matches!(err, Error::EnvFileMalformed { .. }));
    }

    #[test]
    fn load_reads_through_the_filesystem_trait() {
        let fs = MemoryFilesystem::new().with_file("/project/.env", "FOO=1\n");
        let map = load(&fs, Path::new("/project/.env")).expect("should load");
        assert_eq!(map.get("FOO").map(String::as_str), Some("1"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let fs = MemoryFilesystem::new();
        let err = load(&fs, Path::new("/project/.env")).unwrap_err();
        assert!(matches!(err, Error::EnvFileReadError(_, _)));
    }
}
