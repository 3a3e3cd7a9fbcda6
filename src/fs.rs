//! File I/O for templates and rendered output
//!
//! An empty path stands for the standard stream: stdin when reading, stdout when writing.

use crate::error::FileError;
use error_stack::{IntoReport, Result, ResultExt};
use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Read the whole input at `path`, or stdin if `path` is empty
pub fn read_input(path: &str) -> Result<Vec<u8>, FileError> {
    let mut buf = Vec::new();
    if path.is_empty() {
        log::debug!("reading template from stdin");
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .into_report()
            .change_context_lazy(|| FileError::from(""))
            .attach_printable("could not read from stdin")?;
    } else {
        log::debug!("reading template from `{path}`");
        buf = std::fs::read(path)
            .into_report()
            .change_context_lazy(|| FileError::from(path))
            .attach_printable_lazy(|| format!("could not read input file: `{path}`"))?;
    }
    Ok(buf)
}

/// Write `bytes` to `path`, or stdout if `path` is empty
///
/// The file is created or truncated. `mode` gives the permission bits of a newly
/// created file on unix and is ignored elsewhere.
pub fn write_output(path: &str, bytes: &[u8], mode: u32) -> Result<(), FileError> {
    if path.is_empty() {
        let mut out = io::stdout().lock();
        return out
            .write_all(bytes)
            .and_then(|_| out.flush())
            .into_report()
            .change_context_lazy(|| FileError::from(""))
            .attach_printable("could not write to stdout");
    }
    log::debug!("writing output to `{path}`");
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options
        .open(path)
        .and_then(|mut f| f.write_all(bytes))
        .into_report()
        .change_context_lazy(|| FileError::from(path))
        .attach_printable_lazy(|| format!("could not write output file: `{path}`"))
}

/// Resolve `path` against `root` unless it is already absolute
pub fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod ut {
    use super::*;

    #[test]
    fn test_resolve() {
        let root = Path::new("/srv/templates");
        assert_eq!(PathBuf::from("/srv/templates/a/b.txt"), resolve(root, "a/b.txt"));
        assert_eq!(PathBuf::from("/etc/hosts"), resolve(root, "/etc/hosts"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path = path.to_str().unwrap();
        write_output(path, b"first version", 0o644).unwrap();
        write_output(path, b"second", 0o644).unwrap();
        assert_eq!(b"second".to_vec(), read_input(path).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_output_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(path.to_str().unwrap(), b"x", 0o644).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        // the umask can only remove bits
        assert_eq!(0, mode & 0o133);
        assert_eq!(0o600, mode & 0o600);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.txt");
        let err = read_input(path.to_str().unwrap()).unwrap_err();
        assert!(err.current_context().to_string().contains("nope.txt"));
    }
}
