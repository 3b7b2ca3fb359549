use std::io;
use std::path::{Path, PathBuf};

use failure::Fail;

/// Everything that can abort a packing run.
///
/// All variants are fatal: nothing is retried and no partial archive is
/// reported as a success. Paths are stored the way they are displayed.
#[derive(Debug, Fail)]
pub enum PackError {
    /// The skeleton is not an `.app` directory or lacks a `Contents` folder.
    #[fail(display = "invalid bundle {}: {}", path, reason)]
    InvalidBundleLayout { path: String, reason: String },
    /// A required input path does not exist.
    #[fail(display = "source not found: {}", path)]
    SourceNotFound {
        path: String,
        #[fail(cause)]
        cause: io::Error,
    },
    /// Reading a source file or writing the archive failed.
    #[fail(display = "i/o error on {}", path)]
    Io {
        path: String,
        #[fail(cause)]
        cause: io::Error,
    },
    /// More than one directory qualifies as the executable container parent.
    #[fail(display = "found more than one executable container parent: {}", matches)]
    ConfigurationAmbiguity { matches: String },
    /// Two sources map to the same path inside the archive.
    #[fail(display = "more than one file maps to archive entry {}", name)]
    DuplicateEntry { name: String },
}

impl PackError {
    pub fn invalid_layout<P: AsRef<Path>, S: Into<String>>(path: P, reason: S) -> PackError {
        PackError::InvalidBundleLayout {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found<P: AsRef<Path>>(path: P, cause: io::Error) -> PackError {
        PackError::SourceNotFound {
            path: path.as_ref().display().to_string(),
            cause,
        }
    }

    pub fn io<P: AsRef<Path>>(path: P, cause: io::Error) -> PackError {
        PackError::Io {
            path: path.as_ref().display().to_string(),
            cause,
        }
    }

    /// Lists every `Contents` directory found below the skeleton.
    pub fn ambiguity(matches: &[PathBuf]) -> PackError {
        PackError::ConfigurationAmbiguity {
            matches: matches
                .iter()
                .map(|x| x.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Wraps a zip writer failure that happened while writing `path`.
    pub fn zip<P: AsRef<Path>>(path: P, err: zip::result::ZipError) -> PackError {
        let cause = match err {
            zip::result::ZipError::Io(err) => err,
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        };
        PackError::io(path, cause)
    }

    /// Wraps a directory walk failure below `root`.
    pub fn walk<P: AsRef<Path>>(root: P, err: walkdir::Error) -> PackError {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.as_ref().to_path_buf());
        let cause = match err.into_io_error() {
            Some(err) => err,
            None => io::Error::new(io::ErrorKind::Other, "filesystem loop detected"),
        };
        PackError::io(path, cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_message() {
        let err = PackError::invalid_layout("Foo", "not an .app folder");
        assert_eq!(err.to_string(), "invalid bundle Foo: not an .app folder");
        assert!(Fail::cause(&err).is_none());
    }

    #[test]
    fn test_not_found_exposes_os_error() {
        let err = PackError::not_found(
            "build/Foo",
            io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert_eq!(err.to_string(), "source not found: build/Foo");
        let cause = Fail::cause(&err).map(|x| x.to_string());
        assert_eq!(cause.as_deref(), Some("No such file or directory"));
    }

    #[test]
    fn test_ambiguity_lists_matches() {
        let err = PackError::ambiguity(&[
            PathBuf::from("Contents"),
            PathBuf::from("Nested/Contents"),
        ]);
        assert_eq!(
            err.to_string(),
            "found more than one executable container parent: Contents, Nested/Contents"
        );
        assert!(Fail::cause(&err).is_none());
    }
}
