use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

/// Renders a relative path as a zip entry name (`/` separated).
pub fn archive_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .components()
        .filter_map(|x| match x {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// A scratch file next to its destination that is renamed over it on
/// success and removed otherwise.
#[derive(Debug)]
pub struct TempFile {
    tmp: PathBuf,
    dst: PathBuf,
    persisted: bool,
}

impl TempFile {
    /// Reserves a temp path in the parent directory of `dst`.
    ///
    /// Missing parent directories are created.
    pub fn for_path<P: AsRef<Path>>(dst: &P) -> io::Result<TempFile> {
        let mut dst = dst.as_ref().to_path_buf();
        if !dst.is_absolute() {
            dst = env::current_dir()?.join(dst);
        }

        let parent = match dst.parent() {
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "destination file cannot be toplevel directory",
                ));
            }
            Some(parent) => parent,
        };
        fs::create_dir_all(parent)?;

        // same directory so the final rename never crosses a filesystem
        let tmp = parent.join(format!(".appzip-{}", Uuid::new_v4()));
        Ok(TempFile {
            tmp,
            dst,
            persisted: false,
        })
    }

    /// Returns the path to write to.
    pub fn path(&self) -> &Path {
        &self.tmp
    }

    /// Moves the temp file over the destination and returns the latter.
    pub fn persist(&mut self) -> io::Result<PathBuf> {
        fs::rename(&self.tmp, &self.dst)?;
        self.persisted = true;
        Ok(self.dst.clone())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.persisted {
            fs::remove_file(&self.tmp).ok();
        }
    }
}

#[test]
fn test_archive_name() {
    assert_eq!(archive_name(Path::new("Contents").join("MacOS")), "Contents/MacOS");
    assert_eq!(archive_name("./Contents/Info.plist"), "Contents/Info.plist");
    assert_eq!(archive_name(""), "");
}

#[test]
fn test_temp_file_lifecycle() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dst = tmp.path().join("out").join("Foo.zip");

    let file = TempFile::for_path(&dst).unwrap();
    fs::write(file.path(), b"discarded").unwrap();
    let scratch = file.path().to_path_buf();
    drop(file);
    assert!(!scratch.exists());
    assert!(!dst.exists());

    let mut file = TempFile::for_path(&dst).unwrap();
    fs::write(file.path(), b"kept").unwrap();
    assert_eq!(file.persist().unwrap(), dst);
    assert_eq!(fs::read(&dst).unwrap(), b"kept");
    assert_eq!(fs::read_dir(tmp.path().join("out")).unwrap().count(), 1);
}
