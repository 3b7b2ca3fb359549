use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PackError;
use crate::utils::archive_name;

/// Extension every bundle skeleton directory must carry.
pub const BUNDLE_SUFFIX: &str = "app";

/// Name of the directory whose `MacOS` child receives the build output.
pub const CONTENTS_DIR: &str = "Contents";

/// Name of the directory holding the platform executable.
pub const EXECUTABLE_DIR: &str = "MacOS";

/// A validated bundle skeleton on disk.
///
/// The skeleton is only ever read from.
#[derive(Debug, Clone)]
pub struct Bundle {
    root: PathBuf,
    name: String,
    stem: String,
}

impl Bundle {
    /// Opens the skeleton at `path`.
    ///
    /// The suffix is checked before the filesystem is touched so that a
    /// misnamed argument is reported as a layout problem even if it does not
    /// exist either.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Bundle, PackError> {
        let root = path.as_ref();
        if root.extension().and_then(|x| x.to_str()) != Some(BUNDLE_SUFFIX) {
            return Err(PackError::invalid_layout(
                root,
                format!("not an .{} folder", BUNDLE_SUFFIX),
            ));
        }

        let (name, stem) = match (root.file_name(), root.file_stem()) {
            (Some(name), Some(stem)) => (
                name.to_string_lossy().to_string(),
                stem.to_string_lossy().to_string(),
            ),
            _ => return Err(PackError::invalid_layout(root, "missing bundle name")),
        };

        let metadata = fs::metadata(root).map_err(|err| PackError::not_found(root, err))?;
        if !metadata.is_dir() {
            return Err(PackError::invalid_layout(root, "not a directory"));
        }

        Ok(Bundle {
            root: root.to_path_buf(),
            name,
            stem,
        })
    }

    /// The skeleton root as given on the command line.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The bundle directory name, e.g. `Foo.app`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bundle name without its suffix, e.g. `Foo`.
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Returns the archive entry name for a path relative to the root.
    pub fn entry_name<P: AsRef<Path>>(&self, rel: P) -> String {
        let rel = archive_name(rel);
        if rel.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.name, rel)
        }
    }

    /// Where the archive goes when no output path is given.
    pub fn default_output(&self) -> PathBuf {
        PathBuf::from(format!("{}.zip", self.stem))
    }
}
