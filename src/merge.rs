//! Merges the build output into the bundle skeleton.
//!
//! The merge runs in two phases: the skeleton is scanned for the directory
//! that receives the build output, and only then is the list of archive
//! entries produced. That way the result does not depend on when the walk
//! happens to reach the `Contents` directory.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::bundle::{Bundle, CONTENTS_DIR, EXECUTABLE_DIR};
use crate::error::PackError;
use crate::overrides::OverrideTable;
use crate::utils::archive_name;

/// One file to be written into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File to read the content from.
    pub source: PathBuf,
    /// Entry name inside the archive.
    pub name: String,
    /// Whether the entry is stamped with executable permissions.
    pub executable: bool,
}

impl ArchiveEntry {
    pub fn file<P: Into<PathBuf>>(source: P, name: String) -> ArchiveEntry {
        ArchiveEntry {
            source: source.into(),
            name,
            executable: false,
        }
    }

    pub fn executable<P: Into<PathBuf>>(source: P, name: String) -> ArchiveEntry {
        ArchiveEntry {
            source: source.into(),
            name,
            executable: true,
        }
    }
}

/// How the build output is merged into the bundle.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// File name of the executable inside the build output.
    pub executable: String,
    /// File name the executable gets inside `Contents/MacOS`.
    pub final_name: String,
    /// Renames applied to the remaining build output files.
    pub overrides: OverrideTable,
}

impl MergeConfig {
    /// Keeps the executable name and renames nothing.
    pub fn new<S: Into<String>>(executable: S) -> MergeConfig {
        let executable = executable.into();
        MergeConfig {
            final_name: executable.clone(),
            executable,
            overrides: OverrideTable::new(),
        }
    }
}

/// A validated build output directory.
#[derive(Debug, Clone)]
pub struct Overlay {
    root: PathBuf,
    executable: PathBuf,
}

impl Overlay {
    /// Opens the build output at `root` which must contain `executable`.
    pub fn open<P: AsRef<Path>>(root: P, executable: &str) -> Result<Overlay, PackError> {
        let root = root.as_ref();
        let metadata = fs::metadata(root).map_err(|err| PackError::not_found(root, err))?;
        if !metadata.is_dir() {
            return Err(PackError::not_found(
                root,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let exe = root.join(executable);
        let metadata = fs::metadata(&exe).map_err(|err| PackError::not_found(&exe, err))?;
        if !metadata.is_file() {
            return Err(PackError::not_found(
                &exe,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        Ok(Overlay {
            root: root.to_path_buf(),
            executable: exe,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the executable file.
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

/// Returns `path` relative to the walk root it was found under.
fn relative_to(path: &Path, root: &Path) -> Result<PathBuf, PackError> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| {
            PackError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path is outside of the walk root"),
            )
        })
}

/// Lists all files below `root` relative to it, in sorted traversal order.
///
/// Symlinks are never descended into. A link to a file is listed and stored
/// with the content of its target; a link to a directory is skipped.
fn walk_files(root: &Path) -> Result<Vec<PathBuf>, PackError> {
    let mut rv = vec![];
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry.map_err(|err| PackError::walk(root, err))?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target =
                fs::metadata(entry.path()).map_err(|err| PackError::io(entry.path(), err))?;
            if target.is_dir() {
                debug!("skipping directory link {}", entry.path().display());
                continue;
            }
        } else if !file_type.is_file() {
            continue;
        }
        rv.push(relative_to(entry.path(), root)?);
    }
    Ok(rv)
}

/// Produces the archive entries for one bundle and one build output.
#[derive(Debug)]
pub struct Merger<'a> {
    bundle: &'a Bundle,
    overlay: &'a Overlay,
    config: &'a MergeConfig,
}

impl<'a> Merger<'a> {
    pub fn new(bundle: &'a Bundle, overlay: &'a Overlay, config: &'a MergeConfig) -> Merger<'a> {
        Merger {
            bundle,
            overlay,
            config,
        }
    }

    /// Finds all directories below the skeleton named `Contents`.
    ///
    /// Returned paths are relative to the skeleton root.
    pub fn container_parents(&self) -> Result<Vec<PathBuf>, PackError> {
        let root = self.bundle.root();
        let mut rv = vec![];
        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry.map_err(|err| PackError::walk(root, err))?;
            if entry.file_type().is_dir() && entry.file_name() == CONTENTS_DIR {
                let rel = relative_to(entry.path(), root)?;
                debug!("found container parent {}", rel.display());
                rv.push(rel);
            }
        }
        Ok(rv)
    }

    /// Returns the executable container relative to the skeleton root.
    ///
    /// Exactly one `Contents` directory must exist. The `MacOS` child does
    /// not have to.
    pub fn container(&self) -> Result<PathBuf, PackError> {
        let mut parents = self.container_parents()?;
        match parents.len() {
            0 => Err(PackError::invalid_layout(
                self.bundle.root(),
                format!("no {} directory", CONTENTS_DIR),
            )),
            1 => Ok(parents.remove(0).join(EXECUTABLE_DIR)),
            _ => Err(PackError::ambiguity(&parents)),
        }
    }

    /// Computes all archive entries.
    ///
    /// Skeleton files come first, then the build output, and the executable
    /// is always the last entry.
    pub fn plan(&self) -> Result<Vec<ArchiveEntry>, PackError> {
        let container = self.container()?;
        let placeholder = container.join(&self.config.final_name);
        let mut entries = vec![];

        for rel in walk_files(self.bundle.root())? {
            if rel == placeholder {
                debug!("skipping skeleton placeholder {}", rel.display());
                continue;
            }
            entries.push(ArchiveEntry::file(
                self.bundle.root().join(&rel),
                self.bundle.entry_name(&rel),
            ));
        }

        let raw_executable = Path::new(&self.config.executable);
        for rel in walk_files(self.overlay.root())? {
            if rel == raw_executable {
                continue;
            }
            let key = archive_name(&rel);
            let name = self.config.overrides.resolve(&key);
            if name != key {
                debug!("renaming {} to {}", key, name);
            }
            entries.push(ArchiveEntry::file(
                self.overlay.root().join(&rel),
                self.bundle.entry_name(container.join(name)),
            ));
        }

        entries.push(ArchiveEntry::executable(
            self.overlay.executable(),
            self.bundle.entry_name(&placeholder),
        ));

        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(PackError::DuplicateEntry {
                    name: entry.name.clone(),
                });
            }
        }

        Ok(entries)
    }
}
