//! Shared filesystem helpers built on `cap-std` and `camino`.
//!
//! Besides the ambient-authority helpers this crate owns the containment
//! rules for archive extraction: entry names are normalised lexically before
//! anything is written, and extracted trees are walked afterwards so that no
//! file or symlink resolves outside its destination.
#![forbid(unsafe_code)]

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use walkdir::WalkDir;

/// Prefix of every per-request scratch directory.
pub const WORKSPACE_PREFIX: &str = "geointake-";

/// View a standard path as UTF-8, failing with `InvalidData` otherwise.
pub fn utf8_path(path: &Path) -> io::Result<&Utf8Path> {
    Utf8Path::from_path(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("path {} is not valid UTF-8", path.display()),
        )
    })
}

/// Open a UTF-8 file path using ambient authority.
pub fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Resolve an ambient directory for the given path and return the directory with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_string();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Return whether a path exists and is a regular file using capability-based IO.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_dir_and_file(path)?;
    match dir.metadata(name.as_str()) {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Create `path` and any missing parents, returning a handle scoped to it.
///
/// Calling this on an existing directory is a no-op apart from opening it.
pub fn ensure_dir(path: &Utf8Path) -> io::Result<fs_utf8::Dir> {
    let (base_dir, relative) = base_dir_and_relative(path)?;
    if relative.as_str().is_empty() {
        return Ok(base_dir);
    }
    base_dir.create_dir_all(&relative)?;
    base_dir.open_dir(&relative)
}

/// Create `path` when missing and report whether it holds no entries.
pub fn ensure_dir_empty(path: &Utf8Path) -> io::Result<bool> {
    let dir = ensure_dir(path)?;
    Ok(dir.entries()?.next().is_none())
}

/// Remove every entry below `path`, keeping the directory itself.
///
/// Symlinks are removed, never followed.
pub fn clear_dir(path: &Utf8Path) -> io::Result<()> {
    let dir = ensure_dir(path)?;
    for entry in dir.entries()? {
        let entry = entry?;
        let name = entry.file_name()?;
        if entry.file_type()?.is_dir() {
            dir.remove_dir_all(name.as_str())?;
        } else {
            dir.remove_file(name.as_str())?;
        }
    }
    Ok(())
}

/// Split an absolute or relative parent path into an ambient base directory and a relative suffix.
pub fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        // Windows absolute path with a drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        // Unix-style absolute path.
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        // Relative path: resolve from the current directory.
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}

/// Normalise an archive entry name into a path relative to the extraction
/// root.
///
/// Backslashes are treated as separators and `.` segments are dropped.
/// Returns `None` when the name is absolute or its `..` segments climb above
/// the root. Names that normalise to the root itself yield an empty path.
///
/// # Examples
/// ```
/// use geointake_fs::contained_entry_path;
///
/// let name = |raw: &str| contained_entry_path(raw).map(|path| path.into_string());
/// assert_eq!(name("data/./parcel.shp").as_deref(), Some("data/parcel.shp"));
/// assert_eq!(name("a/../b.dbf").as_deref(), Some("b.dbf"));
/// assert!(contained_entry_path("../evil.shp").is_none());
/// assert!(contained_entry_path("/etc/passwd").is_none());
/// ```
#[must_use]
pub fn contained_entry_path(name: &str) -> Option<Utf8PathBuf> {
    let normalised = name.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for component in Utf8Path::new(&normalised).components() {
        match component {
            Utf8Component::Normal(part) => parts.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                parts.pop()?;
            }
            Utf8Component::RootDir | Utf8Component::Prefix(_) => return None,
        }
    }
    Some(parts.into_iter().collect())
}

/// Errors raised while checking that an extracted tree stays inside its root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContainmentError {
    /// A file or symlink resolves outside the root.
    #[error("{} resolves outside {}", .entry.display(), .root.display())]
    Escape { root: PathBuf, entry: PathBuf },
    /// Walking or resolving the tree failed.
    #[error("failed to inspect {path:?}: {source}")]
    Io { source: io::Error, path: PathBuf },
}

/// Verify that every entry below `root` canonicalises inside `root`.
///
/// Symlinks are resolved; a dangling symlink counts as an escape because its
/// target cannot be shown to be contained.
///
/// # Errors
/// Returns [`ContainmentError::Escape`] for the first offending entry and
/// [`ContainmentError::Io`] when the tree cannot be read.
pub fn verify_contained(root: &Path) -> Result<(), ContainmentError> {
    let canonical_root = root.canonicalize().map_err(|source| ContainmentError::Io {
        source,
        path: root.to_path_buf(),
    })?;
    for entry in WalkDir::new(&canonical_root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|err| ContainmentError::Io {
            path: err.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf),
            source: io::Error::from(err),
        })?;
        let resolved = match entry.path().canonicalize() {
            Ok(resolved) => resolved,
            Err(err) if entry.path_is_symlink() && err.kind() == io::ErrorKind::NotFound => {
                return Err(ContainmentError::Escape {
                    root: root.to_path_buf(),
                    entry: entry.path().to_path_buf(),
                });
            }
            Err(source) => {
                return Err(ContainmentError::Io {
                    source,
                    path: entry.path().to_path_buf(),
                });
            }
        };
        if !resolved.starts_with(&canonical_root) {
            return Err(ContainmentError::Escape {
                root: root.to_path_buf(),
                entry: entry.path().to_path_buf(),
            });
        }
    }
    Ok(())
}

/// List regular files below `root` as `/`-separated relative paths, sorted
/// lexicographically.
///
/// Directories and symlinks are not listed.
pub fn list_relative_files(root: &Path) -> io::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| io::Error::other("walked entry outside its root"))?;
        let mut joined = String::new();
        for component in relative.components() {
            let part = component.as_os_str().to_str().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("path {} is not valid UTF-8", relative.display()),
                )
            })?;
            if !joined.is_empty() {
                joined.push('/');
            }
            joined.push_str(part);
        }
        files.push(Utf8PathBuf::from(joined));
    }
    files.sort_by(|left, right| left.as_str().cmp(right.as_str()));
    Ok(files)
}

/// Uniquely named scratch directory owned by a single request.
///
/// Dropping the workspace removes it; [`ScratchWorkspace::close`] does the
/// same but reports removal failures.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Create a workspace below `root`, creating `root` when missing.
    pub fn create_in(root: &Path) -> io::Result<Self> {
        ensure_dir(utf8_path(root)?)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    /// Location of the workspace.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace and everything in it.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}
