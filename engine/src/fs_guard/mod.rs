use sdk::errors::EngineError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of confining a caller-supplied path to the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// Canonical absolute path equal to the workspace or beneath it
    Inside(PathBuf),

    /// The path escapes the workspace; carries the caller's original string
    Outside { requested: String },
}

impl ResolvedPath {
    pub fn is_inside(&self) -> bool {
        matches!(self, Self::Inside(_))
    }
}

/// FileSystemGuard confines every tool path to a single workspace root.
///
/// Caller paths are joined onto the workspace as relative paths, so a
/// leading separator cannot select a filesystem-absolute location. The one
/// exception is an absolute path already under the workspace, which is
/// taken as given. The
/// joined path is normalized lexically (the target does not have to exist)
/// and then checked component-wise against the canonical workspace.
///
/// # Security Model
///
/// The guard implements a three-gate validation process:
/// 1. Lexical normalization of `.` and `..` on top of the workspace
/// 2. Component-wise ancestor-or-equal check against the workspace
/// 3. Canonicalization of the deepest existing ancestor, so a symlink
///    inside the workspace cannot point the target outside of it
///
/// Backslashes are treated as separators on every platform so that mixed
/// separator input normalizes the same way everywhere.
#[derive(Debug, Clone)]
pub struct FileSystemGuard {
    workspace: PathBuf,
}

impl FileSystemGuard {
    /// Creates a new FileSystemGuard rooted at `workspace`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkspaceMissing` if the workspace cannot be
    /// canonicalized or is not a directory.
    pub fn new(workspace: impl AsRef<Path>) -> Result<Self, EngineError> {
        let requested = workspace.as_ref();
        // Canonicalize workspace to handle symlinks (e.g., /var -> /private/var on macOS)
        let workspace = requested
            .canonicalize()
            .map_err(|e| EngineError::WorkspaceMissing(requested.to_path_buf(), e.to_string()))?;

        if !workspace.is_dir() {
            return Err(EngineError::WorkspaceMissing(
                workspace,
                "not a directory".to_string(),
            ));
        }

        Ok(Self { workspace })
    }

    /// Resolves `requested` relative to the workspace.
    ///
    /// Never fails: an out-of-scope path is reported as
    /// [`ResolvedPath::Outside`] carrying the original string.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use warden_engine::fs_guard::{FileSystemGuard, ResolvedPath};
    ///
    /// let guard = FileSystemGuard::new("/home/user/workspace").unwrap();
    ///
    /// assert!(guard.resolve("src/main.rs").is_inside());
    /// assert_eq!(
    ///     guard.resolve("../.ssh/id_rsa"),
    ///     ResolvedPath::Outside { requested: "../.ssh/id_rsa".to_string() }
    /// );
    /// ```
    pub fn resolve(&self, requested: &str) -> ResolvedPath {
        let outside = || ResolvedPath::Outside {
            requested: requested.to_string(),
        };

        // Gate 1: lexical normalization on top of the workspace
        let Some(target) = normalize_onto(&self.workspace, requested) else {
            warn!("Path escapes filesystem root: {:?}", requested);
            return outside();
        };

        // Gate 2: component-wise containment
        if !target.starts_with(&self.workspace) {
            warn!("Path outside workspace: {:?}", requested);
            return outside();
        }

        // Gate 3: the real location of whatever already exists must agree.
        // A dangling link cannot be proven inside, so it is rejected too.
        if let Some(ancestor) = deepest_existing_ancestor(&target) {
            match ancestor.canonicalize() {
                Ok(real) if real.starts_with(&self.workspace) => {}
                Ok(real) => {
                    warn!(
                        "Path {:?} resolves through a link to {}",
                        requested,
                        real.display()
                    );
                    return outside();
                }
                Err(e) => {
                    warn!("Cannot canonicalize {}: {}", ancestor.display(), e);
                    return outside();
                }
            }
        }

        debug!("Resolved {:?} to {}", requested, target.display());
        ResolvedPath::Inside(target)
    }

    /// Returns a reference to the workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Express an in-workspace path relative to the workspace root.
    ///
    /// The empty path denotes the workspace itself.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.workspace).ok()
    }
}

/// Join `requested` onto `base` as a relative path and collapse `.`/`..`.
///
/// An absolute path that already starts with `base` is taken relative to
/// it, so a resolved path resolves to itself.
///
/// Returns `None` if a `..` would climb above the filesystem root.
fn normalize_onto(base: &Path, requested: &str) -> Option<PathBuf> {
    let unified = requested.replace('\\', "/");
    let mut relative = Path::new(&unified);
    if relative.has_root() {
        relative = relative.strip_prefix(base).unwrap_or(relative);
    }
    let mut out = base.to_path_buf();

    for component in relative.components() {
        match component {
            // Absolute and prefixed input is re-rooted, never honored
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(segment) => out.push(segment),
        }
    }

    Some(out)
}

/// The deepest ancestor of `path` (itself included) that exists, links included.
fn deepest_existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors()
        .find(|ancestor| ancestor.symlink_metadata().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileSystemGuard) {
        let temp = TempDir::new().unwrap();
        let guard = FileSystemGuard::new(temp.path()).unwrap();
        (temp, guard)
    }

    #[test]
    fn test_missing_workspace_is_error() {
        let temp = TempDir::new().unwrap();
        let result = FileSystemGuard::new(temp.path().join("does-not-exist"));
        assert!(matches!(result, Err(EngineError::WorkspaceMissing(_, _))));
    }

    #[test]
    fn test_workspace_must_be_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(FileSystemGuard::new(&file).is_err());
    }

    #[test]
    fn test_root_itself_is_inside() {
        let (_temp, guard) = setup();
        let root = guard.workspace().to_path_buf();

        assert_eq!(guard.resolve(""), ResolvedPath::Inside(root.clone()));
        assert_eq!(guard.resolve("."), ResolvedPath::Inside(root.clone()));
        assert_eq!(guard.resolve("./"), ResolvedPath::Inside(root.clone()));
        assert_eq!(guard.resolve("a/.."), ResolvedPath::Inside(root));
    }

    #[test]
    fn test_valid_path_within_workspace() {
        let (_temp, guard) = setup();
        let expected = guard.workspace().join("pkg").join("calculator.py");

        assert_eq!(
            guard.resolve("pkg/calculator.py"),
            ResolvedPath::Inside(expected.clone())
        );
        assert_eq!(
            guard.resolve("pkg/./sub/../calculator.py"),
            ResolvedPath::Inside(expected)
        );
    }

    #[test]
    fn test_nonexistent_target_is_allowed() {
        let (_temp, guard) = setup();
        assert!(guard.resolve("not/yet/created.txt").is_inside());
    }

    #[test]
    fn test_path_traversal_attempt() {
        let (_temp, guard) = setup();

        for requested in ["..", "../", "../x", "a/../../x", "a/b/../../../etc/passwd"] {
            assert_eq!(
                guard.resolve(requested),
                ResolvedPath::Outside {
                    requested: requested.to_string()
                },
                "{requested} should be rejected"
            );
        }
    }

    #[test]
    fn test_absolute_path_is_rerooted() {
        let (_temp, guard) = setup();
        assert_eq!(
            guard.resolve("/bin"),
            ResolvedPath::Inside(guard.workspace().join("bin"))
        );
        assert!(!guard.resolve("/../etc").is_inside());
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_path_under_workspace_is_kept() {
        let (_temp, guard) = setup();
        let root = guard.workspace().to_path_buf();
        let nested = root.join("a").join("b.txt");

        assert_eq!(
            guard.resolve(root.to_str().unwrap()),
            ResolvedPath::Inside(root.clone())
        );
        assert_eq!(
            guard.resolve(nested.to_str().unwrap()),
            ResolvedPath::Inside(nested.clone())
        );

        let climbing = format!("{}/../secret.txt", root.display());
        assert_eq!(
            guard.resolve(&climbing),
            ResolvedPath::Outside {
                requested: climbing.clone()
            }
        );
    }

    #[test]
    fn test_mixed_separators() {
        let (_temp, guard) = setup();
        let expected = guard.workspace().join("a").join("b.txt");

        assert_eq!(guard.resolve("a\\b.txt"), ResolvedPath::Inside(expected.clone()));
        assert_eq!(guard.resolve("a/c\\..\\b.txt"), ResolvedPath::Inside(expected));
        assert!(!guard.resolve("..\\outside").is_inside());
        assert!(!guard.resolve("a\\..\\../outside").is_inside());
    }

    #[test]
    fn test_sibling_with_common_prefix_is_outside() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("proj");
        fs::create_dir(&workspace).unwrap();
        fs::create_dir(temp.path().join("proj-secrets")).unwrap();
        let guard = FileSystemGuard::new(&workspace).unwrap();

        assert!(!guard.resolve("../proj-secrets/key").is_inside());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_outside() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("workspace");
        let outside = temp.path().join("outside");
        fs::create_dir(&workspace).unwrap();
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(&outside, workspace.join("link")).unwrap();

        let guard = FileSystemGuard::new(&workspace).unwrap();

        assert!(!guard.resolve("link").is_inside());
        assert!(!guard.resolve("link/secret.txt").is_inside());
        assert!(!guard.resolve("link/new-file.txt").is_inside());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_outside() {
        let (temp, guard) = setup();
        std::os::unix::fs::symlink("/nonexistent/target", temp.path().join("dangling")).unwrap();

        assert!(!guard.resolve("dangling").is_inside());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_workspace_is_inside() {
        let (temp, guard) = setup();
        fs::create_dir(temp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

        assert!(guard.resolve("alias/file.txt").is_inside());
    }

    #[test]
    fn test_relative_round_trip() {
        let (_temp, guard) = setup();
        let ResolvedPath::Inside(resolved) = guard.resolve("a/./b/../c.txt") else {
            panic!("expected inside");
        };
        let relative = guard.relative(&resolved).unwrap();

        assert_eq!(relative, Path::new("a/c.txt"));
        assert_eq!(
            guard.resolve(relative.to_str().unwrap()),
            ResolvedPath::Inside(resolved)
        );
    }
}
