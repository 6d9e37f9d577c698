//! Safety Module
//!
//! Guards destructive operations (delete, rename, re-encode in place) against
//! being pointed at system directories or the top of a home directory.

use crate::errors::CurateError;
use std::path::Path;
use tracing::warn;

const PROTECTED_DIRS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/var",
    "/private",
    "/Library",
    "/Applications",
    "/Users",
    "/home",
    "/root",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/tmp",
    "/opt",
];

pub fn check_protected_directory(path: &Path) -> Result<(), CurateError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    for candidate in [path, canonical.as_path()] {
        let path_str = candidate.to_string_lossy();
        let trimmed = if path_str.len() > 1 {
            path_str.trim_end_matches('/')
        } else {
            &path_str
        };
        if PROTECTED_DIRS.contains(&trimmed) {
            return Err(CurateError::ProtectedDirectory(path.to_path_buf()));
        }
    }

    // "/home/alice" and "/Users/alice" are the whole of someone's files
    let path_str = canonical.to_string_lossy();
    if (path_str.starts_with("/Users/") || path_str.starts_with("/home/"))
        && canonical.components().count() <= 3
    {
        return Err(CurateError::ProtectedDirectory(path.to_path_buf()));
    }

    Ok(())
}

/// Refuse protected directories and warn about well-known personal folders.
pub fn check_safe_for_destructive(path: &Path, operation: &str) -> Result<(), CurateError> {
    check_protected_directory(path)?;

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = canonical.to_string_lossy();

    if path_str.contains("/Desktop") || path_str.contains("/Documents") {
        warn!(
            path = %path.display(),
            operation,
            "Destructive operation inside a personal folder; make sure backups exist"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_directories() {
        for dir in ["/", "/usr", "/System", "/home", "/tmp", "/etc/"] {
            assert!(
                check_protected_directory(Path::new(dir)).is_err(),
                "{} should be protected",
                dir
            );
        }
    }

    #[test]
    fn test_home_root_is_protected() {
        assert!(check_protected_directory(Path::new("/home/someone")).is_err());
        assert!(check_protected_directory(Path::new("/Users/someone")).is_err());
    }

    #[test]
    fn test_collection_directories_are_allowed() {
        assert!(check_protected_directory(Path::new("/home/someone/Videos/collection")).is_ok());
        let temp = tempfile::TempDir::new().unwrap();
        assert!(check_safe_for_destructive(temp.path(), "dedupe").is_ok());
    }

    #[test]
    fn test_error_is_fatal() {
        let err = check_protected_directory(Path::new("/")).unwrap_err();
        assert!(err.is_fatal());
    }
}
