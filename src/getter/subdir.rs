//! Sub-directory selection inside a downloaded module package

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use wax::{CandidatePath, Glob, Pattern};

use crate::error::{IngestError, Result};

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Resolve `subdir` below `dest`; glob patterns must match exactly one directory.
///
/// A sub-directory naming a parent component or an absolute path is rejected,
/// so the result never leaves the package.
pub fn subdir_glob(dest: &Path, subdir: &str) -> Result<PathBuf> {
    let subdir = subdir.trim_matches('/');
    if subdir.is_empty() {
        return Ok(dest.to_path_buf());
    }
    if Path::new(subdir)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(IngestError::InvalidAddress {
            address: subdir.to_string(),
            reason: "sub-directory must stay inside the downloaded package".to_string(),
        });
    }

    if !is_glob(subdir) {
        let path = dest.join(subdir);
        if path.is_dir() {
            return Ok(path);
        }
        return Err(IngestError::SubdirNotFound {
            subdir: subdir.to_string(),
        });
    }

    let glob = Glob::new(subdir).map_err(|e| IngestError::InvalidAddress {
        address: subdir.to_string(),
        reason: e.to_string(),
    })?;

    let mut matches = Vec::new();
    for entry in WalkDir::new(dest).min_depth(1).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dest) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if glob.is_match(CandidatePath::from(relative.as_str())) {
            matches.push(entry.path().to_path_buf());
        }
    }

    match matches.len() {
        0 => Err(IngestError::SubdirNotFound {
            subdir: subdir.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(IngestError::SubdirAmbiguous {
            subdir: subdir.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn package() -> TempDir {
        let temp = TempDir::new().expect("temp");
        for dir in ["modules/vpc", "modules/vpc-endpoints", "repo-abc123/examples"] {
            fs::create_dir_all(temp.path().join(dir)).expect("mkdir");
        }
        temp
    }

    #[test]
    fn test_plain_subdir() {
        let temp = package();
        let dir = subdir_glob(temp.path(), "modules/vpc").expect("exists");
        assert_eq!(dir, temp.path().join("modules/vpc"));
    }

    #[test]
    fn test_missing_subdir() {
        let temp = package();
        let err = subdir_glob(temp.path(), "modules/eks").expect_err("missing");
        assert!(matches!(err, IngestError::SubdirNotFound { .. }));
    }

    #[test]
    fn test_glob_single_match() {
        let temp = package();
        let dir = subdir_glob(temp.path(), "repo-*/examples").expect("one match");
        assert_eq!(dir, temp.path().join("repo-abc123/examples"));
    }

    #[test]
    fn test_glob_multiple_matches() {
        let temp = package();
        let err = subdir_glob(temp.path(), "modules/vpc*").expect_err("ambiguous");
        assert!(err.to_string().contains("matches multiple paths"));
    }

    #[test]
    fn test_subdir_cannot_leave_package() {
        let temp = package();
        for subdir in ["../../etc", "modules/../../outside", "repo-*/../.."] {
            let err = subdir_glob(&temp.path().join("modules"), subdir).expect_err("escapes");
            assert!(matches!(err, IngestError::InvalidAddress { .. }), "{subdir}");
        }
    }

    #[test]
    fn test_empty_subdir_is_dest() {
        let temp = package();
        assert_eq!(subdir_glob(temp.path(), "").expect("dest"), temp.path());
    }
}
