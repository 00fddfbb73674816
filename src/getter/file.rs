//! `file://` transfers: copy a directory or unpack an archive file

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{IngestError, Result, io_error};

use super::archive::{ArchiveKind, decompress};

#[derive(Default, Clone)]
pub struct CopyOptions {
    pub exclude: Vec<String>,
}

impl CopyOptions {
    pub fn exclude_git() -> Self {
        Self {
            exclude: vec![".git".to_string()],
        }
    }
}

/// Copy a directory recursively, skipping excluded entry names
pub fn copy_dir_recursive(src: &Path, dst: &Path, options: &CopyOptions) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let entry_path = entry.path();
        let file_name = entry.file_name();

        if options
            .exclude
            .iter()
            .any(|excluded| file_name.to_str() == Some(excluded.as_str()))
        {
            continue;
        }

        let dst_path = dst.join(&file_name);
        if entry_path.is_dir() {
            copy_dir_recursive(&entry_path, &dst_path, options)?;
        } else {
            fs::copy(&entry_path, &dst_path)?;
        }
    }

    Ok(())
}

fn local_path(address: &str) -> Result<PathBuf> {
    let url = Url::parse(address).map_err(|e| IngestError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    url.to_file_path().map_err(|()| IngestError::InvalidAddress {
        address: address.to_string(),
        reason: "not a local file path".to_string(),
    })
}

pub fn transfer(address: &str, dest: &Path) -> Result<()> {
    let src = local_path(address)?;
    if src.is_dir() {
        tracing::debug!(src = %src.display(), "copying local module");
        return copy_dir_recursive(&src, dest, &CopyOptions::exclude_git())
            .map_err(|e| io_error(&src, &e));
    }
    if !src.is_file() {
        return Err(IngestError::PathNotFound {
            path: src.display().to_string(),
        });
    }
    let name = src.to_string_lossy();
    match ArchiveKind::from_path(&name) {
        Some(kind) => decompress(kind, &src, dest),
        None => {
            fs::create_dir_all(dest).map_err(|e| io_error(dest, &e))?;
            let target = dest.join(src.file_name().unwrap_or_default());
            fs::copy(&src, &target).map_err(|e| io_error(&src, &e))?;
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_directory_excludes_git() {
        let src = TempDir::new().expect("temp");
        fs::create_dir_all(src.path().join(".git/objects")).expect("mkdir");
        fs::create_dir_all(src.path().join("nested")).expect("mkdir");
        fs::write(src.path().join("main.tf"), "").expect("write");
        fs::write(src.path().join("nested/vars.tf"), "").expect("write");

        let dest = TempDir::new().expect("temp");
        let target = dest.path().join("copy");
        let url = Url::from_directory_path(src.path()).expect("url");
        transfer(url.as_str(), &target).expect("copy");

        assert!(target.join("main.tf").is_file());
        assert!(target.join("nested/vars.tf").is_file());
        assert!(!target.join(".git").exists());
    }

    #[test]
    fn test_missing_path() {
        let dest = TempDir::new().expect("temp");
        let err = transfer("file:///definitely/not/here", dest.path()).expect_err("missing");
        assert!(matches!(err, IngestError::PathNotFound { .. }));
    }
}
