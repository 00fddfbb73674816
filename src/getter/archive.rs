//! Archive decompression for downloaded modules
//!
//! Supported formats: `zip`, `tar`, `tar.gz`/`tgz`, `tar.bz2`/`tbz2`,
//! `tar.xz`/`txz`, and single-file `gz`, `bz2`, `xz`.
//! Entries with absolute paths or `..` components are rejected.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use crate::error::{IngestError, Result, io_error};

/// Archive formats recognized by extension or `?archive=`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Gz,
    Bz2,
    Xz,
}

/// Extensions in match order, longest first so `tar.gz` wins over `gz`
const EXTENSIONS: [(&str, ArchiveKind); 11] = [
    ("tar.gz", ArchiveKind::TarGz),
    ("tar.bz2", ArchiveKind::TarBz2),
    ("tar.xz", ArchiveKind::TarXz),
    ("tgz", ArchiveKind::TarGz),
    ("tbz2", ArchiveKind::TarBz2),
    ("txz", ArchiveKind::TarXz),
    ("tar", ArchiveKind::Tar),
    ("zip", ArchiveKind::Zip),
    ("gz", ArchiveKind::Gz),
    ("bz2", ArchiveKind::Bz2),
    ("xz", ArchiveKind::Xz),
];

impl ArchiveKind {
    /// Parse an `?archive=` value such as `tar.gz` or `zip`
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_start_matches('.').to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(ext, _)| *ext == name)
            .map(|(_, kind)| *kind)
    }

    /// Detect the format from the end of a URL path or file name
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(ext, _)| {
                lower
                    .strip_suffix(ext)
                    .is_some_and(|rest| rest.ends_with('.'))
            })
            .map(|(_, kind)| *kind)
    }

    fn extension(self) -> &'static str {
        EXTENSIONS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map_or("", |(ext, _)| ext)
    }
}

/// Decompress `src` into the directory `dest`
pub fn decompress(kind: ArchiveKind, src: &Path, dest: &Path) -> Result<()> {
    tracing::debug!(archive = %src.display(), dest = %dest.display(), ?kind, "decompressing");
    fs::create_dir_all(dest).map_err(|e| io_error(dest, &e))?;
    let file = File::open(src).map_err(|e| io_error(src, &e))?;

    let result = match kind {
        ArchiveKind::Zip => unzip(file, dest),
        ArchiveKind::Tar => untar(file, dest),
        ArchiveKind::TarGz => untar(flate2::read::GzDecoder::new(file), dest),
        ArchiveKind::TarBz2 => untar(bzip2::read::BzDecoder::new(file), dest),
        ArchiveKind::TarXz => untar(xz2::read::XzDecoder::new(file), dest),
        ArchiveKind::Gz => single_file(flate2::read::GzDecoder::new(file), src, kind, dest),
        ArchiveKind::Bz2 => single_file(bzip2::read::BzDecoder::new(file), src, kind, dest),
        ArchiveKind::Xz => single_file(xz2::read::XzDecoder::new(file), src, kind, dest),
    };

    result.map_err(|err| match err {
        IngestError::Archive { reason, .. } => IngestError::Archive {
            path: src.display().to_string(),
            reason,
        },
        other => other,
    })
}

fn archive_error(reason: impl ToString) -> IngestError {
    IngestError::Archive {
        path: String::new(),
        reason: reason.to_string(),
    }
}

/// Reject entries that would land outside the destination directory
fn checked_entry_path(path: &Path) -> Result<PathBuf> {
    let safe = path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe || path.as_os_str().is_empty() {
        return Err(IngestError::UnsafeArchiveEntry {
            entry: path.display().to_string(),
        });
    }
    Ok(path.to_path_buf())
}

fn untar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let path = entry.path().map_err(archive_error)?.into_owned();
        checked_entry_path(&path)?;
        entry.unpack_in(dest).map_err(archive_error)?;
    }
    Ok(())
}

fn unzip(file: File, dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(IngestError::UnsafeArchiveEntry {
                entry: entry.name().to_string(),
            });
        };
        let relative = checked_entry_path(&relative)?;
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_error(&target, &e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }
        let mut out = File::create(&target).map_err(|e| io_error(&target, &e))?;
        io::copy(&mut entry, &mut out).map_err(archive_error)?;
    }
    Ok(())
}

/// Decompress a single-file stream into `dest/<name without extension>`
fn single_file<R: Read>(mut reader: R, src: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
    let file_name = src
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("archive");
    let stem = file_name
        .strip_suffix(&format!(".{}", kind.extension()))
        .filter(|s| !s.is_empty())
        .unwrap_or(file_name);
    let target = dest.join(checked_entry_path(Path::new(stem))?);
    let mut out = File::create(&target).map_err(|e| io_error(&target, &e))?;
    io::copy(&mut reader, &mut out).map_err(archive_error)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).expect("create archive");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .expect("append");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ArchiveKind::from_path("/m/vpc.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_path("vpc.TGZ"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_path("vpc.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_path("main.tf.gz"), Some(ArchiveKind::Gz));
        assert_eq!(ArchiveKind::from_path("/v1/modules/a/b/c"), None);
        assert_eq!(ArchiveKind::from_path("targz"), None);
        assert_eq!(ArchiveKind::from_name("tar.bz2"), Some(ArchiveKind::TarBz2));
    }

    #[test]
    fn test_decompress_tar_gz() {
        let temp = TempDir::new().expect("temp");
        let archive = temp.path().join("module.tar.gz");
        write_tar_gz(
            &archive,
            &[("main.tf", "resource \"a\" \"b\" {}"), ("sub/vars.tf", "")],
        );
        let dest = temp.path().join("out");
        decompress(ArchiveKind::TarGz, &archive, &dest).expect("decompress");
        assert!(dest.join("main.tf").is_file());
        assert!(dest.join("sub/vars.tf").is_file());
    }

    #[test]
    fn test_decompress_zip() {
        let temp = TempDir::new().expect("temp");
        let archive = temp.path().join("module.zip");
        {
            let file = File::create(&archive).expect("create");
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("nested/main.tf", options).expect("start");
            writer.write_all(b"variable \"x\" {}").expect("write");
            writer.finish().expect("finish");
        }
        let dest = temp.path().join("out");
        decompress(ArchiveKind::Zip, &archive, &dest).expect("decompress");
        let contents = fs::read_to_string(dest.join("nested/main.tf")).expect("read");
        assert_eq!(contents, "variable \"x\" {}");
    }

    #[test]
    fn test_decompress_single_gz() {
        let temp = TempDir::new().expect("temp");
        let archive = temp.path().join("main.tf.gz");
        {
            let file = File::create(&archive).expect("create");
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"locals {}").expect("write");
            encoder.finish().expect("finish");
        }
        let dest = temp.path().join("out");
        decompress(ArchiveKind::Gz, &archive, &dest).expect("decompress");
        assert_eq!(fs::read_to_string(dest.join("main.tf")).expect("read"), "locals {}");
    }

    #[test]
    fn test_rejects_parent_components() {
        assert!(checked_entry_path(Path::new("../escape.tf")).is_err());
        assert!(checked_entry_path(Path::new("/etc/passwd")).is_err());
        assert!(checked_entry_path(Path::new("ok/main.tf")).is_ok());
    }

    #[test]
    fn test_corrupt_archive_reports_path() {
        let temp = TempDir::new().expect("temp");
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"not a zip").expect("write");
        let err = decompress(ArchiveKind::Zip, &archive, &temp.path().join("out"))
            .expect_err("corrupt archive");
        assert!(err.to_string().contains("broken.zip"));
    }
}
