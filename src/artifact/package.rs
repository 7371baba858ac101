//! Producing the local bundle that gets published.
//!
//! A regular file is shipped as is and assumed to be a zip bundle already (a
//! `.war` or `.jar` is one). A directory is zipped into a temporary file
//! containing the files accepted by a [`FileFilter`], with paths relative to
//! the directory. Zipping runs on the blocking pool.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::task::spawn_blocking;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::glob::FileFilter;
use crate::error::{DeployError, DeployResult};

/// A bundle ready for upload. Temporary archives are removed on drop.
#[derive(Debug)]
pub struct PackagedArtifact {
    path: PathBuf,
    _temp: Option<TempPath>,
}

impl PackagedArtifact {
    /// Wraps an existing bundle file.
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _temp: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Turns a workspace path into an uploadable bundle.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, root: &Path, filter: &FileFilter) -> DeployResult<PackagedArtifact>;
}

/// Default [`Packager`]: pass files through, zip directories.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchivePackager;

#[async_trait]
impl Packager for ArchivePackager {
    async fn package(&self, root: &Path, filter: &FileFilter) -> DeployResult<PackagedArtifact> {
        let meta = tokio::fs::metadata(root).await.map_err(|e| {
            DeployError::Packaging(format!("cannot read {}: {e}", root.display()))
        })?;

        if !meta.is_dir() {
            info!(path = %root.display(), "bundle root is a file, uploading it as is");
            return Ok(PackagedArtifact::existing(root));
        }

        let src = root.to_owned();
        let filter = filter.clone();
        let (temp, files) = spawn_blocking(move || zip_directory(&src, &filter))
            .await
            .map_err(|e| DeployError::Packaging(format!("archiver task failed: {e}")))?
            .map_err(|e| DeployError::Packaging(format!("cannot zip {}: {e}", root.display())))?;

        if files == 0 {
            return Err(DeployError::Packaging(format!(
                "no file under {} matches the include/exclude patterns",
                root.display()
            )));
        }
        info!(path = %root.display(), files, "directory zipped");

        Ok(PackagedArtifact {
            path: temp.to_path_buf(),
            _temp: Some(temp),
        })
    }
}

fn zip_directory(src: &Path, filter: &FileFilter) -> io::Result<(TempPath, usize)> {
    let temp = tempfile::Builder::new()
        .prefix("bundle-")
        .suffix(".zip")
        .tempfile()?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(temp.as_file());
    let mut files = 0usize;

    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !filter.accepts(&name) {
            debug!(file = %name, "skipped by filter");
            continue;
        }
        zip.start_file(name, options).map_err(io::Error::other)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
        files += 1;
    }

    zip.finish().map_err(io::Error::other)?;
    Ok((temp.into_temp_path(), files))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;
    use zip::ZipArchive;

    use super::*;

    fn entries(path: &Path) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut body = String::new();
                file.read_to_string(&mut body).unwrap();
                (file.name().to_string(), body)
            })
            .collect()
    }

    #[tokio::test]
    async fn directory_is_zipped_with_filters() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("app/static")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("app/main.py"), "print('hi')").unwrap();
        std::fs::write(dir.path().join("app/static/site.css"), "body{}").unwrap();
        std::fs::write(dir.path().join("debug.log"), "noise").unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

        let bundle = ArchivePackager
            .package(dir.path(), &FileFilter::new("", "*.log").unwrap())
            .await
            .unwrap();

        assert_eq!(bundle.path().extension().unwrap(), "zip");
        assert_eq!(
            entries(bundle.path()),
            [
                ("app/main.py".to_string(), "print('hi')".to_string()),
                ("app/static/site.css".to_string(), "body{}".to_string()),
            ]
        );

        let path = bundle.path().to_path_buf();
        drop(bundle);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_is_passed_through() {
        let dir = TempDir::new().unwrap();
        let war = dir.path().join("shop.war");
        std::fs::write(&war, "war").unwrap();

        let bundle = ArchivePackager
            .package(&war, &FileFilter::default())
            .await
            .unwrap();
        assert_eq!(bundle.path(), war);
        drop(bundle);
        assert!(war.exists());
    }

    #[tokio::test]
    async fn nothing_matched_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.md"), "x").unwrap();

        let err = ArchivePackager
            .package(dir.path(), &FileFilter::new("*.war", "").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "deploy_packaging");
    }
}
