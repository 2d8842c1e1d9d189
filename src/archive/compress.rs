use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix added to the object name of a compressed upload.
pub const GZIP_SUFFIX: &str = ".gz";

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("I/O error compressing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compression task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Gzip `source` into `staging/{file_name}.gz` and return the staged path.
///
/// Runs on the blocking pool. The raw file is left untouched.
pub async fn gzip_into(
    source: &Path,
    staging: &Path,
    file_name: &str,
) -> Result<PathBuf, CompressError> {
    let source = source.to_path_buf();
    let staging = staging.to_path_buf();
    let target = staging.join(format!("{}{}", file_name, GZIP_SUFFIX));

    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&staging).map_err(|e| io_error(&staging, e))?;
        gzip_file(&source, &target)?;
        Ok(target)
    })
    .await?
}

fn gzip_file(source: &Path, target: &Path) -> Result<(), CompressError> {
    let mut input = File::open(source).map_err(|e| io_error(source, e))?;
    let output = File::create(target).map_err(|e| io_error(target, e))?;

    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder).map_err(|e| io_error(target, e))?;
    encoder
        .finish()
        .and_then(|file| file.sync_all())
        .map_err(|e| io_error(target, e))
}

fn io_error(path: &Path, source: std::io::Error) -> CompressError {
    CompressError::Io {
        path: path.to_path_buf(),
        source,
    }
}
