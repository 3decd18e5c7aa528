//! Server log file handling.

use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};

/// Create (truncate) the log file that receives the server's output.
///
/// # Errors
///
/// `Error::LogFile` if the file cannot be created.
pub fn create_log_file(path: &Path) -> Result<std::fs::File> {
    std::fs::File::create(path).map_err(|e| Error::LogFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// First `limit` bytes of the file, decoded lossily.
///
/// # Errors
///
/// I/O errors opening or reading the file.
pub async fn read_head(path: &Path, limit: usize) -> Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut buf = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Last `limit` bytes of the file, decoded lossily.
///
/// # Errors
///
/// I/O errors opening, seeking or reading the file.
pub async fn read_tail(path: &Path, limit: usize) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    file.seek(SeekFrom::Start(size.saturating_sub(limit as u64)))
        .await?;
    let mut buf = Vec::with_capacity(limit);
    file.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
