// File appender transport
//
// One JSON object per line, appended to a persistent write stream and
// flushed per batch. When the file grows past `max_bytes` it is renamed
// aside with a timestamp suffix and a fresh file is opened; archival of
// rotated files is someone else's job.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use auditcore_core::{Batch, TransportError};
use chrono::Utc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::info;

use crate::Transport;

#[derive(Debug, Clone)]
pub struct FileTransportConfig {
    pub path: PathBuf,
    /// Rotate when the file reaches this size. `None` disables rotation.
    pub max_bytes: Option<u64>,
}

impl FileTransportConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: None,
        }
    }
}

struct OpenFile {
    writer: BufWriter<File>,
    written: u64,
}

pub struct FileTransport {
    config: FileTransportConfig,
    // tokio Mutex: held across the write awaits.
    state: Mutex<Option<OpenFile>>,
}

impl FileTransport {
    pub fn new(config: FileTransportConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    async fn open(path: &Path) -> Result<OpenFile, TransportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let written = file.metadata().await?.len();
        Ok(OpenFile {
            writer: BufWriter::new(file),
            written,
        })
    }

    async fn rotate(&self, state: &mut Option<OpenFile>) -> Result<(), TransportError> {
        if let Some(mut open) = state.take() {
            open.writer.flush().await?;
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let rotated = self.config.path.with_extension(format!("log.{}", stamp));
        tokio::fs::rename(&self.config.path, &rotated).await?;
        info!(path = %rotated.display(), "rotated log file");
        Ok(())
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        let mut lines = Vec::new();
        for event in batch.events() {
            serde_json::to_writer(&mut lines, event)?;
            lines.push(b'\n');
        }

        let mut state = self.state.lock().await;
        if state.is_none() {
            *state = Some(Self::open(&self.config.path).await?);
        }
        let open = state.as_mut().expect("file opened above");

        open.writer.write_all(&lines).await?;
        open.writer.flush().await?;
        open.written += lines.len() as u64;

        if let Some(max) = self.config.max_bytes {
            if open.written >= max {
                self.rotate(&mut state).await?;
            }
        }
        Ok(())
    }

    async fn drain(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if let Some(open) = state.as_mut() {
            open.writer.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditcore_core::{Event, FieldMap, Level};

    fn batch(messages: &[&str]) -> Batch {
        Batch::new(
            messages
                .iter()
                .map(|m| Event::new(Level::Info, *m, FieldMap::new()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_appends_ndjson_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let transport = FileTransport::new(FileTransportConfig::new(&path));

        transport.send(&batch(&["one", "two"])).await.unwrap();
        transport.send(&batch(&["three"])).await.unwrap();
        transport.drain().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["level"], "info");
        }
        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last["message"], "three");
    }

    #[tokio::test]
    async fn test_rotation_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let transport = FileTransport::new(FileTransportConfig {
            path: path.clone(),
            max_bytes: Some(64),
        });

        // Each send exceeds 64 bytes, so each one rotates.
        transport.send(&batch(&["first batch event"])).await.unwrap();
        transport.send(&batch(&["second batch event"])).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        let rotated = entries.iter().filter(|n| n.contains("log.")).count();
        assert!(rotated >= 1, "expected a rotated file, got {:?}", entries);
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/audit.log");
        let transport = FileTransport::new(FileTransportConfig::new(&path));
        transport.send(&batch(&["hello"])).await.unwrap();
        assert!(path.exists());
    }
}
