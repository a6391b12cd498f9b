//! FileProvider - appends events to a JSON lines file

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use contracts::{ContractError, Event, Provider};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, instrument};

/// Provider that writes one JSON document per event
pub struct FileProvider {
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileProvider {
    /// Open (or create) `path` for appending
    pub async fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            name: name.into(),
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Create from provider `params`
    ///
    /// Requires `path`.
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let path = params.get("path").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing 'path' param")
        })?;
        Self::open(name, path).await
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_events(&mut self, events: &[Event]) -> std::io::Result<()> {
        for event in events {
            let line = serde_json::to_vec(event)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            self.writer.write_all(&line).await?;
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await
    }
}

impl Provider for FileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_provider_push",
        skip(self, events),
        fields(provider = %self.name, events = events.len())
    )]
    async fn push(&mut self, events: &[Event]) -> Result<(), ContractError> {
        self.write_events(events).await.map_err(|e| {
            error!(provider = %self.name, path = %self.path.display(), error = %e, "Write failed");
            ContractError::provider_push(&self.name, e.to_string())
        })
    }

    #[instrument(name = "file_provider_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        debug!(provider = %self.name, "FileProvider closed");
        Ok(())
    }
}
