use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use crate::Result;

/// Destination of the generated calendar
pub trait OutputSink: Send + Sync {
    /// Human-readable location, used in logs
    fn describe(&self) -> String;

    /// Bytes currently published, if any.
    fn read_current(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the published calendar. Readers never observe a partial file.
    fn publish(&self, calendar: &[u8]) -> Result<()>;
}

/// Calendar file on the local disk, replaced atomically by rename
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "calendar.ics".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl OutputSink for FileSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_current(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn publish(&self, calendar: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = self.staging_path();
        let written = fs::File::create(&staging).and_then(|mut file| {
            file.write_all(calendar)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&staging, &self.path)) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }

        tracing::debug!("Wrote {} bytes to {}", calendar.len(), self.path.display());
        Ok(())
    }
}
