use facemetry_queue::{SampleRecord, SampleSource};
use std::path::PathBuf;

/// Reads pending sample bytes from `<dir>/<fileName>`.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SampleSource for DirectorySource {
    fn load(&self, record: &SampleRecord) -> Option<Vec<u8>> {
        // fileName comes from the snapshot; never follow it out of `dir`.
        let name = std::path::Path::new(&record.file_name).file_name()?;
        let path = self.dir.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "sample file unreadable");
                None
            }
        }
    }
}
