use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A request-scoped file on local storage holding an uploaded payload.
///
/// The file is removed when the handle is dropped, so it cannot outlive the
/// request on any exit path. A write failure is fatal to the current
/// request; there is no retry.
pub struct ScratchFile {
    inner: NamedTempFile,
}

impl ScratchFile {
    pub fn from_bytes(data: &[u8]) -> std::io::Result<Self> {
        let mut inner = NamedTempFile::new()?;
        inner.write_all(data)?;
        inner.flush()?;
        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}
