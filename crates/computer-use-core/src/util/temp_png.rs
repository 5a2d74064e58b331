//! Scratch files for external capture tools
//!
//! Capture tools such as scrot, xwd and `screencapture` write to a path
//! instead of stdout. [`CaptureScratch`] hands out a path inside a private
//! temporary directory, reads the result back and removes everything on
//! drop, so a failed or timed-out capture never leaves files behind.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{DesktopError, DesktopResult};

/// PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Returns true if `bytes` starts with the PNG signature
pub fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
}

/// Private temporary directory holding capture output
#[derive(Debug)]
pub struct CaptureScratch {
    dir: TempDir,
}

impl CaptureScratch {
    pub fn new() -> DesktopResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("computer-use-")
            .tempdir()
            .map_err(|e| DesktopError::io("creating capture directory", e))?;
        Ok(Self { dir })
    }

    /// Path for a file named `name` inside the scratch directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Reads a PNG written by an external tool
    ///
    /// Fails if the file is missing, empty or not a PNG.
    pub async fn read_png(&self, path: &Path, tool: &str) -> DesktopResult<Vec<u8>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DesktopError::io(format!("reading {tool} output"), e))?;

        if !is_png(&bytes) {
            return Err(DesktopError::CommandFailed {
                program: tool.to_string(),
                status: Some(0),
                stderr: format!("output is not a PNG image ({} bytes)", bytes.len()),
            });
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY_PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0];

    #[test]
    fn test_is_png() {
        assert!(is_png(TINY_PNG_HEADER));
        assert!(!is_png(b"GIF89a"));
        assert!(!is_png(&[]));
    }

    #[tokio::test]
    async fn test_read_png_accepts_png() {
        let scratch = CaptureScratch::new().unwrap();
        let path = scratch.file("capture.png");
        std::fs::write(&path, TINY_PNG_HEADER).unwrap();

        let bytes = scratch.read_png(&path, "scrot").await.unwrap();
        assert_eq!(bytes, TINY_PNG_HEADER);
    }

    #[tokio::test]
    async fn test_read_png_rejects_other_content() {
        let scratch = CaptureScratch::new().unwrap();
        let path = scratch.file("capture.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = scratch.read_png(&path, "scrot").await.unwrap_err();
        assert!(matches!(err, DesktopError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_read_png_missing_file() {
        let scratch = CaptureScratch::new().unwrap();
        let err = scratch
            .read_png(&scratch.file("missing.png"), "xwd")
            .await
            .unwrap_err();
        assert!(matches!(err, DesktopError::Io { .. }));
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let scratch = CaptureScratch::new().unwrap();
        let dir = scratch.dir().to_path_buf();
        assert!(dir.exists());

        drop(scratch);
        assert!(!dir.exists());
    }
}
