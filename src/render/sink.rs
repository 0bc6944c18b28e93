use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{CompositorError, Result};
use crate::render::encoder::EncodedChunk;

/// Finished video, held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl MediaBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write to `path` through a sibling temp file, so readers never see a
    /// partial video
    pub fn write_atomic<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(&self.bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| CompositorError::Io(e.error))?;

        info!("💾 Wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(())
    }
}

/// Collects encoder output into a single blob
pub struct OutputSink;

impl OutputSink {
    /// Concatenate chunks in order; an encoder that produced nothing is an error
    pub fn finalize(chunks: Vec<EncodedChunk>, mime_type: &str) -> Result<MediaBlob> {
        let total: usize = chunks.iter().map(Vec::len).sum();
        if total == 0 {
            return Err(CompositorError::EmptyOutput);
        }

        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }

        Ok(MediaBlob { bytes, mime_type: mime_type.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_finalize_concatenates_in_order() {
        let blob = OutputSink::finalize(vec![vec![1, 2], vec![], vec![3]], "video/mp4").unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(blob.mime_type, "video/mp4");
        assert_eq!(blob.len(), 3);
    }

    #[test]
    fn test_empty_output_is_an_error() {
        assert!(matches!(OutputSink::finalize(Vec::new(), "video/mp4"), Err(CompositorError::EmptyOutput)));
        assert!(matches!(
            OutputSink::finalize(vec![Vec::new(), Vec::new()], "video/mp4"),
            Err(CompositorError::EmptyOutput)
        ));
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("video.mp4");

        let first = MediaBlob { bytes: vec![1; 8], mime_type: "video/mp4".to_string() };
        first.write_atomic(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1; 8]);

        let second = MediaBlob { bytes: vec![2; 4], mime_type: "video/mp4".to_string() };
        second.write_atomic(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![2; 4]);

        // only the final file remains
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
