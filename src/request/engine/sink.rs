use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::request::RequestError;

/// Where response body bytes go while a request is in flight.
pub(super) enum Sink {
    Buffer(BytesMut),
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

/// Finished body: accumulated bytes or the path of the written file.
pub(super) enum Delivered {
    Body(Bytes),
    File(PathBuf),
}

impl Sink {
    pub(super) fn buffer() -> Self {
        Self::Buffer(BytesMut::new())
    }

    /// Creates (or truncates) the destination file, creating parent
    /// directories as needed.
    pub(super) async fn file(path: PathBuf) -> Result<Self, RequestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RequestError::io(parent, e))?;
        }
        let file = File::create(&path)
            .await
            .map_err(|e| RequestError::io(path.clone(), e))?;
        Ok(Self::File {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub(super) async fn write(&mut self, chunk: &[u8]) -> Result<(), RequestError> {
        match self {
            Self::Buffer(buffer) => {
                buffer.extend_from_slice(chunk);
                Ok(())
            }
            Self::File { path, writer } => writer
                .write_all(chunk)
                .await
                .map_err(|e| RequestError::io(path.clone(), e)),
        }
    }

    /// Flushes the sink. A file that fails to flush is removed.
    pub(super) async fn finish(self) -> Result<Delivered, RequestError> {
        match self {
            Self::Buffer(buffer) => Ok(Delivered::Body(buffer.freeze())),
            Self::File { path, mut writer } => match writer.flush().await {
                Ok(()) => Ok(Delivered::File(path)),
                Err(e) => {
                    drop(writer);
                    remove_partial(&path).await;
                    Err(RequestError::io(path, e))
                }
            },
        }
    }

    /// Drops buffered data; removes a partially written file.
    pub(super) async fn discard(self) {
        if let Self::File { path, writer } = self {
            drop(writer);
            remove_partial(&path).await;
        }
    }
}

pub(super) async fn remove_partial(path: &Path) {
    debug!(path = %path.display(), "cleaning up partial file");
    let _ = tokio::fs::remove_file(path).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffer_sink_accumulates_in_order() {
        let mut sink = Sink::buffer();
        sink.write(b"hello ").await.unwrap();
        sink.write(b"world").await.unwrap();
        match sink.finish().await.unwrap() {
            Delivered::Body(body) => assert_eq!(body, Bytes::from_static(b"hello world")),
            Delivered::File(_) => panic!("expected buffered body"),
        }
    }

    #[tokio::test]
    async fn test_file_sink_writes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");

        let mut sink = Sink::file(path.clone()).await.unwrap();
        sink.write(b"abc").await.unwrap();
        sink.write(b"def").await.unwrap();
        match sink.finish().await.unwrap() {
            Delivered::File(written) => assert_eq!(written, path),
            Delivered::Body(_) => panic!("expected file"),
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_discard_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.bin");

        let mut sink = Sink::file(path.clone()).await.unwrap();
        sink.write(b"half").await.unwrap();
        sink.discard().await;

        assert!(!path.exists());
    }
}
