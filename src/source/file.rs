//! `file` scheme: local regular files and named pipes (FIFOs).

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncReadExt;

use crate::error::SourceError;
use crate::source::Source;

pub(super) async fn open(path: &Path) -> Result<Box<dyn Source>, SourceError> {
    // Open read/write rather than read-only: on platforms where opening a
    // named pipe for read blocks until a writer attaches, opening O_RDWR
    // does not block, which matters for FIFOs fed by a live producer.
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => SourceError::PermissionDenied(path.display().to_string()),
            _ => SourceError::Connect(e),
        })?;
    Ok(Box::new(FileSource { file }))
}

struct FileSource {
    file: File,
}

#[async_trait]
impl Source for FileSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf).await
    }

    async fn close(&mut self) {
        // Dropping the handle on the next teardown step is sufficient;
        // there is no separate shutdown syscall for a plain file.
    }
}
