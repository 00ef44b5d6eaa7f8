//! `fork` scheme: spawn a child process and read its standard output.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};

use crate::error::SourceError;
use crate::source::Source;

pub(super) async fn open(program: &str, args: &[String]) -> Result<Box<dyn Source>, SourceError> {
    let mut child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => SourceError::PermissionDenied(program.to_owned()),
            _ => SourceError::Connect(e),
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        SourceError::Connect(io::Error::new(io::ErrorKind::Other, "child process had no stdout pipe"))
    })?;

    Ok(Box::new(ForkSource { child, stdout }))
}

struct ForkSource {
    child: Child,
    stdout: ChildStdout,
}

#[async_trait]
impl Source for ForkSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf).await
    }

    async fn close(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}
