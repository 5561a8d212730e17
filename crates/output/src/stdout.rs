//! Stdout output - newline-delimited parts on standard output

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use sluice_component::Result;
use sluice_message::Batch;

use crate::writer::{AsyncWriter, Writer, WriterConfig};

/// Writes each part as one line on standard output
///
/// A `Writer` driver in its simplest form; wrap it with [`StdoutOutput::new`]
/// to obtain a streamed output.
pub struct StdoutWriter {
    stdout: Mutex<tokio::io::Stdout>,
}

impl StdoutWriter {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Writer for StdoutWriter {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn write(&self, batch: &Batch) -> Result<()> {
        let mut stdout = self.stdout.lock().await;
        for part in batch.iter() {
            stdout.write_all(part.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut stdout = self.stdout.lock().await;
        stdout.flush().await?;
        Ok(())
    }
}

/// Streamed stdout output
pub struct StdoutOutput;

impl StdoutOutput {
    /// Build the stdout output with the given writer tuning
    pub fn new(conf: WriterConfig) -> AsyncWriter<StdoutWriter> {
        AsyncWriter::new("stdout", StdoutWriter::new(), conf)
    }
}
