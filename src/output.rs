//! Output stage: buffered, mirrored, periodically-flushed result writer
//!
//! A single consumer task owns an optional output file and unconditionally
//! mirrors every line to standard output. Every line passes through
//! [`sanitize_line`] first. The stage can be closed and restarted with a
//! fresh channel, which the wildcard-filter emission phase (§4.5 Phase 4)
//! depends on to replay a filtered result set through the same sink.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::ErrorKind;
use crate::sanitize::sanitize_line;

/// A running output consumer: a sender half workers push lines into, and
/// the task handle that drains it.
pub struct OutputStage {
    output: Option<PathBuf>,
    flush_interval: i64,
    tx: Option<Sender<String>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl OutputStage {
    /// Spawns the consumer task immediately.
    pub fn start(output: Option<PathBuf>, flush_interval: i64) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let handle = tokio::spawn(run_consumer(output.clone(), flush_interval, rx));
        Self {
            output,
            flush_interval,
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Clones the sender half for a worker to push results into.
    pub fn sender(&self) -> Sender<String> {
        self.tx
            .clone()
            .expect("sender requested after output stage was closed")
    }

    /// Closes the current channel and awaits the consumer's drain, without
    /// starting a new one.
    pub async fn close(&mut self) -> Result<()> {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("output consumer task panicked")??;
        }
        Ok(())
    }

    /// Closes the current consumer and starts a fresh one with a new
    /// channel. In wildcard mode nothing is written before this point (the
    /// pool routes results into the host store instead), so this is where
    /// the filtered result set gets its first and only writer.
    pub async fn restart(&mut self) -> Result<()> {
        self.close().await?;
        debug!("restarting output stage for wildcard-filtered emission");
        let (tx, rx) = mpsc::channel(1024);
        self.tx = Some(tx);
        self.handle = Some(tokio::spawn(run_consumer(
            self.output.clone(),
            self.flush_interval,
            rx,
        )));
        Ok(())
    }
}

async fn run_consumer(
    output: Option<PathBuf>,
    flush_interval: i64,
    mut rx: Receiver<String>,
) -> Result<()> {
    let mut writer = match &output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("failed to open output file: {}", path.display()))
                .context(ErrorKind::OutputIo)?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let mut ticker = if flush_interval > 0 {
        Some(tokio::time::interval(Duration::from_secs(flush_interval as u64)))
    } else {
        None
    };

    loop {
        tokio::select! {
            biased;

            maybe_line = rx.recv() => {
                let Some(line) = maybe_line else { break };
                let sanitized = sanitize_line(&line);
                println!("{}", sanitized);
                if let Some(w) = writer.as_mut() {
                    w.write_all(sanitized.as_bytes())
                        .await
                        .context("failed to write output line")
                        .context(ErrorKind::OutputIo)?;
                    w.write_all(b"\n")
                        .await
                        .context("failed to write output line terminator")
                        .context(ErrorKind::OutputIo)?;
                }
            }
            _ = async {
                match ticker.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Some(w) = writer.as_mut() {
                    w.flush()
                        .await
                        .context("periodic output flush failed")
                        .context(ErrorKind::OutputIo)?;
                }
            }
        }
    }

    if let Some(w) = writer.as_mut() {
        w.flush()
            .await
            .context("final output flush failed")
            .context(ErrorKind::OutputIo)?;
    }
    Ok(())
}
