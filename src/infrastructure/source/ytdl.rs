//! Video bytes pulled from `yt-dlp` writing to stdout.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{future, stream, StreamExt};
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::infrastructure::ports::{ByteStream, VideoSource};

// Read size for stdout; parts are assembled from these chunks.
const READ_CAPACITY: usize = 256 * 1024;

#[derive(Clone, Debug)]
pub struct YtDlpSource {
    bin: String,
    format: String,
}

impl YtDlpSource {
    pub fn new(bin: &str, format: &str) -> Self {
        Self {
            bin: bin.to_string(),
            format: format.to_string(),
        }
    }
}

#[async_trait]
impl VideoSource for YtDlpSource {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        info!("Opening {} for {}", self.bin, url);

        let mut child = Command::new(&self.bin)
            .args([
                "--format", &self.format,
                "--output", "-",
                "--no-progress",
                "--no-playlist",
                "--quiet",
                url,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn {}: {}", self.bin, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("{} stdout not captured", self.bin))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "ytdl", "{}", line);
                }
            });
        }

        let bin = self.bin.clone();
        // The process exit status is only known after stdout closes; a failed
        // exit becomes the stream's last item.
        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) if status.success() => None::<io::Result<Bytes>>,
                Ok(status) => Some(Err(io::Error::other(format!("{} exited with {}", bin, status)))),
                Err(e) => Some(Err(e)),
            }
        })
        .filter_map(future::ready);

        let body = ReaderStream::with_capacity(stdout, READ_CAPACITY);

        Ok(body.chain(exit).boxed())
    }
}
