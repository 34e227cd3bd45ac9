// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Audio transcoding through an external encoder process.
//!
//! Each call to [`Transcoder::transcode`] spawns exactly one encoder. Two
//! copies run concurrently: the input stream is fed into the encoder's stdin
//! by a feeder task, and a driver task forwards stdout into the returned
//! [`TranscodeStream`]. The encoder's stderr is inherited, so its diagnostics
//! reach the host's stderr unchanged.
//!
//! Dropping the [`TranscodeStream`] at any point (client disconnect, server
//! shutdown) aborts the driver, which kills the encoder and aborts the feeder.
//! The input stream is owned by the feeder and is therefore closed exactly
//! once, including when the encoder never starts.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::error::TranscodeError;
use crate::http::ByteStream;

/// Encoder arguments: stdin to 16 kbit/s Opus tuned for voice on stdout
pub const ENCODER_ARGS: &[&str] = &[
    "-hide_banner",
    "-loglevel",
    "warning",
    "-i",
    "-",
    "-f",
    "opus",
    "-vn",
    "-c:a",
    "libopus",
    "-b:a",
    "16k",
    "-application",
    "voip",
    "-",
];

/// Content type of the encoder's output
pub const OUTPUT_CONTENT_TYPE: &str = "audio/ogg";

/// Output chunks buffered between the encoder and the consumer
const OUTPUT_BUFFER_CHUNKS: usize = 8;

/// Spawns encoder processes
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    args: Vec<String>,
}

impl Transcoder {
    /// Create a transcoder running `program` with the fixed encoder arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::with_args(program, ENCODER_ARGS.iter().copied())
    }

    /// Create a transcoder running `program` with custom arguments
    pub fn with_args<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Start transcoding `input`
    ///
    /// Resolves once the encoder has produced its first chunk of output or
    /// has finished. Failing to start, or exiting unsuccessfully before any
    /// output, is reported here; later failures end the stream with an error.
    pub async fn transcode(&self, input: ByteStream) -> Result<TranscodeStream, TranscodeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(TranscodeError::Pipe(io::Error::other(
                "encoder stdio was not captured",
            )));
        };

        tracing::debug!(program = %self.program.display(), pid = ?child.id(), "encoder started");

        let process = EncoderProcess {
            child,
            feeder: tokio::spawn(feed_input(input, stdin)),
        };

        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER_CHUNKS);
        let mut stream = TranscodeStream {
            pending: None,
            rx,
            driver: tokio::spawn(drive_output(process, stdout, tx)),
        };

        match stream.rx.recv().await {
            Some(Ok(chunk)) => stream.pending = Some(chunk),
            Some(Err(e)) => return Err(e),
            None => {}
        }

        Ok(stream)
    }
}

/// A running encoder and the task feeding its stdin
///
/// Dropping it aborts the feeder and kills the process if still running.
struct EncoderProcess {
    child: Child,
    feeder: JoinHandle<io::Result<u64>>,
}

impl EncoderProcess {
    /// Wait for the encoder to exit and check how both copies ended
    async fn finish(&mut self) -> Result<(), TranscodeError> {
        let status = self.child.wait().await.map_err(TranscodeError::Pipe)?;
        if !status.success() {
            return Err(TranscodeError::Exit(status));
        }

        // The encoder is done with stdin; a feeder still waiting on input is
        // cancelled by drop.
        if self.feeder.is_finished() {
            match (&mut self.feeder).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(TranscodeError::Pipe(e)),
                Err(e) => return Err(TranscodeError::Pipe(io::Error::other(e))),
            }
        }

        Ok(())
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}

/// Copy the input stream into the encoder's stdin, then close it
async fn feed_input(input: ByteStream, mut stdin: ChildStdin) -> io::Result<u64> {
    let mut reader = StreamReader::new(input.map_err(io::Error::other));
    let copied = tokio::io::copy(&mut reader, &mut stdin).await?;
    stdin.shutdown().await?;
    Ok(copied)
}

/// Forward encoder output to the channel, then report how the encoder exited
async fn drive_output(
    mut process: EncoderProcess,
    stdout: ChildStdout,
    tx: mpsc::Sender<Result<Bytes, TranscodeError>>,
) {
    let mut output = ReaderStream::new(stdout);

    while let Some(chunk) = output.next().await {
        let chunk = chunk.map_err(TranscodeError::Pipe);
        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() {
            tracing::debug!("transcode consumer went away, stopping encoder");
            return;
        }
        if failed {
            return;
        }
    }

    match process.finish().await {
        Ok(()) => tracing::debug!("encoder finished"),
        Err(e) => {
            let _ = tx.send(Err(e)).await;
        }
    }
}

/// Encoder output as a byte stream
///
/// Dropping the stream stops the encoder.
pub struct TranscodeStream {
    pending: Option<Bytes>,
    rx: mpsc::Receiver<Result<Bytes, TranscodeError>>,
    driver: JoinHandle<()>,
}

impl Stream for TranscodeStream {
    type Item = Result<Bytes, TranscodeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(chunk) = self.pending.take() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for TranscodeStream {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
