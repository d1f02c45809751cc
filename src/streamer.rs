use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::watcher::FileWriteWatcher;

// POSIX serializes writes against later reads: a read that can be proven to
// occur after a write observes that write, even across processes. Any number
// of readers can therefore follow a single writer without coordination, as
// long as each reader makes one last pass over the file *after* the writer is
// known to be finished.

const STREAMER_CLOSED: &str = "streamer closed";

/// Sticky terminal outcome of a streamer. Once set, every subsequent read
/// returns it again.
enum Terminal {
    EndOfStream,
    Failed { kind: io::ErrorKind, message: String },
}

/// A byte reader over a file that has at most a single active writer.
///
/// Reads existing data from the start of the file, then follows live appends
/// by blocking on write pulses. Returns end-of-stream (a zero-length read)
/// once `writer_done` has fired and the last byte has been delivered. Readers
/// may attach at any point in the file's life, including after the writer is
/// long gone; each replays the file from byte 0.
pub struct LiveFileStreamer {
    file: Option<File>,
    watcher: FileWriteWatcher,
    writer_done: CancellationToken,
    draining: bool,
    terminal: Option<Terminal>,
    closed: bool,
}

impl LiveFileStreamer {
    /// Open a streamer over the file at `path`. `writer_done` must fire once
    /// the writer has been closed and no further appends can happen.
    pub async fn new(path: &Path, writer_done: CancellationToken) -> io::Result<Self> {
        let file = File::open(path).await.map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("error opening output file '{}' for reading: {e}", path.display()),
            )
        })?;

        // The watch must exist before the first read so that writes landing
        // after we catch up to the tail are covered by a later pulse.
        let watcher = FileWriteWatcher::new(path)?;

        Ok(Self {
            file: Some(file),
            watcher,
            writer_done,
            draining: false,
            terminal: None,
            closed: false,
        })
    }

    /// Read the next run of bytes.
    ///
    /// Returns `Ok(n)` with `n > 0` when data was available, `Ok(0)` for
    /// end-of-stream, or a sticky error. Blocks while the reader is caught up
    /// to the tail and the writer is still live.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(terminal) = &self.terminal {
                return match terminal {
                    Terminal::EndOfStream => Ok(0),
                    Terminal::Failed { kind, message } => {
                        Err(io::Error::new(*kind, message.clone()))
                    }
                };
            }

            let read = match self.file.as_mut() {
                Some(file) => file.read(buf).await,
                None => Err(io::Error::other(STREAMER_CLOSED)),
            };
            let count = match read {
                Ok(count) => count,
                Err(e) => return Err(self.fail(e)),
            };
            if count > 0 || buf.is_empty() {
                return Ok(count);
            }

            // Caught up to the current tail.
            if self.draining {
                // The watcher is already shut down; consume its pulse stream
                // to completion and settle the terminal state.
                while self.watcher.recv().await.is_some() {}
                if let Some(cause) = self.watcher.error() {
                    return Err(self.fail(io::Error::other(cause)));
                }
                self.terminal = Some(Terminal::EndOfStream);
                return Ok(0);
            }

            tokio::select! {
                pulse = self.watcher.recv() => {
                    if pulse.is_none() {
                        // The watch shut down on its own. Surface its cause,
                        // or finish the file if it ended cleanly.
                        if let Some(cause) = self.watcher.error() {
                            return Err(self.fail(io::Error::other(cause)));
                        }
                        self.draining = true;
                    }
                    // A pulse is only a hint; loop back and attempt the read.
                }
                _ = self.writer_done.cancelled() => {
                    // No more writes are coming. Shut the watcher so no pulse
                    // can block us, then make one last pass over the file.
                    self.draining = true;
                    if let Err(cause) = self.watcher.close() {
                        while self.watcher.recv().await.is_some() {}
                        return Err(self.fail(io::Error::other(cause)));
                    }
                }
            }
        }
    }

    /// Release the watch and the read handle. Safe for multiple calls, but
    /// subsequent calls are ineffectual and return `Ok`. Every read after
    /// `close` fails.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.watcher.close();
        // Drain the pulse stream as per our contract with the watcher.
        while self.watcher.recv().await.is_some() {}

        self.file = None;
        self.terminal = Some(Terminal::Failed {
            kind: io::ErrorKind::Other,
            message: STREAMER_CLOSED.to_string(),
        });

        result.map_err(io::Error::other)
    }

    fn fail(&mut self, error: io::Error) -> io::Error {
        self.terminal = Some(Terminal::Failed {
            kind: error.kind(),
            message: error.to_string(),
        });
        error
    }
}
