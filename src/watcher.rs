use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask, Watches};
use thiserror::Error;
use tokio::sync::mpsc;

/// Terminal causes reported by a [`FileWriteWatcher`] after its pulse
/// stream has closed.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("error reading from watch: {0}")]
    Read(#[source] std::io::Error),

    #[error("unexpected event returned from watch '{0}'")]
    UnexpectedEvent(u32),

    #[error("error removing watch: {0}")]
    Remove(#[source] std::io::Error),
}

/// Watches a single file for write events.
///
/// Each kernel modify event becomes one unit pulse on [`recv`]. Pulses are
/// hints that the file may have grown, never a count: the kernel coalesces
/// events, so consumers must re-read to the current tail after every pulse.
///
/// The pulse stream closes when the caller invokes [`close`] or the watch
/// terminates on its own; consumers must drain it to completion, after which
/// [`error`] reports the terminal cause.
///
/// [`recv`]: FileWriteWatcher::recv
/// [`close`]: FileWriteWatcher::close
/// [`error`]: FileWriteWatcher::error
pub struct FileWriteWatcher {
    events: mpsc::Receiver<()>,
    watches: Watches,
    desc: WatchDescriptor,
    close_tx: Option<std::sync::mpsc::Sender<()>>,
    error: Arc<Mutex<Option<WatcherError>>>,
}

impl FileWriteWatcher {
    /// Start watching the file at `path` for writes. The path must point to
    /// an existing, regular file.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let mut inotify = Inotify::init()?;
        let mut watches = inotify.watches();
        let desc = watches.add(path, WatchMask::MODIFY)?;

        // Capacity 1: the kernel read loop parks on a full channel until the
        // consumer takes the pending pulse. Backpressure is intentional.
        let (event_tx, events) = mpsc::channel(1);
        let (close_tx, close_rx) = std::sync::mpsc::channel::<()>();
        let error = Arc::new(Mutex::new(None));

        let cause = Arc::clone(&error);
        tokio::task::spawn_blocking(move || {
            let mut buffer = [0u8; 1024];
            let mut failure = None;
            'watch: loop {
                let events = match inotify.read_events_blocking(&mut buffer) {
                    Ok(events) => events,
                    Err(e) => {
                        failure = Some(WatcherError::Read(e));
                        break;
                    }
                };
                for event in events {
                    if event.mask.contains(EventMask::MODIFY) {
                        // Happy path, the file was written to. A send error
                        // means the consumer is gone and we can stop.
                        if event_tx.blocking_send(()).is_err() {
                            break 'watch;
                        }
                    } else if event.mask.contains(EventMask::IGNORED) {
                        // The watch was removed; clean shutdown.
                        break 'watch;
                    } else {
                        failure = Some(WatcherError::UnexpectedEvent(event.mask.bits()));
                        break 'watch;
                    }
                }
            }
            // Hold the inotify descriptor until close() has finished removing
            // the watch; releasing it earlier would race a reused descriptor.
            let _ = close_rx.recv();
            *cause.lock().unwrap_or_else(PoisonError::into_inner) = failure;
            drop(inotify);
        });

        Ok(Self {
            events,
            watches,
            desc,
            close_tx: Some(close_tx),
            error,
        })
    }

    /// Receive the next write pulse. Returns `None` once the watch has shut
    /// down and the stream is exhausted.
    pub async fn recv(&mut self) -> Option<()> {
        self.events.recv().await
    }

    /// Stop the watch. Safe to call more than once; subsequent calls are
    /// ineffectual and return `Ok`. Callers must still drain [`recv`] to
    /// completion.
    ///
    /// [`recv`]: FileWriteWatcher::recv
    pub fn close(&mut self) -> Result<(), WatcherError> {
        if let Some(close_tx) = self.close_tx.take() {
            // Removing the watch forces an IGNORED event out of the kernel,
            // which the read loop recognizes as shutdown.
            let removed = self.watches.remove(self.desc.clone());
            // Dropping our end of the handshake lets the read loop release
            // the descriptor.
            drop(close_tx);
            removed.map_err(WatcherError::Remove)?;
        }
        Ok(())
    }

    /// The terminal cause of the watch. Meaningful only after [`recv`] has
    /// returned `None`; absent on clean shutdown.
    ///
    /// [`recv`]: FileWriteWatcher::recv
    pub fn error(&mut self) -> Option<WatcherError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for FileWriteWatcher {
    fn drop(&mut self) {
        // An unclosed watcher would leave the read loop parked on the kernel
        // descriptor forever.
        let _ = self.close();
    }
}
