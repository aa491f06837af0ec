//! Clipboard monitor
//!
//! Polls the backend's change counter on a fixed interval. When it moves,
//! the payload is read once and forwarded as a `CaptureEvent`. The monitor
//! owns the last-seen counter; writes made through `copy_to_clipboard`
//! record the counter they produce so the next poll does not capture them.

use crate::clipboard::{ClipboardBackend, ClipboardPayload};
use crate::interface::{ClipShotError, ClipShotResult};
use crate::pipeline::CaptureEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Processing,
}

struct Shared {
    backend: Arc<dyn ClipboardBackend>,
    events: mpsc::Sender<CaptureEvent>,
    last_change: Mutex<Option<i64>>,
    state: Mutex<MonitorState>,
}

impl Shared {
    /// Check the counter once and forward a new payload if there is one
    async fn poll(&self) -> ClipShotResult<bool> {
        let event = {
            let mut last_change = self.last_change.lock();
            let count = self.backend.change_count()?;
            if *last_change == Some(count) {
                return Ok(false);
            }

            *self.state.lock() = MonitorState::Processing;
            let payload = self.backend.read();
            *self.state.lock() = MonitorState::Idle;

            // On failure the counter is left alone so the next poll retries
            let payload = payload?;
            *last_change = Some(count);

            match payload {
                ClipboardPayload::Image(bytes) => CaptureEvent::ClipboardImage(bytes),
                ClipboardPayload::Text(text) if !text.trim().is_empty() => CaptureEvent::ClipboardText(text),
                _ => {
                    debug!(change_count = count, "Clipboard change carried nothing to capture");
                    return Ok(false);
                }
            }
        };

        self.events
            .send(event)
            .await
            .map_err(|_| ClipShotError::TransientIo("capture channel closed".to_string()))?;
        Ok(true)
    }

    fn record_own_write(&self, write: impl FnOnce() -> ClipShotResult<()>) -> ClipShotResult<()> {
        let mut last_change = self.last_change.lock();
        write()?;
        let count = self.backend.change_count()?;
        *last_change = Some(count);
        debug!(change_count = count, "Recorded own clipboard write");
        Ok(())
    }
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ClipboardMonitor {
    shared: Arc<Shared>,
    poll_interval: Duration,
    task: Mutex<Option<RunningTask>>,
}

impl ClipboardMonitor {
    pub fn new(
        backend: Arc<dyn ClipboardBackend>,
        events: mpsc::Sender<CaptureEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                events,
                last_change: Mutex::new(None),
                state: Mutex::new(MonitorState::Idle),
            }),
            poll_interval,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Start polling. Contents already on the clipboard are not captured.
    /// Calling start on a running monitor does nothing.
    pub fn start(&self) -> ClipShotResult<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClipShotError::InvalidInput(format!("clipboard monitor needs a tokio runtime: {}", e)))?;

        match self.shared.backend.change_count() {
            Ok(count) => *self.shared.last_change.lock() = Some(count),
            Err(e) => warn!(error = %e, "Could not read initial clipboard change count"),
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let interval = self.poll_interval;
        let token = cancel.clone();
        let handle = runtime.spawn(async move { poll_loop(shared, interval, token).await });

        *task = Some(RunningTask { cancel, handle });
        info!(poll_interval_ms = interval.as_millis() as u64, "Clipboard monitor started");
        Ok(())
    }

    /// Stop polling and wait for the poll task to exit. Idempotent.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Clipboard poll task ended abnormally");
        }
        *self.shared.state.lock() = MonitorState::Idle;
        info!("Clipboard monitor stopped");
    }

    /// Run a single poll. Returns true if an event was emitted.
    pub async fn poll_once(&self) -> ClipShotResult<bool> {
        self.shared.poll().await
    }

    /// Write text to the clipboard without capturing it back
    pub fn copy_to_clipboard(&self, text: &str) -> ClipShotResult<()> {
        self.shared.record_own_write(|| self.shared.backend.write_text(text))
    }

    /// Write image bytes to the clipboard without capturing them back
    pub fn copy_image_to_clipboard(&self, bytes: &[u8]) -> ClipShotResult<()> {
        self.shared.record_own_write(|| self.shared.backend.write_image(bytes))
    }
}

async fn poll_loop(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = shared.poll() => match result {
                Ok(_) => {}
                Err(ClipShotError::TransientIo(reason)) => {
                    debug!(reason = %reason, "Clipboard read failed, retrying next poll")
                }
                Err(e) => warn!(error = %e, "Clipboard poll failed"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::pipeline::channel;

    fn monitor() -> (Arc<MemoryClipboard>, ClipboardMonitor, mpsc::Receiver<CaptureEvent>) {
        let clipboard = Arc::new(MemoryClipboard::new());
        let (tx, rx) = channel();
        let monitor = ClipboardMonitor::new(clipboard.clone(), tx, Duration::from_millis(10));
        (clipboard, monitor, rx)
    }

    #[tokio::test]
    async fn test_external_change_emits_event_once() {
        let (clipboard, monitor, mut rx) = monitor();
        clipboard.write_text("copied elsewhere").unwrap();

        assert!(monitor.poll_once().await.unwrap());
        assert!(!monitor.poll_once().await.unwrap());
        assert_eq!(
            rx.try_recv().unwrap(),
            CaptureEvent::ClipboardText("copied elsewhere".into())
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_image_payload_and_blank_text() {
        let (clipboard, monitor, mut rx) = monitor();
        clipboard.write_image(&[9, 9, 9]).unwrap();
        assert!(monitor.poll_once().await.unwrap());
        assert_eq!(rx.try_recv().unwrap(), CaptureEvent::ClipboardImage(vec![9, 9, 9]));

        clipboard.write_text("   \n").unwrap();
        assert!(!monitor.poll_once().await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_own_write_is_not_captured() {
        let (clipboard, monitor, mut rx) = monitor();
        monitor.copy_to_clipboard("from history").unwrap();
        assert!(!monitor.poll_once().await.unwrap());

        monitor.copy_image_to_clipboard(&[1, 2]).unwrap();
        assert!(!monitor.poll_once().await.unwrap());
        assert!(rx.try_recv().is_err());

        // A later external copy is still seen
        clipboard.write_text("external").unwrap();
        assert!(monitor.poll_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_read_failure_is_retried() {
        let (clipboard, monitor, mut rx) = monitor();
        clipboard.write_text("eventually").unwrap();
        clipboard.set_unavailable(true);
        assert!(matches!(monitor.poll_once().await, Err(ClipShotError::TransientIo(_))));
        assert_eq!(monitor.state(), MonitorState::Idle);

        clipboard.set_unavailable(false);
        assert!(monitor.poll_once().await.unwrap());
        assert_eq!(rx.try_recv().unwrap(), CaptureEvent::ClipboardText("eventually".into()));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let (clipboard, monitor, mut rx) = monitor();
        clipboard.write_text("before start").unwrap();

        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());

        clipboard.write_text("while running").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, CaptureEvent::ClipboardText("while running".into()));

        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running());
        assert_eq!(monitor.state(), MonitorState::Idle);
    }
}
