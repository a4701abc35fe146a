// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device poller.
//!
//! Serial card readers are blocking, so the poller drives one on a dedicated
//! OS thread and pushes what it reads into the gateway event queue.
//!
//! Stopping is synchronous: [`DevicePoller::stop`] returns only after the
//! thread has left its loop, so no read is in progress and no further event
//! is queued once it returns. The reader is handed back for the next start.
//!
//! The gateway stops the poller from its event loop, the only consumer of
//! the event queue. The thread therefore never blocks on a full queue: it
//! waits on its stop channel between attempts and drops the pending event
//! once stop arrives.

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::{CardReader, EventSink, OfferError};
use crate::error::DeviceError;
use crate::event::{DeviceEvent, GatewayEvent};
use crate::types::Generation;

/// Default delay between read cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait between attempts to queue an event while the queue is full.
const FULL_QUEUE_RETRY: Duration = Duration::from_millis(20);

/// A running poll loop.
#[derive(Debug)]
pub struct DevicePoller {
    generation: Generation,
    stop_tx: Option<std_mpsc::Sender<()>>,
    handle: Option<JoinHandle<Box<dyn CardReader>>>,
}

impl DevicePoller {
    /// Spawns the poll thread.
    ///
    /// The thread opens the reader first; an open failure is reported as
    /// [`DeviceEvent::OpenFailed`] and ends the thread.
    pub fn start(
        reader: Box<dyn CardReader>,
        interval: Duration,
        generation: Generation,
        sink: EventSink,
    ) -> Result<Self, DeviceError> {
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("card-poller-{}", generation.value()))
            .spawn(move || poll_loop(reader, interval, generation, sink, stop_rx))
            .map_err(|e| DeviceError::Io(format!("failed to spawn poll thread: {e}")))?;

        Ok(Self {
            generation,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Generation this poller reports under.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns `true` once the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the loop and waits for the thread, returning the reader.
    ///
    /// Returns `None` if the thread panicked.
    pub fn stop(mut self) -> Option<Box<dyn CardReader>> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<Box<dyn CardReader>> {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already be gone after an open failure.
            let _ = tx.send(());
        }
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(reader) => Some(reader),
            Err(_) => {
                warn!(generation = %self.generation, "Card poll thread panicked");
                None
            }
        }
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_loop(
    mut reader: Box<dyn CardReader>,
    interval: Duration,
    generation: Generation,
    sink: EventSink,
    stop_rx: std_mpsc::Receiver<()>,
) -> Box<dyn CardReader> {
    let port = reader.port().to_string();
    if let Err(error) = reader.open() {
        warn!(%port, error = %error, "Card reader open failed");
        deliver(&sink, DeviceEvent::OpenFailed { generation, error }.into(), &stop_rx);
        return reader;
    }
    info!(%port, interval_ms = interval.as_millis() as u64, "Card poller started");
    let opened = DeviceEvent::Opened {
        generation,
        port: port.clone(),
    };
    if deliver(&sink, opened.into(), &stop_rx) {
        loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            }

            let event = match reader.poll() {
                Ok(Some(scan)) => DeviceEvent::Scan { generation, scan },
                Ok(None) => continue,
                Err(error) => DeviceEvent::ReadFailed { generation, error },
            };
            if !deliver(&sink, event.into(), &stop_rx) {
                break;
            }
        }
    }

    reader.close();
    info!(%port, "Card poller stopped");
    reader
}

/// Queues `event`, waiting out a full queue. Returns `false` when the poller
/// should exit: stop was requested or the gateway is gone.
fn deliver(sink: &EventSink, event: GatewayEvent, stop_rx: &std_mpsc::Receiver<()>) -> bool {
    let mut pending = event;
    loop {
        match sink.offer(pending) {
            Ok(()) => return true,
            Err(OfferError::Closed) => {
                debug!("Event queue closed, poller exiting");
                return false;
            }
            Err(OfferError::Full(event)) => pending = event,
        }
        match stop_rx.recv_timeout(FULL_QUEUE_RETRY) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                debug!(event = ?pending, "Stopped with the event queue full, event dropped");
                return false;
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GatewayEvent;
    use crate::scan::CardScan;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Probe {
        polls: AtomicUsize,
        open: AtomicBool,
        closed: AtomicBool,
    }

    struct FakeReader {
        probe: Arc<Probe>,
        fail_open: bool,
        cards: Mutex<Vec<CardScan>>,
    }

    impl CardReader for FakeReader {
        fn port(&self) -> &str {
            "/dev/fake"
        }

        fn open(&mut self) -> Result<(), DeviceError> {
            if self.fail_open {
                return Err(DeviceError::unavailable("/dev/fake", "busy"));
            }
            self.probe.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn poll(&mut self) -> Result<Option<CardScan>, DeviceError> {
            assert!(!self.probe.closed.load(Ordering::SeqCst), "read after close");
            self.probe.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.cards.lock().pop())
        }

        fn close(&mut self) {
            self.probe.open.store(false, Ordering::SeqCst);
            self.probe.closed.store(true, Ordering::SeqCst);
        }
    }

    fn reader(probe: &Arc<Probe>, fail_open: bool, cards: Vec<CardScan>) -> Box<dyn CardReader> {
        Box::new(FakeReader {
            probe: Arc::clone(probe),
            fail_open,
            cards: Mutex::new(cards),
        })
    }

    #[test]
    fn test_poller_reports_scans_and_stops() {
        let probe = Arc::new(Probe::default());
        let (sink, mut rx) = EventSink::channel(16);
        let generation = Generation::new(3);
        let poller = DevicePoller::start(
            reader(&probe, false, vec![CardScan::valid("A1", "data")]),
            Duration::from_millis(5),
            generation,
            sink,
        )
        .unwrap();

        match rx.blocking_recv() {
            Some(GatewayEvent::Device(DeviceEvent::Opened { generation: g, port })) => {
                assert_eq!(g, generation);
                assert_eq!(port, "/dev/fake");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.blocking_recv() {
            Some(GatewayEvent::Device(DeviceEvent::Scan { scan, .. })) => {
                assert_eq!(scan.card_id, "A1")
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let returned = poller.stop();
        assert!(returned.is_some());
        assert!(probe.closed.load(Ordering::SeqCst));

        // Nothing is read once stop has returned.
        let polls = probe.polls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(probe.polls.load(Ordering::SeqCst), polls);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_open_failure_reported() {
        let probe = Arc::new(Probe::default());
        let (sink, mut rx) = EventSink::channel(4);
        let poller = DevicePoller::start(
            reader(&probe, true, Vec::new()),
            Duration::from_millis(5),
            Generation::new(1),
            sink,
        )
        .unwrap();

        assert!(matches!(
            rx.blocking_recv(),
            Some(GatewayEvent::Device(DeviceEvent::OpenFailed { .. }))
        ));
        let returned = poller.stop();
        assert!(returned.is_some());
        assert_eq!(probe.polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_with_full_queue() {
        let probe = Arc::new(Probe::default());
        let cards = (0..8).map(|i| CardScan::valid(format!("C{i}"), "data")).collect();
        // Room for `Opened` only; the first scan finds the queue full.
        let (sink, mut rx) = EventSink::channel(1);
        let poller = DevicePoller::start(
            reader(&probe, false, cards),
            Duration::from_millis(1),
            Generation::new(2),
            sink,
        )
        .unwrap();

        while probe.polls.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(30));

        let (done_tx, done_rx) = std_mpsc::channel();
        thread::spawn(move || {
            let _ = done_tx.send(poller.stop().is_some());
        });
        let returned = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("stop must not wait on a full queue");
        assert!(returned);
        assert!(probe.closed.load(Ordering::SeqCst));
        assert_eq!(probe.polls.load(Ordering::SeqCst), 1);

        // Only the event queued before the queue filled up is delivered.
        assert!(matches!(
            rx.try_recv(),
            Ok(GatewayEvent::Device(DeviceEvent::Opened { .. }))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_stops_thread() {
        let probe = Arc::new(Probe::default());
        let (sink, _rx) = EventSink::channel(64);
        let poller = DevicePoller::start(
            reader(&probe, false, Vec::new()),
            Duration::from_millis(1),
            Generation::new(1),
            sink,
        )
        .unwrap();
        drop(poller);
        assert!(probe.closed.load(Ordering::SeqCst));
    }
}
