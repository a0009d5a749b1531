use crate::constants::MIN_CADENCE_MS;
use crate::distributor::{Distributor, Published, Registration, SubscriberId};
use crate::error::{Result, SendError};
use crate::message::MessageFormat;
use crate::transport::Transport;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use crossbeam_utils::atomic::AtomicCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use sweep_data::ScanSequence;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Registered,
    Idle,
    Sending,
    /// Terminal.
    Unregistered,
}

/// Counters shared between a subscriber thread and its handle.
#[derive(Default)]
pub(crate) struct SubscriberStats {
    batches_sent: AtomicU64,
    skipped: AtomicU64,
    // 0 until the first scan is delivered; sequences start at 1.
    last_delivered_seq: AtomicU64,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Nothing new since the previous tick.
    Idle,
    Sent,
    Failed,
    Disconnected,
}

/// Delivery state of one subscriber, driven once per tick.
pub(crate) struct Pacer<T: Transport> {
    registration: Registration,
    transport: T,
    format: MessageFormat,
    state: Arc<AtomicCell<SubscriberState>>,
    stats: Arc<SubscriberStats>,
}

impl<T: Transport> Pacer<T> {
    pub(crate) fn tick(&mut self) -> TickOutcome {
        let Some(item) = self.registration.latest() else {
            return TickOutcome::Idle;
        };

        let (batch, delivered_scan) = match &item {
            Published::Scan { seq, scan } => (self.format.scan_messages(scan), Some(*seq)),
            Published::Error { seq, error } => {
                (vec![self.format.error_message(*seq, error)], None)
            }
        };

        self.state.store(SubscriberState::Sending);
        let outcome = match self.transport.send(&batch) {
            Ok(()) => {
                self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
                if let Some(seq) = delivered_scan {
                    self.record_gap(seq);
                    self.stats.last_delivered_seq.store(seq, Ordering::Release);
                }
                TickOutcome::Sent
            }
            Err(SendError::Closed) => TickOutcome::Disconnected,
            Err(e) => {
                log::warn!(
                    "Subscriber {} failed to send #{}: {}",
                    self.registration.id,
                    item.seq(),
                    e
                );
                TickOutcome::Failed
            }
        };
        self.state.store(SubscriberState::Idle);
        outcome
    }

    // Counts scans never delivered between the previous delivery and `seq`.
    fn record_gap(&self, seq: ScanSequence) {
        let last = self.stats.last_delivered_seq.load(Ordering::Acquire);
        if last != 0 && seq > last + 1 {
            let gap = seq - last - 1;
            self.stats.skipped.fetch_add(gap, Ordering::Relaxed);
            log::debug!(
                "Subscriber {} skipped {} scan(s) between #{} and #{}",
                self.registration.id,
                gap,
                last,
                seq
            );
        }
    }
}

/// One connected consumer with its own delivery cadence.
///
/// Dropping the subscriber unregisters it and stops its thread.
pub struct Subscriber {
    id: SubscriberId,
    distributor: Arc<Distributor>,
    state: Arc<AtomicCell<SubscriberState>>,
    stats: Arc<SubscriberStats>,
    terminator_tx: Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl Subscriber {
    /// Registers with `distributor` and starts ticking every `cadence`.
    pub fn spawn<T: Transport>(
        distributor: Arc<Distributor>,
        transport: T,
        cadence: Duration,
        format: MessageFormat,
    ) -> Result<Subscriber> {
        let cadence = cadence.max(Duration::from_millis(MIN_CADENCE_MS));
        let registration = distributor.register();
        let id = registration.id;
        let state = Arc::new(AtomicCell::new(SubscriberState::Registered));
        let stats = Arc::new(SubscriberStats::default());
        let (terminator_tx, terminator_rx) = bounded(1);

        let pacer = Pacer {
            registration,
            transport,
            format,
            state: Arc::clone(&state),
            stats: Arc::clone(&stats),
        };
        let thread_distributor = Arc::clone(&distributor);
        let spawned = std::thread::Builder::new()
            .name(format!("subscriber-{}", id))
            .spawn(move || {
                run_ticks(pacer, cadence, terminator_rx, &thread_distributor);
            });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                distributor.unregister(id);
                state.store(SubscriberState::Unregistered);
                return Err(e.into());
            }
        };

        log::info!("Subscriber {} registered (cadence {:?})", id, cadence);
        Ok(Subscriber {
            id,
            distributor,
            state,
            stats,
            terminator_tx,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> SubscriberState {
        self.state.load()
    }

    /// False once the subscriber unregistered, e.g. after its peer went away.
    pub fn is_active(&self) -> bool {
        self.state() != SubscriberState::Unregistered
    }

    pub fn last_delivered_seq(&self) -> Option<ScanSequence> {
        match self.stats.last_delivered_seq.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    /// Scans published while this subscriber was not keeping up.
    pub fn skipped(&self) -> u64 {
        self.stats.skipped.load(Ordering::Relaxed)
    }

    pub fn batches_sent(&self) -> u64 {
        self.stats.batches_sent.load(Ordering::Relaxed)
    }

    /// Stops ticking and unregisters. Safe to call more than once.
    pub fn unregister(&mut self) {
        self.distributor.unregister(self.id);
        let _ = self.terminator_tx.try_send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Subscriber {} thread panicked", self.id);
            }
            log::info!("Subscriber {} unregistered", self.id);
        }
        self.state.store(SubscriberState::Unregistered);
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.unregister();
    }
}

fn run_ticks<T: Transport>(
    mut pacer: Pacer<T>,
    cadence: Duration,
    terminator_rx: Receiver<bool>,
    distributor: &Distributor,
) {
    let ticker = tick(cadence);
    pacer.state.store(SubscriberState::Idle);
    loop {
        select! {
            recv(terminator_rx) -> _ => break,
            recv(ticker) -> _ => {
                if pacer.tick() == TickOutcome::Disconnected {
                    log::info!("Subscriber {} disconnected", pacer.registration.id);
                    distributor.unregister(pacer.registration.id);
                    break;
                }
            }
        }
    }
    pacer.state.store(SubscriberState::Unregistered);
}
