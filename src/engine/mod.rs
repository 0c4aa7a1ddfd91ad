mod admission;
mod availability;
mod error;
mod lifecycle;
mod queries;
mod store;

pub use availability::slot_grid;
pub use error::EngineError;
pub use store::{IntervalStore, SharedSalonState};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::model::*;
use crate::observability;
use crate::payments::PaymentLedger;
use crate::wal::Wal;

/// Names an admitted interval. Equal to the booking id for booking-backed intervals.
pub type IntervalHandle = Ulid;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued,
/// then fsync once for the whole batch and answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    // Everything queued before a non-append is flushed first
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        warn!("wal batch of {} failed: {e}", batch.len());
        // A failed batch must leave no bytes behind for the next one to follow
        if let Err(e) = wal.rollback() {
            error!("wal rollback failed, appends refused until compaction: {e}");
        }
    }
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// Mirror an event onto the booking records.
fn apply_to_bookings(bookings: &DashMap<Ulid, Booking>, event: &Event) {
    match event {
        Event::IntervalAdmitted {
            id,
            salon_id,
            span,
            booking: Some(record),
        } => {
            bookings.insert(*id, Booking::from_record(*id, *salon_id, *span, record));
        }
        Event::IntervalAdmitted { booking: None, .. } => {}
        Event::IntervalReleased { id, .. } => {
            if let Some(mut b) = bookings.get_mut(id) {
                b.state = BookingState::Cancelled;
            }
        }
        Event::BookingCompleted { id, .. } => {
            if let Some(mut b) = bookings.get_mut(id) {
                b.state = BookingState::Completed;
            }
        }
    }
}

/// The booking core: interval store, booking records, and the WAL that makes
/// both durable. Collaborators are injected; there is no global state.
pub struct Engine {
    store: IntervalStore,
    bookings: DashMap<Ulid, Booking>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Commits hold this shared; compaction holds it exclusively so the
    /// snapshot and the log swap never race an in-flight commit.
    /// Always taken before any salon lock.
    commit_gate: RwLock<()>,
    catalog: Arc<dyn Catalog>,
    payments: Arc<dyn PaymentLedger>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called from within a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        catalog: Arc<dyn Catalog>,
        payments: Arc<dyn PaymentLedger>,
    ) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.torn_tail {
            warn!(
                "discarding torn WAL tail after {} valid bytes in {}",
                replay.valid_len,
                wal_path.display()
            );
        }
        let wal = Wal::open(&wal_path, replay.valid_len)?;

        let mut states: HashMap<SalonId, SalonState> = HashMap::new();
        let bookings = DashMap::new();
        for event in &replay.events {
            let salon_id = event.salon_id();
            states
                .entry(salon_id)
                .or_insert_with(|| SalonState::new(salon_id))
                .apply(event);
            apply_to_bookings(&bookings, event);
        }
        info!(
            "replayed {} events: {} salons, {} bookings",
            replay.events.len(),
            states.len(),
            bookings.len()
        );

        let store = IntervalStore::from_states(states.into_values());
        metrics::gauge!(observability::SALONS_ACTIVE).set(store.salon_count() as f64);

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            store,
            bookings,
            wal_tx,
            commit_gate: RwLock::new(()),
            catalog,
            payments,
        })
    }

    pub fn store(&self) -> &IntervalStore {
        &self.store
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, then apply to the locked salon and the booking records.
    /// Memory changes only after the log has acknowledged the event.
    async fn persist_and_apply(&self, ss: &mut SalonState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(ss, event);
        apply_to_bookings(&self.bookings, event);
        Ok(())
    }

    /// Rewrite the WAL with the minimal events that recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut salon_ids = self.store.salon_ids();
        salon_ids.sort_unstable();
        let mut events = Vec::new();
        for salon_id in salon_ids {
            let Some(salon) = self.store.get(&salon_id) else {
                continue;
            };
            let guard = salon.read().await;
            for interval in &guard.intervals {
                events.push(Event::IntervalAdmitted {
                    id: interval.id,
                    salon_id,
                    span: interval.span,
                    booking: self.bookings.get(&interval.id).map(|b| b.record()),
                });
                match interval.state {
                    BookingState::Cancelled => events.push(Event::IntervalReleased {
                        id: interval.id,
                        salon_id,
                    }),
                    BookingState::Completed => events.push(Event::BookingCompleted {
                        id: interval.id,
                        salon_id,
                    }),
                    BookingState::Pending | BookingState::Confirmed => {}
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}
