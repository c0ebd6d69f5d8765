mod availability;
mod conflict;
mod error;
mod mutations;
mod pricing;
mod queries;

pub use availability::{blocked_spans, free_spans, merge_overlapping, subtract_intervals};
pub use error::{EngineError, ErrorKind};
pub use pricing::{nights, quote};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::receipts::ReceiptStore;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
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
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The reservation and payment ledger core. One engine per resort.
///
/// Every room is its own `RwLock`; every booking/payment/cancellation
/// mutation holds the room's write guard across its whole
/// validate-append-apply sequence, so two racing requests for the same
/// room (or the same booking) serialize and exactly one wins.
pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    pub catalog: DashMap<Ulid, CatalogAddon>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) receipts: Arc<dyn ReceiptStore>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a RoomState (no locking — caller holds the lock).
fn apply_to_room(room: &mut RoomState, event: &Event, booking_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingCreated {
            id,
            room_id,
            customer_id,
            span,
            guests,
            total,
            addons,
        } => {
            room.insert_booking(BookingRecord {
                id: *id,
                customer_id: *customer_id,
                span: *span,
                guests: *guests,
                total: *total,
                status: BookingStatus::Pending,
                addons: addons.clone(),
                payments: Vec::new(),
            });
            booking_index.insert(*id, *room_id);
        }
        Event::PaymentRecorded {
            id,
            booking_id,
            amount,
            method,
            receipt,
            recorded_at,
            ..
        } => {
            if let Some(booking) = room.booking_mut(*booking_id) {
                booking.payments.push(PaymentRecord {
                    id: *id,
                    amount: *amount,
                    method: *method,
                    receipt: receipt.clone(),
                    recorded_at: *recorded_at,
                });
                // Paid-in-full is derived, never stored: promote when the
                // ledger reaches the booked total.
                if booking.status == BookingStatus::Pending
                    && booking.paid() >= booking.total
                {
                    booking.status = BookingStatus::Paid;
                }
            }
        }
        Event::BookingCancelled { id, .. } => {
            if let Some(booking) = room.booking_mut(*id) {
                booking.status = BookingStatus::Cancelled;
            }
        }
        Event::BookingCompleted { id, .. } => {
            if let Some(booking) = room.booking_mut(*id) {
                booking.status = BookingStatus::Completed;
            }
        }
        Event::RoomUpdated {
            name,
            rate,
            capacity,
            status,
            ..
        } => {
            room.name = name.clone();
            room.rate = *rate;
            room.capacity = *capacity;
            room.status = *status;
        }
        // Room creation and catalog events are handled at the
        // engine's map level, not here
        Event::RoomCreated { .. }
        | Event::AddonDefined { .. }
        | Event::AddonRepriced { .. }
        | Event::AddonRetired { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        receipts: Arc<dyn ReceiptStore>,
        notify: Arc<NotifyHub>,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            catalog: DashMap::new(),
            wal_tx,
            notify,
            receipts,
            booking_to_room: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never block here: new()
        // may run inside an async context.
        for event in &events {
            match event {
                Event::RoomCreated {
                    id,
                    name,
                    room_type,
                    rate,
                    capacity,
                } => {
                    let room =
                        RoomState::new(*id, name.clone(), room_type.clone(), *rate, *capacity);
                    engine.rooms.insert(*id, Arc::new(RwLock::new(room)));
                }
                Event::AddonDefined { id, name, kind, cost } => {
                    engine.catalog.insert(
                        *id,
                        CatalogAddon {
                            id: *id,
                            name: name.clone(),
                            kind: *kind,
                            cost: *cost,
                        },
                    );
                }
                Event::AddonRepriced { id, cost } => {
                    if let Some(mut addon) = engine.catalog.get_mut(id) {
                        addon.cost = *cost;
                    }
                }
                Event::AddonRetired { id } => {
                    engine.catalog.remove(id);
                }
                other => {
                    if let Some(room_id) = event_room_id(other)
                        && let Some(entry) = engine.rooms.get(&room_id) {
                            let room_arc = entry.clone();
                            let mut guard =
                                room_arc.try_write().expect("replay: uncontended write");
                            apply_to_room(&mut guard, other, &engine.booking_to_room);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. The append happens first:
    /// if it fails nothing is applied, which is the whole rollback story.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        room: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(room, event, &self.booking_to_room);
        self.notify.send(room_id, event);
        Ok(())
    }

    /// Lookup booking → room, get the room, acquire its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.write_owned().await;
        Ok((room_id, guard))
    }
}

/// Extract the room id from a room-scoped event.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { room_id, .. }
        | Event::PaymentRecorded { room_id, .. }
        | Event::BookingCancelled { room_id, .. }
        | Event::BookingCompleted { room_id, .. } => Some(*room_id),
        Event::RoomUpdated { id, .. } => Some(*id),
        Event::RoomCreated { .. }
        | Event::AddonDefined { .. }
        | Event::AddonRepriced { .. }
        | Event::AddonRetired { .. } => None,
    }
}
