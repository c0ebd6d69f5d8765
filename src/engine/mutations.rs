use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::receipts::ReceiptStore;

use super::conflict::{check_no_conflict, now_ms, validate_stay};
use super::{pricing, Engine, EngineError, WalCommand};

impl Engine {
    // ── Room catalog ─────────────────────────────────────────

    pub async fn create_room(
        &self,
        id: Ulid,
        name: Option<String>,
        room_type: String,
        rate: Decimal,
        capacity: u32,
    ) -> Result<(), EngineError> {
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("room name too long"));
            }
        if room_type.is_empty() || room_type.len() > MAX_ROOM_TYPE_LEN {
            return Err(EngineError::LimitExceeded("room type length out of range"));
        }
        if rate.is_sign_negative() {
            return Err(EngineError::InvalidAmount);
        }
        if capacity == 0 {
            return Err(EngineError::LimitExceeded("room capacity must be positive"));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomCreated {
            id,
            name: name.clone(),
            room_type: room_type.clone(),
            rate,
            capacity,
        };
        self.wal_append(&event).await?;
        let room = RoomState::new(id, name, room_type, rate, capacity);
        self.rooms.insert(id, Arc::new(RwLock::new(room)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Rooms are never deleted; retiring one is `status = Unavailable`,
    /// which stops new bookings while existing ones play out.
    pub async fn update_room(
        &self,
        id: Ulid,
        name: Option<String>,
        rate: Decimal,
        capacity: u32,
        status: RoomStatus,
    ) -> Result<(), EngineError> {
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("room name too long"));
            }
        if rate.is_sign_negative() {
            return Err(EngineError::InvalidAmount);
        }
        if capacity == 0 {
            return Err(EngineError::LimitExceeded("room capacity must be positive"));
        }
        let room = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = room.write().await;

        let event = Event::RoomUpdated {
            id,
            name,
            rate,
            capacity,
            status,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    // ── Addon catalog ────────────────────────────────────────

    pub async fn define_addon(
        &self,
        id: Ulid,
        name: String,
        kind: AddonKind,
        cost: Decimal,
    ) -> Result<(), EngineError> {
        if self.catalog.len() >= MAX_CATALOG_ADDONS {
            return Err(EngineError::LimitExceeded("too many catalog addons"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("addon name length out of range"));
        }
        if cost.is_sign_negative() {
            return Err(EngineError::InvalidAmount);
        }
        if self.catalog.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::AddonDefined {
            id,
            name: name.clone(),
            kind,
            cost,
        };
        self.wal_append(&event).await?;
        self.catalog.insert(id, CatalogAddon { id, name, kind, cost });
        Ok(())
    }

    /// Reprice a live addon. Snapshots already taken by bookings keep the
    /// old cost — that is the point of snapshotting.
    pub async fn reprice_addon(&self, id: Ulid, cost: Decimal) -> Result<(), EngineError> {
        if cost.is_sign_negative() {
            return Err(EngineError::InvalidAmount);
        }
        if !self.catalog.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::AddonRepriced { id, cost };
        self.wal_append(&event).await?;
        if let Some(mut addon) = self.catalog.get_mut(&id) {
            addon.cost = cost;
        }
        Ok(())
    }

    pub async fn retire_addon(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.catalog.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::AddonRetired { id };
        self.wal_append(&event).await?;
        self.catalog.remove(&id);
        Ok(())
    }

    // ── Booking transaction ──────────────────────────────────

    /// Book a room for a date range, with addon costs snapshotted at this
    /// instant. Returns the quoted total.
    ///
    /// The availability re-check and the insert happen under the same
    /// write guard, and state is applied only after the WAL append
    /// succeeds — there is no window where a second request can observe
    /// the room free and also win, and no partial booking on failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        customer_id: Ulid,
        check_in: Ms,
        check_out: Ms,
        guests: u32,
        amenity_ids: &[Ulid],
        service_ids: &[Ulid],
    ) -> Result<Decimal, EngineError> {
        let now = now_ms();
        let span = validate_stay(check_in, check_out, now)?;
        if amenity_ids.len() + service_ids.len() > MAX_ADDONS_PER_BOOKING {
            return Err(EngineError::LimitExceeded("too many addons on booking"));
        }
        if self.booking_to_room.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let room = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let mut guard = room.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        // Fail fast on room-level checks before scanning intervals
        if guard.status != RoomStatus::Available {
            return Err(EngineError::RoomUnavailable("room is not open for booking"));
        }
        if guests == 0 {
            return Err(EngineError::RoomUnavailable("at least one guest required"));
        }
        if guests > guard.capacity {
            return Err(EngineError::RoomUnavailable("party exceeds room capacity"));
        }

        check_no_conflict(&guard, &span, None)?;

        let addons = self.snapshot_addons(amenity_ids, service_ids)?;
        let total = pricing::quote(guard.rate, pricing::nights(&span), &addons);

        let event = Event::BookingCreated {
            id,
            room_id,
            customer_id,
            span,
            guests,
            total,
            addons,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(total)
    }

    /// Capture each addon's live catalog cost. Amenity ids must name
    /// amenities and service ids services; anything else is unknown.
    fn snapshot_addons(
        &self,
        amenity_ids: &[Ulid],
        service_ids: &[Ulid],
    ) -> Result<Vec<AddonSnapshot>, EngineError> {
        let mut addons = Vec::with_capacity(amenity_ids.len() + service_ids.len());
        for (ids, kind) in [
            (amenity_ids, AddonKind::Amenity),
            (service_ids, AddonKind::Service),
        ] {
            for id in ids {
                let entry = self.catalog.get(id).ok_or(EngineError::UnknownAddon(*id))?;
                if entry.kind != kind {
                    return Err(EngineError::UnknownAddon(*id));
                }
                addons.push(AddonSnapshot {
                    addon_id: entry.id,
                    name: entry.name.clone(),
                    kind,
                    cost: entry.cost,
                });
            }
        }
        Ok(addons)
    }

    // ── Payment ledger ───────────────────────────────────────

    /// Record a partial payment against a Pending booking. The remaining
    /// balance is re-derived under the room's write guard, so duplicate
    /// submits serialize and the second one sees the first one's effect.
    ///
    /// The receipt artifact was stored by the caller before this call; on
    /// ANY failure it is discarded so nothing orphaned stays behind.
    pub async fn record_payment(
        &self,
        id: Ulid,
        booking_id: Ulid,
        amount: Decimal,
        method: PaymentMethod,
        receipt: String,
    ) -> Result<PaymentOutcome, EngineError> {
        match self
            .record_payment_locked(id, booking_id, amount, method, receipt.clone())
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(io_err) = self.receipts.discard(&receipt).await {
                    tracing::warn!("failed to discard receipt {receipt}: {io_err}");
                }
                Err(e)
            }
        }
    }

    async fn record_payment_locked(
        &self,
        id: Ulid,
        booking_id: Ulid,
        amount: Decimal,
        method: PaymentMethod,
        receipt: String,
    ) -> Result<PaymentOutcome, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidAmount);
        }
        if receipt.is_empty() || receipt.len() > MAX_RECEIPT_REF_LEN {
            return Err(EngineError::LimitExceeded(
                "receipt reference length out of range",
            ));
        }

        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;

        match booking.status {
            BookingStatus::Cancelled => {
                return Err(EngineError::AlreadyCancelled(booking_id));
            }
            // Nothing left to pay — any amount is an overpayment
            BookingStatus::Paid | BookingStatus::Completed => {
                return Err(EngineError::OverpaymentRejected {
                    remaining: Decimal::ZERO,
                });
            }
            BookingStatus::Pending => {}
        }
        if booking.payments.len() >= MAX_PAYMENTS_PER_BOOKING {
            return Err(EngineError::LimitExceeded("too many payments on booking"));
        }

        let remaining = booking.remaining();
        if amount > remaining {
            return Err(EngineError::OverpaymentRejected { remaining });
        }
        let paid_after = booking.paid() + amount;

        let event = Event::PaymentRecorded {
            id,
            booking_id,
            room_id,
            amount,
            method,
            receipt,
            recorded_at: now_ms(),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;

        Ok(PaymentOutcome {
            paid: paid_after,
            remaining: remaining - amount,
            fully_paid: amount == remaining,
        })
    }

    // ── Cancellation policy ──────────────────────────────────

    /// Cancel a booking, returning the refund liability (sum of recorded
    /// payments — money movement is somebody else's job). Status and the
    /// notice window are re-verified under the write guard, so a cancel
    /// racing a payment loses cleanly rather than corrupting state.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        customer_id: Ulid,
    ) -> Result<Decimal, EngineError> {
        let now = now_ms();
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;

        // A foreign booking id reads as nonexistent — don't confirm other
        // customers' bookings to a guesser.
        if booking.customer_id != customer_id {
            return Err(EngineError::NotFound(booking_id));
        }
        match booking.status {
            BookingStatus::Cancelled => {
                return Err(EngineError::AlreadyCancelled(booking_id));
            }
            BookingStatus::Completed => {
                return Err(EngineError::NotCancellable(BookingStatus::Completed));
            }
            BookingStatus::Pending | BookingStatus::Paid => {}
        }
        let notice_left = booking.span.start - now;
        if notice_left < CANCEL_NOTICE_MS {
            return Err(EngineError::TooCloseToCheckIn {
                notice_left_ms: notice_left.max(0),
            });
        }

        let refund = booking.paid();
        let event = Event::BookingCancelled {
            id: booking_id,
            room_id,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(refund)
    }

    // ── Stay completion ──────────────────────────────────────

    /// Promote a Paid booking to Completed once its checkout has passed.
    /// Driven by the background sweeper; conditions are re-checked under
    /// the lock because the sweeper's scan is a stale read.
    pub async fn complete_booking(&self, booking_id: Ulid) -> Result<(), EngineError> {
        let now = now_ms();
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;

        if booking.status != BookingStatus::Paid {
            return Err(EngineError::NotCompletable(booking.status));
        }
        if booking.span.end > now {
            return Err(EngineError::InvalidDateRange("stay has not ended yet"));
        }

        let event = Event::BookingCompleted {
            id: booking_id,
            room_id,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Scan for Paid bookings whose checkout has passed.
    /// Returns `(booking_id, room_id)` pairs for the sweeper.
    pub fn collect_finished_stays(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut finished = Vec::new();
        for entry in self.rooms.iter() {
            let room = entry.value().clone();
            if let Ok(guard) = room.try_read() {
                for booking in &guard.bookings {
                    if booking.status == BookingStatus::Paid && booking.span.end <= now {
                        finished.push((booking.id, guard.id));
                    }
                }
            }
        }
        finished
    }

    // ── WAL compaction ───────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate current
    /// state: the addon catalog, each room, and each room's ledger.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.catalog.iter() {
            events.push(Event::AddonDefined {
                id: entry.id,
                name: entry.name.clone(),
                kind: entry.kind,
                cost: entry.cost,
            });
        }

        let room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        for room_id in room_ids {
            let Some(room) = self.get_room(&room_id) else {
                continue;
            };
            let guard = room.read().await;

            events.push(Event::RoomCreated {
                id: guard.id,
                name: guard.name.clone(),
                room_type: guard.room_type.clone(),
                rate: guard.rate,
                capacity: guard.capacity,
            });
            if guard.status != RoomStatus::Available {
                events.push(Event::RoomUpdated {
                    id: guard.id,
                    name: guard.name.clone(),
                    rate: guard.rate,
                    capacity: guard.capacity,
                    status: guard.status,
                });
            }

            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: booking.id,
                    room_id: guard.id,
                    customer_id: booking.customer_id,
                    span: booking.span,
                    guests: booking.guests,
                    total: booking.total,
                    addons: booking.addons.clone(),
                });
                for payment in &booking.payments {
                    events.push(Event::PaymentRecorded {
                        id: payment.id,
                        booking_id: booking.id,
                        room_id: guard.id,
                        amount: payment.amount,
                        method: payment.method,
                        receipt: payment.receipt.clone(),
                        recorded_at: payment.recorded_at,
                    });
                }
                // Paid is re-derived from the payment events on replay;
                // only the terminal statuses need their own record
                match booking.status {
                    BookingStatus::Cancelled => events.push(Event::BookingCancelled {
                        id: booking.id,
                        room_id: guard.id,
                    }),
                    BookingStatus::Completed => events.push(Event::BookingCompleted {
                        id: booking.id,
                        room_id: guard.id,
                    }),
                    BookingStatus::Pending | BookingStatus::Paid => {}
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
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
