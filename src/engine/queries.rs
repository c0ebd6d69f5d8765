use ulid::Ulid;

use crate::model::*;

use super::availability::free_spans;
use super::conflict::{check_no_conflict, validate_window};
use super::{Engine, EngineError};

fn detail_of(room_id: Ulid, booking: &BookingRecord) -> BookingDetail {
    BookingDetail {
        id: booking.id,
        room_id,
        customer_id: booking.customer_id,
        check_in: booking.span.start,
        check_out: booking.span.end,
        guests: booking.guests,
        total: booking.total,
        paid: booking.paid(),
        remaining: booking.remaining(),
        status: booking.status,
        addons: booking.addons.clone(),
        payments: booking
            .payments
            .iter()
            .map(|p| PaymentInfo {
                id: p.id,
                amount: p.amount,
                method: p.method,
                recorded_at: p.recorded_at,
            })
            .collect(),
    }
}

impl Engine {
    /// The availability contract: may `[check_in, check_out)` be booked on
    /// this room? Purely an interval decision — room status and guest
    /// capacity are validated by `create_booking`, not here. `exclude`
    /// skips one booking id so a stay doesn't conflict with itself.
    pub async fn is_available(
        &self,
        room_id: Ulid,
        check_in: Ms,
        check_out: Ms,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let span = validate_window(check_in, check_out)?;
        let room = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        Ok(check_no_conflict(&guard, &span, exclude).is_ok())
    }

    /// Open date sub-windows for a room — what a search page renders.
    pub async fn open_windows(
        &self,
        room_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<Span>, EngineError> {
        let query = validate_window(start, end)?;
        let room = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        Ok(free_spans(&guard, &query))
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        let mut rooms = Vec::with_capacity(room_ids.len());
        for id in room_ids {
            let Some(room) = self.get_room(&id) else {
                continue;
            };
            let guard = room.read().await;
            rooms.push(RoomInfo {
                id: guard.id,
                name: guard.name.clone(),
                room_type: guard.room_type.clone(),
                rate: guard.rate,
                capacity: guard.capacity,
                status: guard.status,
            });
        }
        rooms
    }

    pub fn list_addons(&self) -> Vec<CatalogAddon> {
        self.catalog.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<BookingDetail, EngineError> {
        let room_id = self
            .room_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let room = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        Ok(detail_of(room_id, booking))
    }

    pub async fn bookings_for_room(
        &self,
        room_id: Ulid,
    ) -> Result<Vec<BookingDetail>, EngineError> {
        let room = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| detail_of(room_id, b))
            .collect())
    }
}
