use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open stay interval `[check_in, check_out)`.
///
/// Half-open is what makes back-to-back turnover legal: a checkout at
/// instant T and a check-in at instant T never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Paid,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Pending and Paid bookings hold their dates; Cancelled and Completed
    /// bookings release them.
    pub fn blocks_room(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Paid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    GCash,
    PayMaya,
    BankTransfer,
    CreditCard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddonKind {
    Amenity,
    Service,
}

/// Catalog entry a booking can attach. Prices here are live: editing one
/// never touches snapshots already taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogAddon {
    pub id: Ulid,
    pub name: String,
    pub kind: AddonKind,
    pub cost: Decimal,
}

/// An addon's cost captured at booking time. Immutable once written, so a
/// booking's total stays stable when the catalog is repriced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonSnapshot {
    pub addon_id: Ulid,
    pub name: String,
    pub kind: AddonKind,
    pub cost: Decimal,
}

/// One recorded payment against a booking. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Ulid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub receipt: String,
    pub recorded_at: Ms,
}

/// A booking held inside its room's state. `span`, `guests`, `total`, and
/// the addon snapshots are immutable after creation; only `status` moves,
/// and `payments` only grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub span: Span,
    pub guests: u32,
    pub total: Decimal,
    pub status: BookingStatus,
    pub addons: Vec<AddonSnapshot>,
    pub payments: Vec<PaymentRecord>,
}

impl BookingRecord {
    /// Sum of recorded payments. Derived on demand, never stored.
    pub fn paid(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount).sum()
    }

    pub fn remaining(&self) -> Decimal {
        self.total - self.paid()
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: Option<String>,
    pub room_type: String,
    /// Nightly rate.
    pub rate: Decimal,
    /// Max guests. One booking holds the whole room regardless of party size.
    pub capacity: u32,
    pub status: RoomStatus,
    /// All bookings ever taken for this room, sorted by `span.start`.
    /// Cancelled and Completed rows stay as ledger history.
    pub bookings: Vec<BookingRecord>,
}

impl RoomState {
    pub fn new(
        id: Ulid,
        name: Option<String>,
        room_type: String,
        rate: Decimal,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            name,
            room_type,
            rate,
            capacity,
            status: RoomStatus::Available,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: BookingRecord) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&BookingRecord> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut BookingRecord> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &BookingRecord> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: Option<String>,
        room_type: String,
        rate: Decimal,
        capacity: u32,
    },
    RoomUpdated {
        id: Ulid,
        name: Option<String>,
        rate: Decimal,
        capacity: u32,
        status: RoomStatus,
    },
    AddonDefined {
        id: Ulid,
        name: String,
        kind: AddonKind,
        cost: Decimal,
    },
    AddonRepriced {
        id: Ulid,
        cost: Decimal,
    },
    AddonRetired {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        customer_id: Ulid,
        span: Span,
        guests: u32,
        total: Decimal,
        addons: Vec<AddonSnapshot>,
    },
    PaymentRecorded {
        id: Ulid,
        booking_id: Ulid,
        room_id: Ulid,
        amount: Decimal,
        method: PaymentMethod,
        receipt: String,
        recorded_at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
    BookingCompleted {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub room_type: String,
    pub rate: Decimal,
    pub capacity: u32,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub id: Ulid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub recorded_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    pub id: Ulid,
    pub room_id: Ulid,
    pub customer_id: Ulid,
    pub check_in: Ms,
    pub check_out: Ms,
    pub guests: u32,
    pub total: Decimal,
    pub paid: Decimal,
    pub remaining: Decimal,
    pub status: BookingStatus,
    pub addons: Vec<AddonSnapshot>,
    pub payments: Vec<PaymentInfo>,
}

/// What `record_payment` hands back: the new cumulative position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub paid: Decimal,
    pub remaining: Decimal,
    pub fully_paid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn pending_booking(start: Ms, end: Ms) -> BookingRecord {
        BookingRecord {
            id: Ulid::new(),
            customer_id: Ulid::new(),
            span: Span::new(start, end),
            guests: 2,
            total: dec("1000"),
            status: BookingStatus::Pending,
            addons: Vec::new(),
            payments: Vec::new(),
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
    }

    #[test]
    fn span_overlap_half_open() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // back-to-back, not overlapping
    }

    #[test]
    fn status_blocking() {
        assert!(BookingStatus::Pending.blocks_room());
        assert!(BookingStatus::Paid.blocks_room());
        assert!(!BookingStatus::Cancelled.blocks_room());
        assert!(!BookingStatus::Completed.blocks_room());
    }

    #[test]
    fn booking_ordering() {
        let mut room = RoomState::new(Ulid::new(), None, "standard".into(), dec("100"), 2);
        room.insert_booking(pending_booking(3 * DAY_MS, 4 * DAY_MS));
        room.insert_booking(pending_booking(DAY_MS, 2 * DAY_MS));
        room.insert_booking(pending_booking(2 * DAY_MS, 3 * DAY_MS));
        assert_eq!(room.bookings[0].span.start, DAY_MS);
        assert_eq!(room.bookings[1].span.start, 2 * DAY_MS);
        assert_eq!(room.bookings[2].span.start, 3 * DAY_MS);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut room = RoomState::new(Ulid::new(), None, "standard".into(), dec("100"), 2);
        room.insert_booking(pending_booking(DAY_MS, 2 * DAY_MS));
        room.insert_booking(pending_booking(5 * DAY_MS, 7 * DAY_MS));
        room.insert_booking(pending_booking(10 * DAY_MS, 11 * DAY_MS));

        let query = Span::new(6 * DAY_MS, 8 * DAY_MS);
        let hits: Vec<_> = room.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(5 * DAY_MS, 7 * DAY_MS));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // A stay ending exactly at query.start is NOT overlapping (half-open)
        let mut room = RoomState::new(Ulid::new(), None, "standard".into(), dec("100"), 2);
        room.insert_booking(pending_booking(DAY_MS, 3 * DAY_MS));
        let query = Span::new(3 * DAY_MS, 5 * DAY_MS);
        assert_eq!(room.overlapping(&query).count(), 0);
    }

    #[test]
    fn paid_and_remaining_derived() {
        let mut b = pending_booking(DAY_MS, 3 * DAY_MS);
        assert_eq!(b.paid(), Decimal::ZERO);
        assert_eq!(b.remaining(), dec("1000"));

        b.payments.push(PaymentRecord {
            id: Ulid::new(),
            amount: dec("600"),
            method: PaymentMethod::GCash,
            receipt: "r1.jpg".into(),
            recorded_at: 0,
        });
        b.payments.push(PaymentRecord {
            id: Ulid::new(),
            amount: dec("150.25"),
            method: PaymentMethod::BankTransfer,
            receipt: "r2.jpg".into(),
            recorded_at: 0,
        });
        assert_eq!(b.paid(), dec("750.25"));
        assert_eq!(b.remaining(), dec("249.75"));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            id: Ulid::new(),
            room_id: Ulid::new(),
            customer_id: Ulid::new(),
            span: Span::new(DAY_MS, 3 * DAY_MS),
            guests: 2,
            total: dec("1234.56"),
            addons: vec![AddonSnapshot {
                addon_id: Ulid::new(),
                name: "Breakfast".into(),
                kind: AddonKind::Service,
                cost: dec("150.00"),
            }],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
