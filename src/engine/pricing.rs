use rust_decimal::Decimal;

use crate::model::{AddonSnapshot, Span, DAY_MS};

/// Whole nights in a stay. A partial trailing day counts as a full night,
/// so `[3pm Mon, 11am Tue)` bills one night, not zero.
pub fn nights(span: &Span) -> i64 {
    (span.duration_ms() as u64).div_ceil(DAY_MS as u64) as i64
}

/// `rate × nights + Σ addon cost`, all in exact decimal arithmetic.
/// Addon costs must already be snapshotted — this function never reads
/// the live catalog.
pub fn quote(rate: Decimal, nights: i64, addons: &[AddonSnapshot]) -> Decimal {
    let mut total = rate * Decimal::from(nights);
    for addon in addons {
        total += addon.cost;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddonKind, HOUR_MS};
    use ulid::Ulid;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn snapshot(cost: &str) -> AddonSnapshot {
        AddonSnapshot {
            addon_id: Ulid::new(),
            name: "addon".into(),
            kind: AddonKind::Amenity,
            cost: dec(cost),
        }
    }

    #[test]
    fn nights_whole_days() {
        assert_eq!(nights(&Span::new(0, 2 * DAY_MS)), 2);
        assert_eq!(nights(&Span::new(DAY_MS, 2 * DAY_MS)), 1);
    }

    #[test]
    fn nights_partial_day_rounds_up() {
        // 3pm check-in to 11am check-out: 20 hours, one night
        assert_eq!(nights(&Span::new(15 * HOUR_MS, 15 * HOUR_MS + 20 * HOUR_MS)), 1);
        // 1 day + 1 hour: two nights
        assert_eq!(nights(&Span::new(0, DAY_MS + HOUR_MS)), 2);
    }

    #[test]
    fn quote_rate_times_nights() {
        assert_eq!(quote(dec("2500.00"), 3, &[]), dec("7500.00"));
    }

    #[test]
    fn quote_adds_addons() {
        let addons = vec![snapshot("150.00"), snapshot("75.50")];
        assert_eq!(quote(dec("1000"), 2, &addons), dec("2225.50"));
    }

    #[test]
    fn quote_exact_decimal_no_drift() {
        // Many small addon costs must sum exactly — no binary float drift
        let addons: Vec<AddonSnapshot> = (0..10).map(|_| snapshot("0.10")).collect();
        assert_eq!(quote(dec("0"), 1, &addons), dec("1.00"));
    }
}
