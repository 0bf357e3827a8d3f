use chrono::{DateTime, Utc};
use uuid::Uuid;
use voyage_core::repository::StoreTx;
use voyage_core::{HoldResult, ReservationError, UnitRef};

/// Claim every slot `unit` occupies for `booking_id`.
///
/// Stops at the first taken slot and reports `Conflict`. Slots claimed before
/// it stay in the transaction, so a caller that sees a conflict must roll back.
pub async fn try_hold(
    tx: &mut dyn StoreTx,
    unit: &UnitRef,
    booking_id: Uuid,
    item_id: Uuid,
    until: DateTime<Utc>,
) -> Result<HoldResult, ReservationError> {
    for slot in unit.slots() {
        if tx.try_hold(&slot, booking_id, item_id, until).await? == HoldResult::Conflict {
            return Ok(HoldResult::Conflict);
        }
    }
    Ok(HoldResult::Granted)
}

/// Drop the holds `booking_id` has on `unit`. Returns how many slots were freed.
pub async fn release(
    tx: &mut dyn StoreTx,
    unit: &UnitRef,
    booking_id: Uuid,
) -> Result<usize, ReservationError> {
    let mut released = 0;
    for slot in unit.slots() {
        if tx.release(&slot, booking_id).await? {
            released += 1;
        }
    }
    Ok(released)
}

/// Make the holds permanent. Already-confirmed slots are not counted again.
pub async fn confirm(
    tx: &mut dyn StoreTx,
    unit: &UnitRef,
    booking_id: Uuid,
) -> Result<usize, ReservationError> {
    let mut confirmed = 0;
    for slot in unit.slots() {
        if tx.confirm(&slot, booking_id).await? {
            confirmed += 1;
        }
    }
    Ok(confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;
    use std::sync::Arc;
    use voyage_core::repository::ReservationStore;
    use voyage_store::MemoryStore;

    fn room(from: &str, to: &str, room_id: Uuid) -> UnitRef {
        UnitRef::Room {
            room_id,
            check_in: NaiveDate::parse_from_str(from, "%Y-%m-%d").unwrap(),
            check_out: NaiveDate::parse_from_str(to, "%Y-%m-%d").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_overlapping_stays_conflict_on_shared_night() {
        let store = MemoryStore::new();
        let room_id = Uuid::new_v4();
        let until = Utc::now() + Duration::minutes(10);

        let mut tx = store.begin().await.unwrap();
        let first = try_hold(tx.as_mut(), &room("2025-05-01", "2025-05-04", room_id), Uuid::new_v4(), Uuid::new_v4(), until)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(first, HoldResult::Granted);

        let mut tx = store.begin().await.unwrap();
        let overlapping = try_hold(tx.as_mut(), &room("2025-05-03", "2025-05-05", room_id), Uuid::new_v4(), Uuid::new_v4(), until)
            .await
            .unwrap();
        assert_eq!(overlapping, HoldResult::Conflict);
        drop(tx);

        // Check-out day is free for the next guest.
        let mut tx = store.begin().await.unwrap();
        let adjacent = try_hold(tx.as_mut(), &room("2025-05-04", "2025-05-06", room_id), Uuid::new_v4(), Uuid::new_v4(), until)
            .await
            .unwrap();
        assert_eq!(adjacent, HoldResult::Granted);
    }

    #[tokio::test]
    async fn test_release_and_confirm_count_slots() {
        let store = MemoryStore::new();
        let booking_id = Uuid::new_v4();
        let unit = room("2025-05-01", "2025-05-03", Uuid::new_v4());
        let until = Utc::now();

        let mut tx = store.begin().await.unwrap();
        try_hold(tx.as_mut(), &unit, booking_id, Uuid::new_v4(), until).await.unwrap();
        assert_eq!(confirm(tx.as_mut(), &unit, booking_id).await.unwrap(), 2);
        assert_eq!(confirm(tx.as_mut(), &unit, booking_id).await.unwrap(), 0);
        assert_eq!(release(tx.as_mut(), &unit, booking_id).await.unwrap(), 0);
        tx.commit().await.unwrap();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_exactly_one_concurrent_hold_is_granted(callers in 2usize..24) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let granted = rt.block_on(async move {
                let store: Arc<dyn ReservationStore> = Arc::new(MemoryStore::new());
                let unit = UnitRef::Seat { schedule_id: Uuid::new_v4(), seat_id: Uuid::new_v4() };
                let until = Utc::now() + Duration::minutes(10);

                let handles: Vec<_> = (0..callers)
                    .map(|_| {
                        let store = store.clone();
                        let unit = unit.clone();
                        tokio::spawn(async move {
                            let mut tx = store.begin().await.unwrap();
                            let result = try_hold(tx.as_mut(), &unit, Uuid::new_v4(), Uuid::new_v4(), until)
                                .await
                                .unwrap();
                            if result == HoldResult::Granted {
                                tx.commit().await.unwrap();
                            }
                            result
                        })
                    })
                    .collect();

                let mut granted = 0;
                for handle in handles {
                    if handle.await.unwrap() == HoldResult::Granted {
                        granted += 1;
                    }
                }
                granted
            });
            prop_assert_eq!(granted, 1);
        }
    }
}
