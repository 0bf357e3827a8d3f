use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;
use voyage_core::repository::{ReservationStore, StoreTx};
use voyage_core::{
    AllocationSlot, AllocationState, Booking, BookingItem, BookingStatus, Currency, HoldResult,
    ItemKind, Payment, PaymentMode, PaymentStatus, ReservationError, UnitRef,
};

pub(crate) fn storage_error(e: sqlx::Error) -> ReservationError {
    ReservationError::Storage(e.to_string())
}

/// Postgres-backed reservation storage.
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// One open database transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    owner_id: String,
    total_amount: Decimal,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct BookingItemRow {
    id: Uuid,
    booking_id: Uuid,
    kind: String,
    unit_id: Uuid,
    schedule_id: Option<Uuid>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    quantity: i32,
    unit_price: Decimal,
    total: Decimal,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    tran_id: String,
    amount: Decimal,
    currency: String,
    status: String,
    mode: String,
    payable_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AllocationRow {
    booking_id: Uuid,
    state: String,
    held_until: Option<DateTime<Utc>>,
}

const BOOKING_COLUMNS: &str =
    "id, owner_id, total_amount, currency, status, created_at, expires_at";
const PAYMENT_COLUMNS: &str =
    "id, booking_id, tran_id, amount, currency, status, mode, payable_reference, paid_at, created_at";

impl BookingItemRow {
    fn into_item(self) -> Result<BookingItem, ReservationError> {
        let unit = match ItemKind::from_str(&self.kind)? {
            ItemKind::Seat => UnitRef::Seat {
                schedule_id: self.schedule_id.ok_or_else(|| {
                    ReservationError::Storage(format!("seat item {} has no schedule", self.id))
                })?,
                seat_id: self.unit_id,
            },
            ItemKind::Room => match (self.check_in, self.check_out) {
                (Some(check_in), Some(check_out)) => UnitRef::Room {
                    room_id: self.unit_id,
                    check_in,
                    check_out,
                },
                _ => {
                    return Err(ReservationError::Storage(format!(
                        "room item {} has no stay dates",
                        self.id
                    )))
                }
            },
        };
        Ok(BookingItem {
            id: self.id,
            booking_id: self.booking_id,
            unit,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total: self.total,
        })
    }
}

impl BookingRow {
    fn into_booking(self, items: Vec<BookingItem>) -> Result<Booking, ReservationError> {
        Ok(Booking {
            id: self.id,
            owner_id: self.owner_id,
            items,
            total_amount: self.total_amount,
            currency: Currency::from_str(&self.currency)?,
            status: BookingStatus::from_str(&self.status)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, ReservationError> {
        Ok(Payment {
            id: self.id,
            booking_id: self.booking_id,
            tran_id: self.tran_id,
            amount: self.amount,
            currency: Currency::from_str(&self.currency)?,
            status: PaymentStatus::from_str(&self.status)?,
            mode: PaymentMode::from_str(&self.mode)?,
            payable_reference: self.payable_reference,
            paid_at: self.paid_at,
            created_at: self.created_at,
        })
    }
}

async fn load_booking(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<Booking>, ReservationError> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE id = $1{}",
        BOOKING_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, BookingRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_error)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, BookingItemRow>(
        r#"
        SELECT id, booking_id, kind, unit_id, schedule_id, check_in, check_out, quantity, unit_price, total
        FROM booking_items WHERE booking_id = $1 ORDER BY id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage_error)?
    .into_iter()
    .map(BookingItemRow::into_item)
    .collect::<Result<Vec<_>, _>>()?;

    row.into_booking(items).map(Some)
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, ReservationError> {
        let tx = self.pool.begin().await.map_err(storage_error)?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, ReservationError> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        load_booking(&mut conn, id, false).await
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        exclude: &[Uuid],
    ) -> Result<Vec<Uuid>, ReservationError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM bookings
            WHERE status = 'pending' AND expires_at < $1 AND NOT (id = ANY($3))
            ORDER BY expires_at, id
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn get_payment(&self, tran_id: &str) -> Result<Option<Payment>, ReservationError> {
        let sql = format!("SELECT {} FROM payments WHERE tran_id = $1", PAYMENT_COLUMNS);
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(tran_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(PaymentRow::into_payment)
            .transpose()
    }

    async fn allocation_state(
        &self,
        slot: &AllocationSlot,
    ) -> Result<AllocationState, ReservationError> {
        let row = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT booking_id, state, held_until FROM inventory_allocations
            WHERE kind = $1 AND unit_id = $2 AND slot = $3
            "#,
        )
        .bind(slot.kind.as_str())
        .bind(slot.unit_id)
        .bind(&slot.slot)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(match row {
            None => AllocationState::Free,
            Some(r) if r.state == "confirmed" => AllocationState::Confirmed { booking_id: r.booking_id },
            Some(r) => AllocationState::Held {
                booking_id: r.booking_id,
                until: r.held_until.unwrap_or_else(Utc::now),
            },
        })
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn try_hold(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
        item_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<HoldResult, ReservationError> {
        // The primary key decides. A concurrent uncommitted insert of the same
        // key blocks here until that transaction finishes.
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_allocations (kind, unit_id, slot, booking_id, booking_item_id, state, held_until)
            VALUES ($1, $2, $3, $4, $5, 'held', $6)
            ON CONFLICT (kind, unit_id, slot) DO NOTHING
            "#,
        )
        .bind(slot.kind.as_str())
        .bind(slot.unit_id)
        .bind(&slot.slot)
        .bind(booking_id)
        .bind(item_id)
        .bind(until)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_error)?;

        Ok(if result.rows_affected() == 1 {
            HoldResult::Granted
        } else {
            HoldResult::Conflict
        })
    }

    async fn release(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
    ) -> Result<bool, ReservationError> {
        let result = sqlx::query(
            r#"
            DELETE FROM inventory_allocations
            WHERE kind = $1 AND unit_id = $2 AND slot = $3 AND booking_id = $4 AND state = 'held'
            "#,
        )
        .bind(slot.kind.as_str())
        .bind(slot.unit_id)
        .bind(&slot.slot)
        .bind(booking_id)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn confirm(
        &mut self,
        slot: &AllocationSlot,
        booking_id: Uuid,
    ) -> Result<bool, ReservationError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_allocations
            SET state = 'confirmed', held_until = NULL
            WHERE kind = $1 AND unit_id = $2 AND slot = $3 AND booking_id = $4 AND state = 'held'
            "#,
        )
        .bind(slot.kind.as_str())
        .bind(slot.unit_id)
        .bind(&slot.slot)
        .bind(booking_id)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), ReservationError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, owner_id, total_amount, currency, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.owner_id)
        .bind(booking.total_amount)
        .bind(booking.currency.code())
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_error)?;

        for item in &booking.items {
            let (schedule_id, check_in, check_out) = match &item.unit {
                UnitRef::Seat { schedule_id, .. } => (Some(*schedule_id), None, None),
                UnitRef::Room { check_in, check_out, .. } => (None, Some(*check_in), Some(*check_out)),
            };
            sqlx::query(
                r#"
                INSERT INTO booking_items (id, booking_id, kind, unit_id, schedule_id, check_in, check_out, quantity, unit_price, total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(booking.id)
            .bind(item.unit.kind().as_str())
            .bind(item.unit.unit_id())
            .bind(schedule_id)
            .bind(check_in)
            .bind(check_out)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_error)?;
        }

        Ok(())
    }

    async fn lock_booking(&mut self, id: Uuid) -> Result<Option<Booking>, ReservationError> {
        load_booking(&mut *self.tx, id, true).await
    }

    async fn set_booking_status(
        &mut self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<(), ReservationError> {
        sqlx::query("UPDATE bookings SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), ReservationError> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, tran_id, amount, currency, status, mode, payable_reference, paid_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(&payment.tran_id)
        .bind(payment.amount)
        .bind(payment.currency.code())
        .bind(payment.status.as_str())
        .bind(payment.mode.as_str())
        .bind(&payment.payable_reference)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn lock_payment(&mut self, tran_id: &str) -> Result<Option<Payment>, ReservationError> {
        let sql = format!("SELECT {} FROM payments WHERE tran_id = $1 FOR UPDATE", PAYMENT_COLUMNS);
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(tran_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage_error)?
            .map(PaymentRow::into_payment)
            .transpose()
    }

    async fn update_payment(
        &mut self,
        payment: &Payment,
        provider_payload: Option<&Value>,
    ) -> Result<(), ReservationError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, payable_reference = $3, paid_at = $4,
                provider_payload = COALESCE($5, provider_payload), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(payment.status.as_str())
        .bind(&payment.payable_reference)
        .bind(payment.paid_at)
        .bind(provider_payload.cloned())
        .execute(&mut *self.tx)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn tran_id_exists(&mut self, tran_id: &str) -> Result<bool, ReservationError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM payments WHERE tran_id = $1)")
            .bind(tran_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage_error)
    }

    async fn commit(self: Box<Self>) -> Result<(), ReservationError> {
        self.tx.commit().await.map_err(storage_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), ReservationError> {
        self.tx.rollback().await.map_err(storage_error)
    }
}
