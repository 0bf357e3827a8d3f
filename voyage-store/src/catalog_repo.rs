use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;
use voyage_core::repository::{CatalogLookup, UnitPrice};
use voyage_core::{Currency, ItemKind, ReservationError, UnitRef};

use crate::booking_repo::storage_error;

/// Reads unit existence and price from the catalog tables.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    price: Decimal,
    currency: String,
}

impl PriceRow {
    fn into_price(self) -> Result<UnitPrice, ReservationError> {
        Ok(UnitPrice {
            amount: self.price,
            currency: Currency::from_str(&self.currency)?,
        })
    }
}

#[async_trait]
impl CatalogLookup for PgCatalog {
    async fn price_of(&self, unit: &UnitRef) -> Result<Option<UnitPrice>, ReservationError> {
        let row = match unit {
            // A seat exists on a schedule when it belongs to the bus running it.
            UnitRef::Seat { schedule_id, seat_id } => {
                sqlx::query_as::<_, PriceRow>(
                    r#"
                    SELECT s.price AS price, s.currency AS currency
                    FROM bus_schedules s
                    JOIN bus_seats b ON b.bus_id = s.bus_id
                    WHERE s.id = $1 AND b.id = $2
                    "#,
                )
                .bind(schedule_id)
                .bind(seat_id)
                .fetch_optional(&self.pool)
                .await
            }
            UnitRef::Room { room_id, .. } => {
                sqlx::query_as::<_, PriceRow>(
                    r#"
                    SELECT price_per_night AS price, currency
                    FROM hotel_rooms
                    WHERE id = $1 AND is_active
                    "#,
                )
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(storage_error)?;

        row.map(PriceRow::into_price).transpose()
    }
}

/// Fixed price list, for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    prices: HashMap<(ItemKind, Uuid), UnitPrice>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seat(mut self, seat_id: Uuid, amount: Decimal, currency: Currency) -> Self {
        self.prices.insert((ItemKind::Seat, seat_id), UnitPrice { amount, currency });
        self
    }

    /// `amount` is the price per night.
    pub fn with_room(mut self, room_id: Uuid, amount: Decimal, currency: Currency) -> Self {
        self.prices.insert((ItemKind::Room, room_id), UnitPrice { amount, currency });
        self
    }
}

#[async_trait]
impl CatalogLookup for StaticCatalog {
    async fn price_of(&self, unit: &UnitRef) -> Result<Option<UnitPrice>, ReservationError> {
        Ok(self.prices.get(&(unit.kind(), unit.unit_id())).cloned())
    }
}
