use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_core::repository::{BookingStore, StoreResult, StoreTx};
use coachline_core::StoreError;
use coachline_shared::{Booking, BookingId, PaymentInfo, Seat, SeatId, Segment, SegmentPrice, Trip, TripId};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const SEAT_COLUMNS: &str = "id, trip_id, seat_number, status, holder, lock_expires_at, \
     origin_stop, destination_stop, price, booking_ref, access_id";

const BOOKING_COLUMNS: &str = "id, user_id, provider_id, seat_ids, origin_stop, destination_stop, \
     total_price, payment_method, approval_status, payment_status, payment_info, expires_at, \
     created_at, updated_at";

const TRIP_COLUMNS: &str = "id, provider_id, status, departure_time, stop_order, prices";

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Serialization failures and deadlocks are retryable; everything else is not.
fn db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(e.to_string())
}

// ============================================================================
// Row mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    trip_id: Uuid,
    seat_number: String,
    status: String,
    holder: Option<String>,
    lock_expires_at: Option<DateTime<Utc>>,
    origin_stop: Option<String>,
    destination_stop: Option<String>,
    price: Option<i64>,
    booking_ref: Option<Uuid>,
    access_id: Option<String>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e: coachline_shared::UnknownStatus| StoreError::Corrupt {
            id: row.id.to_string(),
            reason: e.to_string(),
        })?;
        let segment = match (row.origin_stop, row.destination_stop) {
            (Some(origin), Some(destination)) => Some(Segment::new(origin, destination)),
            _ => None,
        };

        Ok(Seat {
            id: row.id,
            trip_id: row.trip_id,
            seat_number: row.seat_number,
            status,
            holder: row.holder,
            lock_expires_at: row.lock_expires_at,
            segment,
            price: row.price,
            booking_ref: row.booking_ref,
            access_id: row.access_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    provider_id: String,
    seat_ids: Vec<Uuid>,
    origin_stop: String,
    destination_stop: String,
    total_price: i64,
    payment_method: String,
    approval_status: String,
    payment_status: String,
    payment_info: Option<Json<PaymentInfo>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let corrupt = |e: coachline_shared::UnknownStatus| StoreError::Corrupt {
            id: row.id.to_string(),
            reason: e.to_string(),
        };

        Ok(Booking {
            id: row.id,
            payment_method: row.payment_method.parse().map_err(corrupt)?,
            approval_status: row.approval_status.parse().map_err(corrupt)?,
            payment_status: row.payment_status.parse().map_err(corrupt)?,
            user_id: row.user_id,
            provider_id: row.provider_id,
            seat_ids: row.seat_ids,
            segment: Segment::new(row.origin_stop, row.destination_stop),
            total_price: row.total_price,
            payment_info: row.payment_info.map(|j| j.0),
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    provider_id: String,
    status: String,
    departure_time: DateTime<Utc>,
    stop_order: Json<Vec<String>>,
    prices: Json<Vec<SegmentPrice>>,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e: coachline_shared::UnknownStatus| StoreError::Corrupt {
            id: row.id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Trip {
            id: row.id,
            provider_id: row.provider_id,
            status,
            departure_time: row.departure_time,
            stop_order: row.stop_order.0,
            prices: row.prices.0,
        })
    }
}

fn into_seats(rows: Vec<SeatRow>) -> StoreResult<Vec<Seat>> {
    rows.into_iter().map(Seat::try_from).collect()
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn lock_seat_if_free(
        &self,
        seat_id: SeatId,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<Seat>> {
        let sql = format!(
            r#"
            UPDATE seats
            SET status = 'locked', holder = $2, lock_expires_at = $4,
                origin_stop = NULL, destination_stop = NULL, price = NULL, booking_ref = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND (status = 'available'
                   OR (status = 'locked' AND (lock_expires_at IS NULL OR lock_expires_at <= $3)))
            RETURNING {SEAT_COLUMNS}
            "#
        );

        let row: Option<SeatRow> = sqlx::query_as(&sql)
            .bind(seat_id)
            .bind(holder)
            .bind(now)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Seat::try_from).transpose()
    }

    async fn unlock_seats(&self, seat_ids: &[SeatId], holder: &str) -> StoreResult<Vec<SeatId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE seats
            SET status = 'available', holder = NULL, lock_expires_at = NULL,
                origin_stop = NULL, destination_stop = NULL, updated_at = NOW()
            WHERE id = ANY($1) AND status = 'locked' AND holder = $2
            RETURNING id
            "#,
        )
        .bind(seat_ids)
        .bind(holder)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn release_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'available', holder = NULL, lock_expires_at = NULL,
                origin_stop = NULL, destination_stop = NULL, updated_at = NOW()
            WHERE status = 'locked' AND (lock_expires_at IS NULL OR lock_expires_at < $1)
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn expired_booking_ids(&self, now: DateTime<Utc>) -> StoreResult<Vec<BookingId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM bookings
            WHERE approval_status = 'pending_approval'
              AND payment_status = 'pending'
              AND expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_booking(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn get_seats(&self, ids: &[SeatId]) -> StoreResult<Vec<Seat>> {
        let sql = format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = ANY($1) ORDER BY id");
        let rows: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        into_seats(rows)
    }

    async fn get_trip(&self, id: TripId) -> StoreResult<Option<Trip>> {
        let sql = format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1");
        let row: Option<TripRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Trip::try_from).transpose()
    }
}

// ============================================================================
// Unit of work
// ============================================================================

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn seats(&mut self, ids: &[SeatId]) -> StoreResult<Vec<Seat>> {
        let sql = format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = ANY($1) ORDER BY id");
        let rows: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;

        into_seats(rows)
    }

    async fn seats_for_update(&mut self, ids: &[SeatId]) -> StoreResult<Vec<Seat>> {
        // Fixed lock order keeps concurrent multi-seat writers from deadlocking
        let sql = format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = ANY($1) ORDER BY id FOR UPDATE");
        let rows: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;

        into_seats(rows)
    }

    async fn seat_numbers_for_update(
        &mut self,
        trip_id: TripId,
        seat_numbers: &[String],
    ) -> StoreResult<Vec<Seat>> {
        let sql = format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE trip_id = $1 AND seat_number = ANY($2) \
             ORDER BY id FOR UPDATE"
        );
        let rows: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(trip_id)
            .bind(seat_numbers)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;

        into_seats(rows)
    }

    async fn trip(&mut self, id: TripId) -> StoreResult<Option<Trip>> {
        let sql = format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1");
        let row: Option<TripRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;

        row.map(Trip::try_from).transpose()
    }

    async fn save_seats(&mut self, seats: &[Seat]) -> StoreResult<()> {
        for seat in seats {
            let (origin, destination) = match &seat.segment {
                Some(s) => (Some(s.origin_stop.as_str()), Some(s.destination_stop.as_str())),
                None => (None, None),
            };

            sqlx::query(
                r#"
                UPDATE seats
                SET status = $2, holder = $3, lock_expires_at = $4, origin_stop = $5,
                    destination_stop = $6, price = $7, booking_ref = $8, access_id = $9,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(seat.id)
            .bind(seat.status.as_str())
            .bind(seat.holder.as_deref())
            .bind(seat.lock_expires_at)
            .bind(origin)
            .bind(destination)
            .bind(seat.price)
            .bind(seat.booking_ref)
            .bind(seat.access_id.as_deref())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, provider_id, seat_ids, origin_stop, destination_stop,
                                  total_price, payment_method, approval_status, payment_status,
                                  payment_info, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(&booking.provider_id)
        .bind(&booking.seat_ids)
        .bind(&booking.segment.origin_stop)
        .bind(&booking.segment.destination_stop)
        .bind(booking.total_price)
        .bind(booking.payment_method.as_str())
        .bind(booking.approval_status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.payment_info.as_ref().map(Json))
        .bind(booking.expires_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn booking_for_update(&mut self, id: BookingId) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn save_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET approval_status = $2, payment_status = $3, payment_info = $4,
                expires_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.approval_status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.payment_info.as_ref().map(Json))
        .bind(booking.expires_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(db_err)
    }
}
