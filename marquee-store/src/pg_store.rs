use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

use marquee_core::{
    Booking, BookingStatus, HoldClaim, NewShow, ReservationError, ReservationStore,
    SeatExpectation, SeatHold, SeatId, SeatState, Show, TransitionOutcome,
};

/// Postgres-backed reservation store. Seat transitions run inside a single
/// transaction that locks the affected seat rows with FOR UPDATE, so two
/// racing requests for overlapping seats serialize at the database even
/// across service instances.
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn seat_ids_to_pg(seat_ids: &[SeatId]) -> Vec<i32> {
    seat_ids.iter().map(|id| *id as i32).collect()
}

fn seat_ids_from_pg(seat_ids: Vec<i32>) -> Vec<SeatId> {
    seat_ids.into_iter().map(|id| id as SeatId).collect()
}

fn show_from_row(row: &PgRow) -> Result<Show, ReservationError> {
    Ok(Show {
        id: row.try_get("id").map_err(ReservationError::storage)?,
        movie_id: row.try_get("movie_id").map_err(ReservationError::storage)?,
        screen_id: row.try_get("screen_id").map_err(ReservationError::storage)?,
        show_date: row.try_get("show_date").map_err(ReservationError::storage)?,
        show_time: row.try_get("show_time").map_err(ReservationError::storage)?,
        base_price: row.try_get("base_price").map_err(ReservationError::storage)?,
        total_seats: row
            .try_get::<i32, _>("total_seats")
            .map_err(ReservationError::storage)? as u32,
        created_at: row.try_get("created_at").map_err(ReservationError::storage)?,
    })
}

fn seat_state_from_row(row: &PgRow) -> Result<SeatState, ReservationError> {
    let state: String = row.try_get("state").map_err(ReservationError::storage)?;
    match state.as_str() {
        "free" => Ok(SeatState::Free),
        "held" => {
            let token: Option<Uuid> = row
                .try_get("hold_token")
                .map_err(ReservationError::storage)?;
            let expires_at: Option<DateTime<Utc>> = row
                .try_get("hold_expires_at")
                .map_err(ReservationError::storage)?;
            match (token, expires_at) {
                (Some(token), Some(expires_at)) => Ok(SeatState::Held { token, expires_at }),
                _ => Err(ReservationError::storage("held seat row missing hold columns")),
            }
        }
        "booked" => {
            let booking_id: Option<Uuid> = row
                .try_get("booking_id")
                .map_err(ReservationError::storage)?;
            booking_id
                .map(|booking_id| SeatState::Booked { booking_id })
                .ok_or_else(|| ReservationError::storage("booked seat row missing booking_id"))
        }
        other => Err(ReservationError::storage(format!(
            "unknown seat state '{other}'"
        ))),
    }
}

fn hold_from_row(row: &PgRow) -> Result<SeatHold, ReservationError> {
    Ok(SeatHold {
        token: row.try_get("token").map_err(ReservationError::storage)?,
        show_id: row.try_get("show_id").map_err(ReservationError::storage)?,
        seat_ids: seat_ids_from_pg(
            row.try_get::<Vec<i32>, _>("seat_ids")
                .map_err(ReservationError::storage)?,
        ),
        created_at: row.try_get("created_at").map_err(ReservationError::storage)?,
        expires_at: row.try_get("expires_at").map_err(ReservationError::storage)?,
    })
}

fn booking_from_row(row: &PgRow) -> Result<Booking, ReservationError> {
    let status: String = row
        .try_get("booking_status")
        .map_err(ReservationError::storage)?;
    let booking_status = match status.as_str() {
        "pending_payment" => BookingStatus::PendingPayment,
        "confirmed" => BookingStatus::Confirmed,
        "cancelled" => BookingStatus::Cancelled,
        other => {
            return Err(ReservationError::storage(format!(
                "unknown booking status '{other}'"
            )))
        }
    };

    Ok(Booking {
        id: row.try_get("id").map_err(ReservationError::storage)?,
        user_id: row.try_get("user_id").map_err(ReservationError::storage)?,
        show_id: row.try_get("show_id").map_err(ReservationError::storage)?,
        seat_ids: seat_ids_from_pg(
            row.try_get::<Vec<i32>, _>("seat_ids")
                .map_err(ReservationError::storage)?,
        ),
        booking_reference: row
            .try_get("booking_reference")
            .map_err(ReservationError::storage)?,
        final_amount: row
            .try_get("final_amount")
            .map_err(ReservationError::storage)?,
        booking_status,
        created_at: row.try_get("created_at").map_err(ReservationError::storage)?,
    })
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    async fn register_show(&self, new: NewShow) -> Result<Show, ReservationError> {
        let mut tx = self.pool.begin().await.map_err(ReservationError::storage)?;

        let row = sqlx::query(
            r#"
            INSERT INTO shows (movie_id, screen_id, show_date, show_time, base_price, total_seats)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT uq_shows_screen_slot DO NOTHING
            RETURNING id, movie_id, screen_id, show_date, show_time, base_price, total_seats, created_at
            "#,
        )
        .bind(new.movie_id)
        .bind(new.screen_id)
        .bind(new.show_date)
        .bind(new.show_time)
        .bind(new.base_price)
        .bind(new.total_seats as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ReservationError::storage)?;

        let Some(row) = row else {
            return Err(ReservationError::DuplicateShow {
                screen_id: new.screen_id,
                show_date: new.show_date,
                show_time: new.show_time,
            });
        };
        let show = show_from_row(&row)?;

        // Seed one Free row per seat of the screen layout.
        sqlx::query(
            "INSERT INTO seat_states (show_id, seat_id) SELECT $1, s FROM generate_series(1, $2) AS s",
        )
        .bind(show.id)
        .bind(new.total_seats as i32)
        .execute(&mut *tx)
        .await
        .map_err(ReservationError::storage)?;

        tx.commit().await.map_err(ReservationError::storage)?;
        Ok(show)
    }

    async fn get_show(&self, show_id: i64) -> Result<Option<Show>, ReservationError> {
        let row = sqlx::query(
            "SELECT id, movie_id, screen_id, show_date, show_time, base_price, total_seats, created_at FROM shows WHERE id = $1",
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReservationError::storage)?;

        row.as_ref().map(show_from_row).transpose()
    }

    async fn delete_show(&self, show_id: i64) -> Result<bool, ReservationError> {
        let result = sqlx::query("DELETE FROM shows WHERE id = $1")
            .bind(show_id)
            .execute(&self.pool)
            .await
            .map_err(ReservationError::storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn try_transition(
        &self,
        show_id: i64,
        seat_ids: &[SeatId],
        expected: SeatExpectation,
        to: SeatState,
    ) -> Result<TransitionOutcome, ReservationError> {
        let ids = seat_ids_to_pg(seat_ids);
        let mut tx = self.pool.begin().await.map_err(ReservationError::storage)?;

        // Lock exactly the affected rows of this show for the duration of
        // the transaction; a racing transition on any of them blocks here.
        let rows = sqlx::query(
            r#"
            SELECT seat_id, state, hold_token, hold_expires_at, booking_id
            FROM seat_states
            WHERE show_id = $1 AND seat_id = ANY($2)
            FOR UPDATE
            "#,
        )
        .bind(show_id)
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(ReservationError::storage)?;

        let mut found: BTreeMap<SeatId, SeatState> = BTreeMap::new();
        for row in &rows {
            let seat_id: i32 = row.try_get("seat_id").map_err(ReservationError::storage)?;
            found.insert(seat_id as SeatId, seat_state_from_row(row)?);
        }

        let mut conflicts: Vec<SeatId> = seat_ids
            .iter()
            .copied()
            .filter(|seat_id| match found.get(seat_id) {
                Some(state) => !expected.matches(state),
                None => true,
            })
            .collect();
        if !conflicts.is_empty() {
            conflicts.sort_unstable();
            return Ok(TransitionOutcome::Conflict {
                seat_ids: conflicts,
            });
        }

        let update = match &to {
            SeatState::Free => sqlx::query(
                r#"
                UPDATE seat_states
                SET state = 'free', hold_token = NULL, hold_expires_at = NULL, booking_id = NULL
                WHERE show_id = $1 AND seat_id = ANY($2)
                "#,
            )
            .bind(show_id)
            .bind(&ids),
            SeatState::Held { token, expires_at } => sqlx::query(
                r#"
                UPDATE seat_states
                SET state = 'held', hold_token = $3, hold_expires_at = $4, booking_id = NULL
                WHERE show_id = $1 AND seat_id = ANY($2)
                "#,
            )
            .bind(show_id)
            .bind(&ids)
            .bind(*token)
            .bind(*expires_at),
            SeatState::Booked { booking_id } => sqlx::query(
                r#"
                UPDATE seat_states
                SET state = 'booked', booking_id = $3, hold_token = NULL, hold_expires_at = NULL
                WHERE show_id = $1 AND seat_id = ANY($2)
                "#,
            )
            .bind(show_id)
            .bind(&ids)
            .bind(*booking_id),
        };
        update
            .execute(&mut *tx)
            .await
            .map_err(ReservationError::storage)?;

        tx.commit().await.map_err(ReservationError::storage)?;
        Ok(TransitionOutcome::Applied)
    }

    async fn snapshot(
        &self,
        show_id: i64,
    ) -> Result<BTreeMap<SeatId, SeatState>, ReservationError> {
        let rows = sqlx::query(
            r#"
            SELECT seat_id, state, hold_token, hold_expires_at, booking_id
            FROM seat_states
            WHERE show_id = $1
            ORDER BY seat_id
            "#,
        )
        .bind(show_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ReservationError::storage)?;

        if rows.is_empty() && self.get_show(show_id).await?.is_none() {
            return Err(ReservationError::ShowNotFound(show_id));
        }

        let mut snapshot = BTreeMap::new();
        for row in &rows {
            let seat_id: i32 = row.try_get("seat_id").map_err(ReservationError::storage)?;
            snapshot.insert(seat_id as SeatId, seat_state_from_row(row)?);
        }
        Ok(snapshot)
    }

    async fn insert_hold(&self, hold: &SeatHold) -> Result<(), ReservationError> {
        sqlx::query(
            r#"
            INSERT INTO seat_holds (token, show_id, seat_ids, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(hold.token)
        .bind(hold.show_id)
        .bind(seat_ids_to_pg(&hold.seat_ids))
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .execute(&self.pool)
        .await
        .map_err(ReservationError::storage)?;
        Ok(())
    }

    async fn get_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError> {
        let row = sqlx::query(
            "SELECT token, show_id, seat_ids, created_at, expires_at FROM seat_holds WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReservationError::storage)?;

        row.as_ref().map(hold_from_row).transpose()
    }

    async fn claim_hold(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<HoldClaim, ReservationError> {
        // The conditional DELETE is the compare-and-set: between a late
        // finalize and a sweep, whoever deletes the row first wins. One
        // statement also classifies the miss, so a concurrent sweep cannot
        // turn an expired token into NotFound between claim and check.
        let row = sqlx::query(
            r#"
            WITH claimed AS (
                DELETE FROM seat_holds
                WHERE token = $1 AND expires_at > $2
                RETURNING token, show_id, seat_ids, created_at, expires_at
            )
            SELECT token, show_id, seat_ids, created_at, expires_at, TRUE AS claimed
            FROM claimed
            UNION ALL
            SELECT token, show_id, seat_ids, created_at, expires_at, FALSE AS claimed
            FROM seat_holds
            WHERE token = $1 AND NOT EXISTS (SELECT 1 FROM claimed)
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReservationError::storage)?;

        let Some(row) = row else {
            return Ok(HoldClaim::NotFound);
        };
        let claimed: bool = row.try_get("claimed").map_err(ReservationError::storage)?;
        if claimed {
            Ok(HoldClaim::Claimed(hold_from_row(&row)?))
        } else {
            Ok(HoldClaim::Expired)
        }
    }

    async fn remove_hold(&self, token: Uuid) -> Result<Option<SeatHold>, ReservationError> {
        let row = sqlx::query(
            r#"
            DELETE FROM seat_holds
            WHERE token = $1
            RETURNING token, show_id, seat_ids, created_at, expires_at
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReservationError::storage)?;

        row.as_ref().map(hold_from_row).transpose()
    }

    async fn claim_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeatHold>, ReservationError> {
        let rows = sqlx::query(
            r#"
            DELETE FROM seat_holds
            WHERE expires_at <= $1
            RETURNING token, show_id, seat_ids, created_at, expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(ReservationError::storage)?;

        rows.iter().map(hold_from_row).collect()
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<(), ReservationError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, show_id, seat_ids, booking_reference, final_amount, booking_status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.show_id)
        .bind(seat_ids_to_pg(&booking.seat_ids))
        .bind(&booking.booking_reference)
        .bind(booking.final_amount)
        .bind(booking.booking_status.as_str())
        .bind(booking.created_at)
        .execute(&self.pool)
        .await
        .map_err(ReservationError::storage)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, ReservationError> {
        let row = sqlx::query(
            "SELECT id, user_id, show_id, seat_ids, booking_reference, final_amount, booking_status, created_at FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ReservationError::storage)?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn list_bookings(
        &self,
        user_id: Option<i64>,
    ) -> Result<Vec<Booking>, ReservationError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(
                    "SELECT id, user_id, show_id, seat_ids, booking_reference, final_amount, booking_status, created_at FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, show_id, seat_ids, booking_reference, final_amount, booking_status, created_at FROM bookings ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(ReservationError::storage)?;

        rows.iter().map(booking_from_row).collect()
    }
}
