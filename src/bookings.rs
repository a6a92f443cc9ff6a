use chrono::{NaiveDate, NaiveTime};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::db::Database;
use crate::error::{NotFound, StoreError, StoreResult};
use crate::models::{
    format_date, format_time, Applied, Booking, BookingId, BookingRow, BookingSummary,
    BookingView, Field, Refresh,
};

const SELECT_BOOKINGS: &str = r#"
    SELECT
        b.id,
        COALESCE(b.field_name, '') AS field_name,
        b.date,
        b.start_time,
        b.duration,
        COALESCE(f.type, '') AS category,
        f.price,
        f.name AS joined_name
    FROM Booking b
    LEFT JOIN Field f ON f.name = b.field_name
    ORDER BY b.date, b.start_time, b.id
"#;

/// Longest booking accepted, one full day.
pub const MAX_DURATION_HOURS: i64 = 24;

const INSERT_BOOKING_FOR_EXISTING_FIELD: &str = r#"
    INSERT INTO Booking (field_name, date, start_time, duration)
    SELECT ?, ?, ?, ?
    WHERE EXISTS (SELECT 1 FROM Field WHERE name = ?)
"#;

/// Owns the `Booking` table. The `Field` table, owned by
/// [`FieldStore`](crate::fields::FieldStore), is only ever read.
pub struct BookingStore {
    db: Database,
}

impl BookingStore {
    pub fn from(db: Database) -> Arc<Self> {
        Arc::new(Self { db })
    }

    pub async fn create_booking(
        &self,
        field_name: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_hours: i64,
    ) -> StoreResult<Applied<BookingId>> {
        if duration_hours <= 0 {
            return Err(StoreError::InvalidInput(format!(
                "duration must be a positive number of hours, got {duration_hours}"
            )));
        }
        if duration_hours > MAX_DURATION_HOURS {
            return Err(StoreError::InvalidInput(format!(
                "duration must be at most {MAX_DURATION_HOURS} hours, got {duration_hours}"
            )));
        }

        // one statement, so the field cannot be deleted between check and insert
        let result = sqlx::query(INSERT_BOOKING_FOR_EXISTING_FIELD)
            .bind(field_name)
            .bind(format_date(date))
            .bind(format_time(start_time))
            .bind(duration_hours)
            .bind(field_name)
            .execute(&self.db.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(NotFound::Field(field_name.to_string())));
        }
        let id = result.last_insert_rowid();

        info!(
            "Booked {field_name:?} on {} at {} for {duration_hours}h as #{id}",
            format_date(date),
            format_time(start_time)
        );
        Ok(Applied::new(id, Refresh::Bookings))
    }

    /// Every booking with its field and total cost.
    ///
    /// A booking whose field has disappeared fails the whole listing with
    /// [`StoreError::DanglingReference`] instead of being skipped.
    pub async fn list_bookings(&self) -> StoreResult<Vec<BookingView>> {
        let rows = sqlx::query_as::<_, BookingRow>(SELECT_BOOKINGS)
            .fetch_all(&self.db.pool)
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let booking = row.booking()?;
            if row.joined_name.is_none() {
                warn!(
                    "Booking #{} references missing field {:?}",
                    booking.id, booking.field_name
                );
                return Err(StoreError::DanglingReference {
                    booking_id: booking.id,
                    field_name: booking.field_name,
                });
            }
            let price_per_hour = row.price.ok_or_else(|| {
                sqlx::Error::Decode(format!("field {:?} has no price", booking.field_name).into())
            })?;
            let field = Field {
                name: booking.field_name.clone(),
                category: row.category.unwrap_or_default(),
                price_per_hour,
            };
            let total_cost = Self::compute_total_cost(&booking, &field);
            views.push(BookingView {
                booking,
                field,
                total_cost,
            });
        }
        debug!("Listed {} booking(s)", views.len());
        Ok(views)
    }

    pub async fn delete_booking(&self, id: BookingId) -> StoreResult<Applied<()>> {
        let result = sqlx::query("DELETE FROM Booking WHERE id = ?")
            .bind(id)
            .execute(&self.db.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(NotFound::Booking(id)));
        }
        info!("Deleted booking #{id}");
        Ok(Applied::new((), Refresh::Bookings))
    }

    pub fn compute_total_cost(booking: &Booking, field: &Field) -> f64 {
        booking.duration_hours as f64 * field.price_per_hour
    }

    /// Totals over [`BookingStore::list_bookings`], with the same orphan policy.
    pub async fn summary(&self) -> StoreResult<BookingSummary> {
        let views = self.list_bookings().await?;
        Ok(BookingSummary::from_views(&views))
    }
}
