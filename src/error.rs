use std::fmt;
use thiserror::Error;

use crate::models::BookingId;

pub type StoreResult<T> = Result<T, StoreError>;

/// The record a lookup or delete failed to find.
#[derive(Debug, Clone, PartialEq)]
pub enum NotFound {
    Field(String),
    Booking(BookingId),
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::Field(name) => write!(f, "field {name:?} not found"),
            NotFound::Booking(id) => write!(f, "booking #{id} not found"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("field {name:?} already exists")]
    DuplicateKey { name: String },

    #[error("{0}")]
    NotFound(NotFound),

    #[error("field {name:?} is still referenced by {bookings} booking(s)")]
    ReferentialConflict { name: String, bookings: i64 },

    #[error("booking #{booking_id} references missing field {field_name:?}")]
    DanglingReference {
        booking_id: BookingId,
        field_name: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Errors caused by the request rather than by storage.
    pub fn is_domain(&self) -> bool {
        !matches!(self, StoreError::Database(_))
    }
}
