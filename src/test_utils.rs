use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;
use std::future::Future;
use std::sync::Arc;

use crate::bookings::BookingStore;
use crate::db::Database;
use crate::fields::FieldStore;
use crate::models::{Category, Field};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("test date")
}

pub fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").expect("test time")
}

/// Both stores over one fresh in-memory database.
pub async fn test_stores() -> (Arc<FieldStore>, Arc<BookingStore>) {
    let db = Database::for_test().await;
    let fields = FieldStore::from(db.clone());
    let bookings = BookingStore::from(db);
    (fields, bookings)
}

/// Runs an async property body on its own runtime with a fresh database.
pub fn test_prop<F, Fut>(f: F)
where
    F: FnOnce(Database) -> Fut,
    Fut: Future<Output = ()>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    rt.block_on(async {
        let db = Database::for_test().await;
        f(db).await;
    });
}

pub fn arb_field() -> impl Strategy<Value = Field> {
    (
        "[A-Za-z][A-Za-z0-9 ]{0,20}[A-Za-z0-9]",
        prop::sample::select(Category::ALL.to_vec()),
        0.0f64..1e9,
    )
        .prop_map(|(name, category, price_per_hour)| Field {
            name,
            category: category.as_str().to_string(),
            price_per_hour,
        })
}

/// Names with whitespace on at least one side.
pub fn arb_padded_name() -> impl Strategy<Value = String> {
    (
        "[ \t]{0,3}",
        "[A-Za-z][A-Za-z0-9 ]{0,20}[A-Za-z0-9]",
        "[ \t]{0,3}",
    )
        .prop_filter("needs padding", |(lead, _, trail)| !lead.is_empty() || !trail.is_empty())
        .prop_map(|(lead, core, trail)| format!("{lead}{core}{trail}"))
}
