use chrono::{NaiveDate, NaiveTime};
use sqlx::FromRow;

pub type BookingId = i64;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
const TIME_FORMAT_SECONDS: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Field {
    pub name: String,
    pub category: String,
    pub price_per_hour: f64,
}

/// Categories offered by the bot. Storage keeps the category as free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Futsal,
    Badminton,
    Basket,
    MiniSoccer,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Futsal,
        Category::Badminton,
        Category::Basket,
        Category::MiniSoccer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Futsal => "Futsal",
            Category::Badminton => "Badminton",
            Category::Basket => "Basket",
            Category::MiniSoccer => "Mini Soccer",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub field_name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_hours: i64,
}

/// A booking joined with the field it references.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingView {
    pub booking: Booking,
    pub field: Field,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BookingSummary {
    pub bookings: i64,
    pub hours: i64,
    pub revenue: f64,
}

impl BookingSummary {
    pub fn from_views(views: &[BookingView]) -> Self {
        views.iter().fold(Self::default(), |mut acc, view| {
            acc.bookings += 1;
            acc.hours = acc.hours.saturating_add(view.booking.duration_hours);
            acc.revenue += view.total_cost;
            acc
        })
    }
}

/// Which listing a mutation invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Fields,
    Bookings,
}

/// Result of a mutating call: its value plus the view to re-render.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub refresh: Refresh,
}

impl<T> Applied<T> {
    pub fn new(value: T, refresh: Refresh) -> Self {
        Self { value, refresh }
    }
}

// Raw `Booking LEFT JOIN Field` row; the field columns are NULL for orphans.
#[derive(Debug, FromRow)]
pub(crate) struct BookingRow {
    pub id: BookingId,
    pub field_name: String,
    pub date: String,
    pub start_time: String,
    pub duration: i64,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub joined_name: Option<String>,
}

impl BookingRow {
    pub fn booking(&self) -> Result<Booking, sqlx::Error> {
        Ok(Booking {
            id: self.id,
            field_name: self.field_name.clone(),
            date: parse_stored_date(&self.date)?,
            start_time: parse_stored_time(&self.start_time)?,
            duration_hours: self.duration,
        })
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn parse_stored_date(s: &str) -> Result<NaiveDate, sqlx::Error> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn parse_stored_time(s: &str) -> Result<NaiveTime, sqlx::Error> {
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, TIME_FORMAT_SECONDS))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_round_trip_through_parse() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse("Tennis"), None);
    }

    #[test]
    fn stored_time_accepts_seconds() {
        assert_eq!(
            parse_stored_time("18:00:00").unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap()
        );
        assert_eq!(
            parse_stored_time("07:30").unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert!(matches!(parse_stored_time("6pm"), Err(sqlx::Error::Decode(_))));
    }

    #[test]
    fn dates_and_times_are_written_in_storage_format() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let time = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        assert_eq!(format_date(date), "2024-01-01");
        assert_eq!(format_time(time), "18:00");
    }
}
