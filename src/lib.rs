pub mod bookings;
pub mod config;
pub mod db;
pub mod error;
pub mod fields;
pub mod handlers;
pub mod models;

#[cfg(test)]
mod test_utils;
