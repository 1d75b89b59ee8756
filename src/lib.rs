//! Legacy-data migration engine that extracts the payment information
//! embedded in membership application rows into standalone payment
//! records, back-filling a payment reference onto each migrated row.

pub mod converter;
pub mod cursor;
pub mod handler;
pub mod models;
pub mod progress;
pub mod result;
pub mod storage;
