//! Postgres access layer for the audit table archiver.
//!
//! All SQL lives here. Identifiers are always validated and double-quoted
//! before they reach a query string; values are always bound. The keyset
//! batch selector, catalog-driven schema detector, session advisory locks,
//! and the timeout-monitored transaction wrapper are the load-bearing pieces.

pub use crate::{
    advisory_lock::{advisory_lock_key, PgAdvisoryLock},
    batch_selector::{calculate_cutoff_date, BatchSelectorDal, TableColumnTypes, TableTarget},
    connection::ConnectionPool,
    decode::decode_row,
    error::DalError,
    ident::quote_ident,
    schema_detector::SchemaDal,
    transaction::{ArchiveTransaction, TransactionManager},
};

mod advisory_lock;
mod batch_selector;
mod connection;
mod decode;
mod error;
mod ident;
mod schema_detector;
mod transaction;
