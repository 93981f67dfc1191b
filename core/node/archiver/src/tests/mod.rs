//! Pipeline tests that drive the object-store side of the archival flow
//! against the file-backed store, without a live Postgres.

mod pipeline;
mod utils;
