//! FAST — Flag Acquisition and Submission Tool for Attack/Defense competitions.
//!
//! This library crate holds every component shared by the `fast-server` and
//! `fast-client` binaries: the tick clock (C1), the client-side exploit
//! runner (C2-C5), the server-side ingestion/storage/submission stack
//! (C6-C9), and the dashboard event bus (C10).

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod server;
