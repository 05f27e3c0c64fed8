//! eobot - message store and anti-repeat replay bot.
//!
//! Messages live in a local SQLite primary. An optional secondary store
//! (PostgreSQL or another SQLite file) seeds an empty primary at startup and
//! serves requests while the primary is unavailable.

pub mod config;
pub mod crawl;
pub mod db;
pub mod error;
pub mod handlers;
pub mod http;
pub mod transport;
