//! PostgreSQL persistence layer for cadence.
//!
//! Owns the connection pool, embedded migrations, row models, and one
//! query module per table. Higher layers (`cadence-core`) never write SQL;
//! they call the functions in [`queries`].

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
