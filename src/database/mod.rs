//! Postgres connection pool and schema migrations.

pub mod pool;

pub use pool::{connect, create_pool, ping, run_migrations, DatabaseError};
