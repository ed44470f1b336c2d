//! Component E — the durable task-state store (spec §4.6), grounded on
//! `gglib-db`'s repository pattern (a thin struct wrapping a pool, one
//! method per operation, `sqlx::query` with bound parameters) even though
//! that pack repo targets SQLite and this one targets Postgres per the
//! teacher's own `sqlx` feature selection.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStateStore;
pub use postgres::PostgresStateStore;
