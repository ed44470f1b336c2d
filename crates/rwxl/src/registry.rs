//! Component I — the Completion Registry, the fan-in rendezvous between
//! file workers and the owning coordinator (spec §4.9 step 9, §6).

pub mod in_memory;
pub mod redis;

pub use in_memory::InMemoryRegistry;
pub use redis::RedisRegistry;
