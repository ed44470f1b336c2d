//! Component F — the message bus adapter (spec §4.7). The real backend is
//! AMQP via `lapin`, matching the original's RabbitMQ deployment; an
//! in-memory fake lives alongside it for the coordinator/worker tests, the
//! same way the teacher keeps `InMemorySource`/`InMemorySink` next to the
//! real backends instead of off in a separate tree.

pub mod amqp;
pub mod in_memory;

pub use amqp::AmqpBus;
pub use in_memory::InMemoryBus;
