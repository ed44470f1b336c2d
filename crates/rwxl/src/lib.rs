//! rwxl — a two-tier distributed pipeline that translates game-mod archives
//! while strictly preserving the structural and syntactic invariants of the
//! semi-INI config grammar they're built from.
//!
//! The core (spec §2): a per-archive coordinator (H) that fans one archive
//! submission out into many file-translation work units and aggregates
//! their terminal states; a pool of file workers (G) that apply the
//! structure-preserving rewrite (A) via a translator client (B); and the
//! shared task-state store (E), message bus (F), and completion registry
//! (I) that make the fan-out/fan-in correct under concurrency, crashes, and
//! at-least-once redelivery. The HTTP submission surface, the translation
//! model itself, and the object/message-bus backends' own wire protocols
//! are out of scope — this crate consumes them through capability traits
//! (`capability.rs`).

pub mod archive;
pub mod blob;
pub mod bus;
pub mod capability;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod grammar;
pub mod janitor;
pub mod language;
mod progress;
pub mod registry;
pub mod state_store;
pub mod translator;
pub mod worker;

pub use capability::{Bus, BlobStore, HandlerOutcome, MessageHandler, Registry, StateStore, TaskPatch, Translator};
pub use coordinator::{Coordinator, CoordinatorConfig, TaskMessage};
pub use domain::{FileStatus, FileUnit, Task, TaskStatus, TranslateError};
pub use worker::{FileWorker, WorkerConfig};
