//! osa-runner
//!
//! Sandboxed execution of hook and source containers over the Docker Engine
//! API, plus the durable workspace layout both kinds of run read and write.
//!
//! The filesystem contract is public API for hook/source authors:
//!
//! - `/osa/in` (ro): `record.json`, optional `files/`, optional `config.json`
//! - `/osa/out` (rw): `features.json`, `progress.jsonl`; sources also write
//!   `records.jsonl` and `session.json`
//! - sources additionally mount `/osa/files` (rw)
//!
//! Result parsing is pure and lives in [`outcome`]; the Docker plumbing is
//! deliberately thin around it.

mod container;
mod hook;
pub mod outcome;
mod source;
pub mod storage;

pub use container::connect_docker;
pub use hook::OciHookRunner;
pub use source::OciSourceRunner;
pub use storage::LocalFileStorage;
