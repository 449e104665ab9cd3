//! Shared wire types for the Harvester client/daemon protocol.
//!
//! The daemon and every client process link this crate so that the key
//! layout, job and event payloads, and namespace derivation stay in lockstep
//! across processes sharing one cache server.

pub mod event;
pub mod job;
pub mod keys;
pub mod settings;

pub use event::{Event, EventKind, TableId};
pub use job::{Job, JobRequest};
pub use keys::{Namespace, QueueName};
pub use settings::SettingsSnapshot;
