//! Harvester daemon and client loops.
//!
//! The daemon scans folders and uploads files in the background; clients are
//! GUI processes that observe progress and issue commands. The two never talk
//! directly: everything flows through the shared cache bus provided by
//! `harvester_bus`. This crate owns the two poll loops and the seams to the
//! outside world (the scan/upload subsystem and the UI thread).

pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;

pub use client::{Client, ClientConfig, Notice, UiUpdate};
pub use daemon::{
    Daemon, DaemonConfig, EventSink, NullPass, RefreshHandler, ScanUploadPass, ThreadedRefresh,
};
