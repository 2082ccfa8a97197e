//! picklist-core library.
//!
//! List-field value binding for work-item trackers: the bind value store,
//! changeset value resolution, workflow transition checks, the changeset
//! value writer and the history diff formatter.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at module seams; `anyhow::Result`
//!   for configuration and database bootstrap.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod bind;
pub mod config;
pub mod context;
pub mod db;
pub mod diff;
pub mod error;
pub mod model;
pub mod repo;
pub mod resolve;
pub mod update;
pub mod validate;
pub mod workflow;
pub mod writer;
