//! Vessel arrival tracking for the Hamburg container terminals.
//!
//! Scrapes the EUROGATE and HHLA sailing lists, reconciles vessels seen by
//! both, exports a consolidated schedule, syncs it to Postgres and mails
//! watchers when a vessel's ETA changes.

pub mod config;
pub mod database;
pub mod detector;
pub mod email;
pub mod errors;
pub mod export;
pub mod fetch;
pub mod html;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod snapshot;
pub mod terminals;
pub mod timestamps;
