#![doc = "roadmap-sync-core: core logic library for roadmap-sync."]

//! This crate contains the scanning, change detection and reconciliation logic
//! for roadmap-sync. It holds no network code: the remote board is reached only
//! through the [`contract::RecordStore`] trait.
//!
//! # Usage
//! Scan with [`scan::scan`], load state with [`mapping::MappingStore`], then
//! call [`synchronise::synchronise`] with a store implementation and save the
//! state again.

pub mod config;
pub mod contract;
pub mod extract;
pub mod fingerprint;
pub mod mapping;
pub mod plan;
pub mod scan;
pub mod synchronise;
