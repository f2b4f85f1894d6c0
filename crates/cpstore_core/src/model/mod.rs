//! Documents persisted by the store.
//!
//! # Responsibility
//! - Define the JSON shape of every record kind.
//! - Carry the version token read from the store alongside each document.
//!
//! # Invariants
//! - Ids and partition keys are lowercase once written.
//! - Display fields such as resource ids keep the caller's casing.

pub mod document;
pub mod operation;
pub mod resource;
pub mod resource_id;
pub mod subscription;
