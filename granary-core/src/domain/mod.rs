//! Core domain types
//!
//! This module contains the core domain structures used across Granary
//! services. These types represent the fundamental business entities and are
//! shared between the broker (for persistence and assignment) and the
//! scheduler (for planning).

pub mod event;
pub mod job;
pub mod package;
pub mod suite;
pub mod worker;
