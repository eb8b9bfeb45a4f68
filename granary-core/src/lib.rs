//! Granary Core
//!
//! Core types and abstractions for the Granary archive automation suite.
//!
//! This crate contains:
//! - Domain types: Core business entities (Job, Worker, SignedEvent, etc.)
//! - DTOs: Data transfer objects for the broker wire protocol
//! - Signing: Ed25519 signatures over canonical JSON, key files, trust stores
//! - Archive helpers: Debian version ordering and architecture matching

pub mod arch;
pub mod domain;
pub mod dto;
pub mod signing;
pub mod version;
