//! Domain entities for the PDV relay gateway.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: nothing in here opens a socket, spawns a task, or reads a
//! file.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of a clean architecture holds the concepts that make
//! the system what it is.  For this gateway those are:
//!
//! - A **device** (PDV) with a listen endpoint and a downstream DVR target.
//! - A **telegram** and the rules that classify it as the start of a sale,
//!   the end of a sale, or in-sale activity.
//! - A **quality preset** describing how aggressively a video relay shrinks
//!   its frames.
//!
//! Outer layers (application, infrastructure) depend on these types, never
//! the other way round.

/// Device configuration and the static device registry.
pub mod device;

/// Named video quality presets.
pub mod quality;

/// Heuristic telegram classification.
pub mod telegram;
