//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area.
//! Routers are assembled by [`crate::app`].

pub mod controls;
pub mod engagements;
pub mod evaluate;
pub mod matrices;
pub mod testing;
