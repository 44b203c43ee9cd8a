//! Offline route tile storage and progressive loading.
//!
//! The planner decides what to persist for a route under a byte budget, the
//! store deduplicates and compresses the tiles it writes, and the loader
//! serves them back progressively while the user travels.

pub mod cli;
pub mod geo;
pub mod loader;
pub mod planner;
pub mod route;
pub mod store;
