//! Workspace facade crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-metadata`, `core-playback`).
//! Host applications can depend on `scrobbler-workspace` and enable the
//! documented features without needing to wire each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_metadata as metadata;
#[cfg(feature = "desktop-shims")]
pub use core_playback as playback;
#[cfg(feature = "desktop-shims")]
pub use core_service as service;
