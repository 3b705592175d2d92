//! Utility library for the exoskeleton control software

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod archive;
pub mod host;
#[macro_use]
pub mod logger;
pub mod params;
pub mod poll;
pub mod session;
pub mod time;
