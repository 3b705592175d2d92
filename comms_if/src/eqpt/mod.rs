//! # Equipment Interface
//!
//! This module defines the commands sent to, and responses received from, the equipment on the
//! CAN bus.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

/// Generic CANopen daemon commands and responses.
pub mod co;

/// Exoskeleton joints and the commands which drive them.
pub mod joint;
