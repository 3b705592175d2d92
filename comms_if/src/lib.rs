//! # Communications interface crate.
//!
//! Provides the interface to the CANopen daemon (`canopend`) which owns the exoskeleton's CAN
//! bus: typed commands and responses, and the socket link used to exchange them.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command and response definitions for equipment (joints and buttons)
pub mod eqpt;

/// Link to the CANopen daemon
pub mod net;
