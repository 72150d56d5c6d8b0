//! Unified pad input acquisition: discrete button edges from a raw event
//! device plus a deadzoned (throttle, steering) pair from a joystick backend.

pub mod config;
pub mod controller;
