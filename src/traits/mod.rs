//! Trait definitions for hardware abstraction.
//!
//! This module defines the core abstractions that allow rs-washcycle to:
//! - Run on different hardware (board GPIO bindings, desktop mock)
//! - Accept emergency stops from a physical button as well as the network
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`HardwarePort`]: Digital output, digital input and PWM duty by channel
//! - [`StopButton`]: Edge-detected physical stop input

pub mod hardware;

pub use hardware::*;
