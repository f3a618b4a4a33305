//! Foundation module - Core utilities and types
//!
//! - Math types used by the renderer
//! - Logging setup

pub mod logging;
pub mod math;
