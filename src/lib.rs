//! Qistflow Installment Tracking Service Library
//!
//! This library provides the installment-plan payment and redistribution
//! engine behind the qistflow installment-sales tracking service.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

// Re-export commonly used types
pub use modules::plans;
