// Aggregates page classification, form extraction, and per-challenge handlers for the login flow.

pub mod core;
pub mod detectors;
pub mod handlers;
