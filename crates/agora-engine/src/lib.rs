//! Core engine for a sustainability-challenge marketplace: enrollment
//! decisions, payment settlement, sponsorship quota accounting, impact
//! validation, and creator nudges.
//!
//! The engine owns the invariants (one enrollment per member per program,
//! budgets that never overrun, exact revenue splits) and exposes axum routers
//! for the service shell in `services/api`. Persistence is abstracted behind
//! per-workflow store traits so the logic can be exercised against in-memory
//! doubles.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
