//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Switch, controller and pool produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Recording is always safe: without an installed exporter the
//!   metrics macros are no-ops
//! - Labels are backend names and static reason strings only

pub mod logging;
pub mod metrics;
