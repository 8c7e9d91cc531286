//! # secretops
//!
//! Secret lifecycle core for the trading backend. Credentials live in an
//! external vault; this crate caches them in-process, tracks lifecycle
//! metadata, validates rotations and applies time-boxed break-glass
//! overrides, and exposes an operator HTTP surface over all of it.
//!
//! ```text
//! HTTP API ─→ SecretManager / RotationCoordinator / BreakGlassManager / StatusAggregator
//!                    ↓                   ↓
//!               SecretCache ──→ VaultClient      MetadataStore ←── RotationMonitor
//!                    ↓
//!                AlertSink
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
