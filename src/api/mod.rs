//! # HTTP API
//!
//! Operator and service endpoints over the secret lifecycle:
//!
//! | Method | Path | Scope |
//! |---|---|---|
//! | GET | `/ops/secrets/status` | `secrets:status:read` |
//! | POST | `/ops/secrets/break-glass` | `secrets:break-glass` |
//! | DELETE | `/ops/secrets/break-glass/{secretType}` | `secrets:break-glass` |
//! | POST | `/ops/secrets/rotation-preview` | `secrets:rotate` |
//! | POST | `/internal/secrets/cache/refresh` | `secrets:cache-admin` |

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use auth::{AuthContext, AuthError, TokenAuthenticator};
pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
