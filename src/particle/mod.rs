//! Particle Cloud API client.
//!
//! - [`auth`]: refresh-token exchange for a short-lived access token
//! - [`api`]: authenticated variable reads from devices

pub mod api;
pub mod auth;

pub use api::{FetchError, ParticleClient};
pub use auth::{get_access_token, AccessToken, AuthError};
