// Device and runtime configuration
pub mod config;

// Shared HTTP client construction
pub mod http;

// Particle Cloud API (token exchange, variable reads)
pub mod particle;

// Metric points and backend sinks
pub mod metrics;

// Polling run: config → token → poll → forward
pub mod poller;
