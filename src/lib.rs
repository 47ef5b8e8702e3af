/// Crewgate - workforce identity and session service
///
/// Employees register by scanning an employer-issued QR code, verify their
/// email with a short-lived code, set a mobile password, and then log in
/// with full credentials or device-bound quick login.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod mailer;
pub mod metrics;
pub mod password;
pub mod qr;
pub mod rate_limit;
pub mod recovery;
pub mod registration;
pub mod server;
pub mod session;
pub mod token;
