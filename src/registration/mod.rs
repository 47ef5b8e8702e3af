/// Registration pipeline
///
/// Turns a decoded QR payload into a pending registration and advances it
/// through email verification and password setup. The scan decision and
/// both verification steps are the correctness core of the service.

mod machine;
mod verify;

pub use machine::{IssuedCode, RegistrationMachine, ScanOutcome};
pub use verify::VerificationPipeline;

use serde::Serialize;

/// What the client should do next, carried on registration responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    VerifyEmail,
    SetPassword,
    Login,
}
