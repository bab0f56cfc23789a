//! Signature construction engine.
//!
//! The pipeline is shared between both signature profiles; XAdES-BES adds
//! its qualifying-properties subtree through a hook invoked right before
//! key info is embedded, so the extra reference is already part of
//! `SignedInfo` when the signature value is computed.

pub mod builder;
pub mod xades;

pub use builder::SignatureBuilder;

use chrono::{DateTime, FixedOffset};

/// The signature profile being produced, with its profile-specific inputs
/// resolved up front.
#[derive(Debug, Clone)]
pub enum SignatureProfile {
    XmlDsig,
    XadesBes { signing_time: DateTime<FixedOffset> },
}

/// Caller-settable options forwarded through the facade.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// IANA zone name for the XAdES signing time, e.g. `Europe/Madrid`.
    /// Ignored by plain XMLDSig signatures.
    pub timezone: Option<String>,

    /// Overrides the wall-clock signing time. Intended for deterministic
    /// tests; leave unset in production use.
    pub signing_time: Option<DateTime<FixedOffset>>,
}
