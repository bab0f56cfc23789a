//! Signing identity providers.
//!
//! A [`SigningIdentity`] supplies everything the signature builders need
//! from the signer: pre-parsed certificate and key material plus the
//! digest/sign/verify primitives. Implementations are read-only after
//! construction, so one identity can serve concurrent `sign` calls.

pub mod cert_utils;
mod openssl;

pub use self::openssl::OpenSslIdentity;

use crate::algorithms::{DigestMethod, SignatureMethod};
use crate::error::Result;

/// Capability set of a signing identity. One implementation per
/// key-store format; every certificate-derived field is pre-parsed.
pub trait SigningIdentity {
    /// Base64 DER of the signer certificate, without PEM delimiters.
    fn certificate_b64(&self) -> &str;

    /// Base64 of the RSA modulus, raw big-endian bytes.
    fn modulus_b64(&self) -> &str;

    /// Base64 of the RSA public exponent, raw big-endian bytes.
    fn exponent_b64(&self) -> &str;

    /// Issuer distinguished name as `K=V, K=V, …` in certificate order.
    fn issuer_name(&self) -> &str;

    /// Certificate serial number, decimal.
    fn serial_number(&self) -> &str;

    /// Base64 certificate fingerprint under the given digest method.
    fn digest_certificate(&self, alg: DigestMethod) -> Result<String>;

    /// Base64 digest of arbitrary data.
    fn digest(&self, data: &[u8], alg: DigestMethod) -> Result<String>;

    /// Base64 RSA signature over `data`.
    fn sign(&self, data: &[u8], alg: SignatureMethod) -> Result<String>;

    /// Verify a base64 signature against `data` with this identity's
    /// certificate key. `Ok(false)` means a well-formed but wrong
    /// signature; indeterminate results fail with
    /// [`Error::Verification`](crate::error::Error::Verification).
    fn verify(&self, data: &[u8], signature_b64: &str, alg: SignatureMethod) -> Result<bool>;
}
