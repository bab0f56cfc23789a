//! Entry point for producing signed documents.

use tracing::info;

use crate::algorithms::{
    CanonicalizationMethod, DigestMethod, SignatureKind, SignatureMethod,
};
use crate::config::SignerConfig;
use crate::error::Result;
use crate::identity::SigningIdentity;
use crate::signature::{SignOptions, SignatureBuilder, SignatureProfile, xades};

/// Facade selecting the signature profile and applying the configured
/// algorithm choices. The configuration is immutable; build a new signer
/// to change it.
#[derive(Debug, Clone, Default)]
pub struct XmlSigner {
    config: SignerConfig,
}

impl XmlSigner {
    pub fn new(config: SignerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Produce a signed document embedding `payload`.
    ///
    /// `signature_type` is the namespace URI of the requested variant
    /// (XMLDSig or XAdES). Every algorithm identifier and the timezone are
    /// validated before the payload is parsed or any node is created.
    pub fn sign(
        &self,
        payload: &str,
        signature_type: &str,
        identity: &dyn SigningIdentity,
        options: &SignOptions,
    ) -> Result<String> {
        let kind = SignatureKind::from_uri(signature_type)?;
        let canonicalization =
            CanonicalizationMethod::from_uri(&self.config.canonicalization_method)?;
        let digest_method = DigestMethod::from_uri(&self.config.digest_method)?;
        let signature_method = SignatureMethod::from_uri(&self.config.signature_method)?;

        let profile = match kind {
            SignatureKind::XmlDsig => SignatureProfile::XmlDsig,
            SignatureKind::XadesBes => SignatureProfile::XadesBes {
                signing_time: xades::resolve_signing_time(options)?,
            },
        };

        info!(
            ?kind,
            canonicalization = canonicalization.uri(),
            digest = digest_method.uri(),
            signature = signature_method.uri(),
            "creating signature"
        );
        SignatureBuilder::new(
            identity,
            canonicalization,
            signature_method,
            digest_method,
            profile,
        )
        .build(payload)
    }
}
