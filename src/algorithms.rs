//! Algorithm identifiers for XML signature construction.
//!
//! Callers pass algorithms around as W3C/ETSI URI strings; each typed enum
//! validates a URI against the fixed allow-list and fails with
//! [`Error::UnsupportedAlgorithm`] (or [`Error::UnsupportedSignatureType`])
//! for anything else.

use crate::error::{Error, Result};

/// Canonical URI strings that appear in `Algorithm` attributes and as
/// signature-type selectors.
pub mod uri {
    // Signature methods
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
    pub const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";

    // Digest methods
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
    pub const SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
    pub const SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

    // Canonicalization methods
    pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
    pub const C14N_WITH_COMMENTS: &str =
        "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";

    // Namespaces, doubling as signature-type selectors
    pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
    pub const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

    // Reference type markers
    pub const XMLDSIG_OBJECT: &str = "http://www.w3.org/2000/09/xmldsig#Object";
    pub const XADES_SIGNED_PROPERTIES: &str = "http://uri.etsi.org/01903#SignedProperties";

    // XAdES DataObjectFormat object-type identifier
    pub const XADES_OBJECT_IDENTIFIER: &str = "urn:oid:1.2.840.10003.5.109.10";
}

/// The four admissible canonicalization methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalizationMethod {
    Inclusive,
    InclusiveWithComments,
    Exclusive,
    ExclusiveWithComments,
}

impl CanonicalizationMethod {
    pub fn from_uri(s: &str) -> Result<Self> {
        match s {
            uri::C14N => Ok(Self::Inclusive),
            uri::C14N_WITH_COMMENTS => Ok(Self::InclusiveWithComments),
            uri::EXC_C14N => Ok(Self::Exclusive),
            uri::EXC_C14N_WITH_COMMENTS => Ok(Self::ExclusiveWithComments),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => uri::C14N,
            Self::InclusiveWithComments => uri::C14N_WITH_COMMENTS,
            Self::Exclusive => uri::EXC_C14N,
            Self::ExclusiveWithComments => uri::EXC_C14N_WITH_COMMENTS,
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }
}

/// Digest methods accepted for references and certificate fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestMethod {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestMethod {
    pub fn from_uri(s: &str) -> Result<Self> {
        match s {
            uri::SHA1 => Ok(Self::Sha1),
            uri::SHA256 => Ok(Self::Sha256),
            uri::SHA384 => Ok(Self::Sha384),
            uri::SHA512 => Ok(Self::Sha512),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => uri::SHA1,
            Self::Sha256 => uri::SHA256,
            Self::Sha384 => uri::SHA384,
            Self::Sha512 => uri::SHA512,
        }
    }
}

/// RSA signature methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMethod {
    RsaSha1,
    RsaSha256,
    RsaSha384,
    RsaSha512,
}

impl SignatureMethod {
    pub fn from_uri(s: &str) -> Result<Self> {
        match s {
            uri::RSA_SHA1 => Ok(Self::RsaSha1),
            uri::RSA_SHA256 => Ok(Self::RsaSha256),
            uri::RSA_SHA384 => Ok(Self::RsaSha384),
            uri::RSA_SHA512 => Ok(Self::RsaSha512),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => uri::RSA_SHA1,
            Self::RsaSha256 => uri::RSA_SHA256,
            Self::RsaSha384 => uri::RSA_SHA384,
            Self::RsaSha512 => uri::RSA_SHA512,
        }
    }

    /// The digest that this signature method applies to its input.
    pub fn digest(&self) -> DigestMethod {
        match self {
            Self::RsaSha1 => DigestMethod::Sha1,
            Self::RsaSha256 => DigestMethod::Sha256,
            Self::RsaSha384 => DigestMethod::Sha384,
            Self::RsaSha512 => DigestMethod::Sha512,
        }
    }
}

/// Top-level signature variants, selected by namespace URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    XmlDsig,
    XadesBes,
}

impl SignatureKind {
    pub fn from_uri(s: &str) -> Result<Self> {
        match s {
            uri::XMLDSIG_NS => Ok(Self::XmlDsig),
            uri::XADES_NS => Ok(Self::XadesBes),
            other => Err(Error::UnsupportedSignatureType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalization_allow_list() {
        assert_eq!(
            CanonicalizationMethod::from_uri(uri::C14N).unwrap(),
            CanonicalizationMethod::Inclusive
        );
        assert_eq!(
            CanonicalizationMethod::from_uri(uri::EXC_C14N_WITH_COMMENTS).unwrap(),
            CanonicalizationMethod::ExclusiveWithComments
        );
        assert!(matches!(
            CanonicalizationMethod::from_uri("not-a-real-alg"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_digest_allow_list() {
        for u in [uri::SHA1, uri::SHA256, uri::SHA384, uri::SHA512] {
            let alg = DigestMethod::from_uri(u).unwrap();
            assert_eq!(alg.uri(), u);
        }
        assert!(DigestMethod::from_uri(uri::RSA_SHA256).is_err());
    }

    #[test]
    fn test_signature_method_digest_pairing() {
        assert_eq!(SignatureMethod::RsaSha1.digest(), DigestMethod::Sha1);
        assert_eq!(SignatureMethod::RsaSha512.digest(), DigestMethod::Sha512);
    }

    #[test]
    fn test_signature_kind_selection() {
        assert_eq!(
            SignatureKind::from_uri(uri::XMLDSIG_NS).unwrap(),
            SignatureKind::XmlDsig
        );
        assert_eq!(
            SignatureKind::from_uri(uri::XADES_NS).unwrap(),
            SignatureKind::XadesBes
        );
        assert!(matches!(
            SignatureKind::from_uri("urn:something-else"),
            Err(Error::UnsupportedSignatureType(_))
        ));
    }
}
