use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while building a signed document. Every variant is
/// terminal for the current `sign` call; no partially built document is
/// ever returned.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported algorithm <{0}>")]
    UnsupportedAlgorithm(String),

    #[error("unsupported signature type <{0}>")]
    UnsupportedSignatureType(String),

    #[error("unknown or bad timezone <{0}>")]
    InvalidTimeZone(String),

    #[error("malformed payload XML: {0}")]
    MalformedPayload(String),

    #[error("key loading error: {0}")]
    KeyLoad(String),

    #[error("certificate parsing error: {0}")]
    CertificateParse(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("verification error: {0}")]
    Verification(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
