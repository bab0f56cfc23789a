pub mod algorithms;
pub mod config;
pub mod dom;
pub mod error;
pub mod identity;
pub mod signature;
pub mod signer;
pub mod telemetry;

pub use config::SignerConfig;
pub use error::{Error, Result};
pub use identity::{OpenSslIdentity, SigningIdentity};
pub use signature::SignOptions;
pub use signer::XmlSigner;
