use std::collections::HashMap;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};

use crate::algorithms::uri;
use crate::error::Result;

/// Algorithm choices applied to every signature produced with them. Each
/// field holds a W3C algorithm URI; validation against the allow-list
/// happens when a signature is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    pub canonicalization_method: String,
    pub digest_method: String,
    pub signature_method: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            canonicalization_method: uri::C14N.to_string(),
            digest_method: uri::SHA256.to_string(),
            signature_method: uri::RSA_SHA256.to_string(),
        }
    }
}

impl SignerConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = ConfigLib::builder()
            .set_default("canonicalization_method", uri::C14N)?
            .set_default("digest_method", uri::SHA256)?
            .set_default("signature_method", uri::RSA_SHA256)?
            .add_source(File::with_name("config/signer").required(false));

        // If env_vars is provided, we use it instead of system environment
        // to avoid variable pollution across tests.
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format XMLSIG_DIGEST_METHOD
            builder = builder.add_source(Environment::with_prefix("XMLSIG").prefix_separator("_"));
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}
