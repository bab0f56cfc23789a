//! OpenSSL-backed signing identity.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::hash::{Hasher, MessageDigest};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;
use std::fs;
use tracing::info;

use crate::algorithms::{DigestMethod, SignatureMethod};
use crate::error::{Error, Result};
use crate::identity::SigningIdentity;

impl From<DigestMethod> for MessageDigest {
    fn from(alg: DigestMethod) -> Self {
        match alg {
            DigestMethod::Sha1 => MessageDigest::sha1(),
            DigestMethod::Sha256 => MessageDigest::sha256(),
            DigestMethod::Sha384 => MessageDigest::sha384(),
            DigestMethod::Sha512 => MessageDigest::sha512(),
        }
    }
}

/// Signing identity backed by an OpenSSL RSA private key and X.509
/// certificate. All certificate-derived fields are computed once at
/// construction; the struct is read-only afterwards.
pub struct OpenSslIdentity {
    pkey: PKey<Private>,
    cert: X509,
    certificate_b64: String,
    modulus_b64: String,
    exponent_b64: String,
    issuer_name: String,
    serial_number: String,
}

impl OpenSslIdentity {
    /// Build an identity from PEM-encoded private key and certificate.
    pub fn from_pem(key_pem: &[u8], cert_pem: &[u8], passphrase: Option<&str>) -> Result<Self> {
        let pkey = match passphrase {
            Some(pass) => PKey::private_key_from_pem_passphrase(key_pem, pass.as_bytes()),
            None => PKey::private_key_from_pem(key_pem),
        }
        .map_err(|e| Error::KeyLoad(e.to_string()))?;
        let cert = X509::from_pem(cert_pem).map_err(|e| Error::CertificateParse(e.to_string()))?;
        Self::from_parts(pkey, cert)
    }

    /// Build an identity from PEM files on disk.
    pub fn from_pem_files(
        key_path: &str,
        cert_path: &str,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        info!("loading signing identity: key={key_path}, cert={cert_path}");
        let key_pem = fs::read(key_path)
            .map_err(|e| Error::KeyLoad(format!("failed to read {key_path}: {e}")))?;
        let cert_pem = fs::read(cert_path)
            .map_err(|e| Error::CertificateParse(format!("failed to read {cert_path}: {e}")))?;
        Self::from_pem(&key_pem, &cert_pem, passphrase)
    }

    /// Build an identity from a DER-encoded PKCS#12 store.
    pub fn from_pkcs12(der: &[u8], passphrase: &str) -> Result<Self> {
        let store = Pkcs12::from_der(der).map_err(|e| Error::KeyLoad(e.to_string()))?;
        let parsed = store
            .parse2(passphrase)
            .map_err(|e| Error::KeyLoad(format!("unable to read the cert store: {e}")))?;
        let pkey = parsed
            .pkey
            .ok_or_else(|| Error::KeyLoad("PKCS#12 store holds no private key".to_string()))?;
        let cert = parsed.cert.ok_or_else(|| {
            Error::CertificateParse("PKCS#12 store holds no certificate".to_string())
        })?;
        Self::from_parts(pkey, cert)
    }

    fn from_parts(pkey: PKey<Private>, cert: X509) -> Result<Self> {
        let cert_der = cert
            .to_der()
            .map_err(|e| Error::CertificateParse(e.to_string()))?;
        let certificate_b64 = BASE64.encode(cert_der);

        let rsa = pkey
            .rsa()
            .map_err(|_| Error::KeyLoad("not an RSA private key".to_string()))?;
        let modulus_b64 = BASE64.encode(rsa.n().to_vec());
        let exponent_b64 = BASE64.encode(rsa.e().to_vec());

        let issuer_name = issuer_string(&cert)?;
        let serial_number = cert
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_dec_str())
            .map_err(|e| Error::CertificateParse(e.to_string()))?
            .to_string();

        info!(issuer = %issuer_name, serial = %serial_number, "signing identity ready");
        Ok(Self {
            pkey,
            cert,
            certificate_b64,
            modulus_b64,
            exponent_b64,
            issuer_name,
            serial_number,
        })
    }
}

fn issuer_string(cert: &X509) -> Result<String> {
    let mut parts = Vec::new();
    for entry in cert.issuer_name().entries() {
        let key = entry
            .object()
            .nid()
            .short_name()
            .map_err(|e| Error::CertificateParse(e.to_string()))?;
        let value = entry
            .data()
            .as_utf8()
            .map_err(|e| Error::CertificateParse(e.to_string()))?;
        parts.push(format!("{key}={value}"));
    }
    Ok(parts.join(", "))
}

impl SigningIdentity for OpenSslIdentity {
    fn certificate_b64(&self) -> &str {
        &self.certificate_b64
    }

    fn modulus_b64(&self) -> &str {
        &self.modulus_b64
    }

    fn exponent_b64(&self) -> &str {
        &self.exponent_b64
    }

    fn issuer_name(&self) -> &str {
        &self.issuer_name
    }

    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn digest_certificate(&self, alg: DigestMethod) -> Result<String> {
        let fingerprint = self
            .cert
            .digest(alg.into())
            .map_err(|e| Error::CertificateParse(e.to_string()))?;
        Ok(BASE64.encode(&fingerprint))
    }

    fn digest(&self, data: &[u8], alg: DigestMethod) -> Result<String> {
        let mut hasher = Hasher::new(alg.into()).map_err(|e| Error::Signing(e.to_string()))?;
        hasher
            .update(data)
            .map_err(|e| Error::Signing(e.to_string()))?;
        let digest = hasher.finish().map_err(|e| Error::Signing(e.to_string()))?;
        Ok(BASE64.encode(&digest))
    }

    fn sign(&self, data: &[u8], alg: SignatureMethod) -> Result<String> {
        let md: MessageDigest = alg.digest().into();
        let mut signer =
            Signer::new(md, &self.pkey).map_err(|e| Error::Signing(e.to_string()))?;
        let signature = signer
            .sign_oneshot_to_vec(data)
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(BASE64.encode(&signature))
    }

    fn verify(&self, data: &[u8], signature_b64: &str, alg: SignatureMethod) -> Result<bool> {
        let signature = BASE64
            .decode(signature_b64)
            .map_err(|e| Error::Verification(e.to_string()))?;
        let public_key = self
            .cert
            .public_key()
            .map_err(|e| Error::Verification(e.to_string()))?;
        let md: MessageDigest = alg.digest().into();
        let mut verifier =
            Verifier::new(md, &public_key).map_err(|e| Error::Verification(e.to_string()))?;
        verifier
            .verify_oneshot(&signature, data)
            .map_err(|e| Error::Verification(e.to_string()))
    }
}
