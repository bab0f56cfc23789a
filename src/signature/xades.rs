//! XAdES-BES qualifying properties.
//!
//! Inserted through the builder hook between the payload reference and
//! key-info stages: the `SignedProperties` subtree and its reference must
//! both exist in `SignedInfo` before the signature value is computed.

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use tracing::debug;

use super::SignOptions;
use super::builder::{DocumentParts, SignatureBuilder};
use crate::algorithms::uri;
use crate::dom::NodeId;
use crate::error::{Error, Result};

/// Zone used for the signing time when the caller sets none.
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";

const SIGNING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Resolve the XAdES signing time from the caller options: an explicit
/// override wins, otherwise the current time in the requested zone.
pub fn resolve_signing_time(options: &SignOptions) -> Result<DateTime<FixedOffset>> {
    if let Some(time) = options.signing_time {
        return Ok(time);
    }
    let name = options.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
    let zone: Tz = name
        .parse()
        .map_err(|_| Error::InvalidTimeZone(name.to_string()))?;
    Ok(Utc::now().with_timezone(&zone).fixed_offset())
}

/// Append `ds:Object/xades:QualifyingProperties/xades:SignedProperties`
/// under `Signature` and reference the signed properties from
/// `SignedInfo`.
pub(crate) fn add_qualifying_properties(
    builder: &SignatureBuilder<'_>,
    parts: &mut DocumentParts,
    signing_time: DateTime<FixedOffset>,
) -> Result<()> {
    let ds = Some(uri::XMLDSIG_NS);
    let xades = Some(uri::XADES_NS);
    let signature_id = parts.signature_id.clone();

    let object = parts.doc.add_node(parts.signature, ds, "ds:Object", None, &[])?;
    let qualifying_properties = parts.doc.add_node(
        object,
        xades,
        "xades:QualifyingProperties",
        None,
        &[
            ("Id", &format!("{signature_id}-QualifyingProperties")),
            ("Target", &format!("#{signature_id}-Signature")),
        ],
    )?;
    parts
        .doc
        .declare_namespace(qualifying_properties, "ds", uri::XMLDSIG_NS)?;

    let signed_properties = parts.doc.add_node(
        qualifying_properties,
        xades,
        "xades:SignedProperties",
        None,
        &[("Id", &format!("{signature_id}-SignedProperties"))],
    )?;

    add_signed_signature_properties(builder, parts, signed_properties, signing_time)?;
    add_signed_data_object_properties(parts, signed_properties)?;

    let reference_uri = format!("#{signature_id}-SignedProperties");
    builder.add_reference(
        parts,
        signed_properties,
        &[
            ("Type", uri::XADES_SIGNED_PROPERTIES),
            ("URI", reference_uri.as_str()),
        ],
        None,
    )?;
    debug!(%signature_id, "qualifying properties added");
    Ok(())
}

/// Signing time, signer certificate digest and issuer/serial.
fn add_signed_signature_properties(
    builder: &SignatureBuilder<'_>,
    parts: &mut DocumentParts,
    signed_properties: NodeId,
    signing_time: DateTime<FixedOffset>,
) -> Result<()> {
    let ds = Some(uri::XMLDSIG_NS);
    let xades = Some(uri::XADES_NS);

    let signed_signature_properties = parts.doc.add_node(
        signed_properties,
        xades,
        "xades:SignedSignatureProperties",
        None,
        &[],
    )?;
    parts.doc.add_node(
        signed_signature_properties,
        xades,
        "xades:SigningTime",
        Some(&signing_time.format(SIGNING_TIME_FORMAT).to_string()),
        &[],
    )?;

    let signing_certificate = parts.doc.add_node(
        signed_signature_properties,
        xades,
        "xades:SigningCertificate",
        None,
        &[],
    )?;
    let cert = parts.doc.add_node(signing_certificate, xades, "xades:Cert", None, &[])?;

    let cert_digest = parts.doc.add_node(cert, xades, "xades:CertDigest", None, &[])?;
    parts.doc.add_node(
        cert_digest,
        ds,
        "ds:DigestMethod",
        None,
        &[("Algorithm", builder.digest_method.uri())],
    )?;
    let fingerprint = builder.identity.digest_certificate(builder.digest_method)?;
    parts
        .doc
        .add_node(cert_digest, ds, "ds:DigestValue", Some(&fingerprint), &[])?;

    let issuer_serial = parts.doc.add_node(cert, xades, "xades:IssuerSerial", None, &[])?;
    parts.doc.add_node(
        issuer_serial,
        ds,
        "ds:X509IssuerName",
        Some(builder.identity.issuer_name()),
        &[],
    )?;
    parts.doc.add_node(
        issuer_serial,
        ds,
        "ds:X509SerialNumber",
        Some(builder.identity.serial_number()),
        &[],
    )?;
    Ok(())
}

/// Format descriptor binding the payload reference to its object type
/// and MIME type.
fn add_signed_data_object_properties(
    parts: &mut DocumentParts,
    signed_properties: NodeId,
) -> Result<()> {
    let xades = Some(uri::XADES_NS);

    let signed_data_object_properties = parts.doc.add_node(
        signed_properties,
        xades,
        "xades:SignedDataObjectProperties",
        None,
        &[],
    )?;
    let object_reference = format!("#{}", parts.payload_reference_id);
    let data_object_format = parts.doc.add_node(
        signed_data_object_properties,
        xades,
        "xades:DataObjectFormat",
        None,
        &[("ObjectReference", object_reference.as_str())],
    )?;
    parts
        .doc
        .add_node(data_object_format, xades, "xades:Description", None, &[])?;

    let object_identifier = parts.doc.add_node(
        data_object_format,
        xades,
        "xades:ObjectIdentifier",
        None,
        &[],
    )?;
    parts.doc.add_node(
        object_identifier,
        xades,
        "xades:Identifier",
        Some(uri::XADES_OBJECT_IDENTIFIER),
        &[("Qualifier", "OIDAsURN")],
    )?;
    parts
        .doc
        .add_node(object_identifier, xades, "xades:Description", None, &[])?;

    parts.doc.add_node(
        data_object_format,
        xades,
        "xades:MimeType",
        Some("text/xml"),
        &[],
    )?;
    parts
        .doc
        .add_node(data_object_format, xades, "xades:Encoding", None, &[])?;
    Ok(())
}
