//! XMLDSig signature assembly.
//!
//! `SignatureBuilder` runs a strictly sequential pipeline over a fresh
//! tree: wrap the payload, append the signature skeleton, record the
//! method algorithms, digest the payload reference, embed key info and
//! finally sign the canonicalized `SignedInfo`. Nothing branches back; a
//! failure at any stage aborts the whole call.

use tracing::{debug, info};

use super::{SignatureProfile, xades};
use crate::algorithms::{CanonicalizationMethod, DigestMethod, SignatureMethod, uri};
use crate::dom::{self, Document, NodeId, c14n};
use crate::error::Result;
use crate::identity::SigningIdentity;

const ROOT_ELEMENT: &str = "SignedDocument";
const CONTENT_ELEMENT: &str = "Content";
const CONTENT_MIME_TYPE: &str = "text/xml";

/// Builds one signed document per [`build`](SignatureBuilder::build) call.
pub struct SignatureBuilder<'a> {
    pub(crate) identity: &'a dyn SigningIdentity,
    pub(crate) canonicalization: CanonicalizationMethod,
    pub(crate) signature_method: SignatureMethod,
    pub(crate) digest_method: DigestMethod,
    pub(crate) profile: SignatureProfile,
}

/// Typed handles into the tree under construction, carried between
/// pipeline stages instead of re-running name lookups.
pub(crate) struct DocumentParts {
    pub(crate) doc: Document,
    pub(crate) content: NodeId,
    pub(crate) content_id: String,
    pub(crate) signature: NodeId,
    pub(crate) signature_id: String,
    pub(crate) signed_info: NodeId,
    pub(crate) signature_value: NodeId,
    pub(crate) key_info: NodeId,
    pub(crate) payload_reference_id: String,
}

impl<'a> SignatureBuilder<'a> {
    pub fn new(
        identity: &'a dyn SigningIdentity,
        canonicalization: CanonicalizationMethod,
        signature_method: SignatureMethod,
        digest_method: DigestMethod,
        profile: SignatureProfile,
    ) -> Self {
        Self {
            identity,
            canonicalization,
            signature_method,
            digest_method,
            profile,
        }
    }

    /// Run the whole pipeline and return the serialized signed document.
    pub fn build(&self, payload: &str) -> Result<String> {
        let mut parts = self.init_envelope(payload)?;
        self.init_signature_skeleton(&mut parts)?;
        self.add_methods(&mut parts)?;
        self.add_payload_reference(&mut parts)?;
        if let SignatureProfile::XadesBes { signing_time } = self.profile {
            xades::add_qualifying_properties(self, &mut parts, signing_time)?;
        }
        self.add_key_info(&mut parts)?;
        self.add_signature_value(&mut parts)?;
        info!(signature_id = %parts.signature_id, "signed document assembled");
        Ok(parts.doc.to_xml_string())
    }

    /// Wrap the parsed payload in the envelope root and `Content` node.
    fn init_envelope(&self, payload: &str) -> Result<DocumentParts> {
        let payload_doc = Document::parse(payload)?;

        let mut doc = Document::with_root(None, ROOT_ELEMENT);
        let root = doc.root();
        let content = doc.add_node(root, None, CONTENT_ELEMENT, None, &[])?;
        doc.import(&payload_doc, payload_doc.root(), content)?;

        let document_id = dom::generate_id(Some(ROOT_ELEMENT));
        doc.add_attribute(root, &[("Id", &document_id)])?;
        let content_id = dom::generate_id(Some(CONTENT_ELEMENT));
        doc.add_attribute(content, &[("Id", &content_id)])?;
        doc.add_attribute(content, &[("MimeType", CONTENT_MIME_TYPE)])?;

        debug!(%content_id, "payload wrapped");
        Ok(DocumentParts {
            doc,
            content,
            content_id,
            // Placeholders overwritten by the skeleton stage.
            signature: root,
            signature_id: String::new(),
            signed_info: root,
            signature_value: root,
            key_info: root,
            payload_reference_id: String::new(),
        })
    }

    /// Append `Signature` with its empty `SignedInfo`, `SignatureValue`
    /// and `KeyInfo` placeholders, ids derived from the signature id.
    fn init_signature_skeleton(&self, parts: &mut DocumentParts) -> Result<()> {
        let signature_id = dom::generate_id(Some("Signature"));
        let root = parts.doc.root();
        let signature = parts.doc.add_node(
            root,
            Some(uri::XMLDSIG_NS),
            "ds:Signature",
            None,
            &[("Id", &format!("{signature_id}-Signature"))],
        )?;
        parts.signed_info = parts.doc.add_node(
            signature,
            Some(uri::XMLDSIG_NS),
            "ds:SignedInfo",
            None,
            &[("Id", &format!("{signature_id}-SignedInfo"))],
        )?;
        parts.signature_value = parts.doc.add_node(
            signature,
            Some(uri::XMLDSIG_NS),
            "ds:SignatureValue",
            None,
            &[("Id", &format!("{signature_id}-SignatureValue"))],
        )?;
        parts.key_info = parts.doc.add_node(
            signature,
            Some(uri::XMLDSIG_NS),
            "ds:KeyInfo",
            None,
            &[("Id", &format!("{signature_id}-KeyInfo"))],
        )?;
        parts.signature = signature;
        parts.signature_id = signature_id;
        Ok(())
    }

    /// Record the canonicalization and signature method algorithms.
    fn add_methods(&self, parts: &mut DocumentParts) -> Result<()> {
        let ns = Some(uri::XMLDSIG_NS);
        parts.doc.add_node(
            parts.signed_info,
            ns,
            "ds:CanonicalizationMethod",
            None,
            &[("Algorithm", self.canonicalization.uri())],
        )?;
        parts.doc.add_node(
            parts.signed_info,
            ns,
            "ds:SignatureMethod",
            None,
            &[("Algorithm", self.signature_method.uri())],
        )?;
        Ok(())
    }

    /// Reference the `Content` node from `SignedInfo`.
    fn add_payload_reference(&self, parts: &mut DocumentParts) -> Result<()> {
        let payload_reference_id = dom::generate_id(Some("Reference"));
        let content = parts.content;
        let content_uri = format!("#{}", parts.content_id);
        let attrs = [
            ("Id", payload_reference_id.as_str()),
            ("Type", uri::XMLDSIG_OBJECT),
            ("URI", content_uri.as_str()),
        ];
        self.add_reference(parts, content, &attrs, Some(self.canonicalization.uri()))?;
        parts.payload_reference_id = payload_reference_id;
        Ok(())
    }

    /// Embed certificate and RSA key values, then reference `KeyInfo`.
    fn add_key_info(&self, parts: &mut DocumentParts) -> Result<()> {
        let ns = Some(uri::XMLDSIG_NS);
        let x509_data = parts.doc.add_node(parts.key_info, ns, "ds:X509Data", None, &[])?;
        parts.doc.add_node(
            x509_data,
            ns,
            "ds:X509Certificate",
            Some(self.identity.certificate_b64()),
            &[],
        )?;
        let key_value = parts.doc.add_node(parts.key_info, ns, "ds:KeyValue", None, &[])?;
        let rsa_key_value = parts.doc.add_node(key_value, ns, "ds:RSAKeyValue", None, &[])?;
        parts.doc.add_node(
            rsa_key_value,
            ns,
            "ds:Modulus",
            Some(self.identity.modulus_b64()),
            &[],
        )?;
        parts.doc.add_node(
            rsa_key_value,
            ns,
            "ds:Exponent",
            Some(self.identity.exponent_b64()),
            &[],
        )?;

        let key_info = parts.key_info;
        let key_info_uri = format!("#{}-KeyInfo", parts.signature_id);
        self.add_reference(parts, key_info, &[("URI", key_info_uri.as_str())], None)
    }

    /// Canonicalize `SignedInfo` and write the computed signature value.
    fn add_signature_value(&self, parts: &mut DocumentParts) -> Result<()> {
        let data = c14n::canonicalize(
            &parts.doc,
            parts.signed_info,
            self.canonicalization,
            None,
        )?;
        let signature_value = self.identity.sign(&data, self.signature_method)?;
        debug!(bytes = data.len(), "SignedInfo canonicalized and signed");
        parts.doc.set_text(parts.signature_value, &signature_value)
    }

    /// Append a `Reference` whose digest covers the canonicalized subtree
    /// at `target`.
    pub(crate) fn add_reference(
        &self,
        parts: &mut DocumentParts,
        target: NodeId,
        attrs: &[(&str, &str)],
        transform: Option<&str>,
    ) -> Result<()> {
        let ns = Some(uri::XMLDSIG_NS);
        let reference = parts
            .doc
            .add_node(parts.signed_info, ns, "ds:Reference", None, attrs)?;
        if let Some(algorithm) = transform {
            let transforms = parts.doc.add_node(reference, ns, "ds:Transforms", None, &[])?;
            parts.doc.add_node(
                transforms,
                ns,
                "ds:Transform",
                None,
                &[("Algorithm", algorithm)],
            )?;
        }
        parts.doc.add_node(
            reference,
            ns,
            "ds:DigestMethod",
            None,
            &[("Algorithm", self.digest_method.uri())],
        )?;

        let data = c14n::canonicalize(&parts.doc, target, self.canonicalization, None)?;
        let digest_value = self.identity.digest(&data, self.digest_method)?;
        parts
            .doc
            .add_node(reference, ns, "ds:DigestValue", Some(&digest_value), &[])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::identity::OpenSslIdentity;
    use crate::identity::cert_utils::generate_test_identity;
    use chrono::DateTime;

    fn identity() -> OpenSslIdentity {
        let material = generate_test_identity();
        OpenSslIdentity::from_pem(&material.key_pem, &material.cert_pem, None).unwrap()
    }

    fn builder(identity: &dyn SigningIdentity, profile: SignatureProfile) -> SignatureBuilder<'_> {
        SignatureBuilder::new(
            identity,
            CanonicalizationMethod::Inclusive,
            SignatureMethod::RsaSha256,
            DigestMethod::Sha256,
            profile,
        )
    }

    fn local_names(doc: &Document, node: NodeId) -> Vec<String> {
        doc.children(node)
            .iter()
            .filter_map(|&c| doc.qname(c).map(|q| q.local.clone()))
            .collect()
    }

    #[test]
    fn test_xmldsig_document_shape() {
        let identity = identity();
        let signed = builder(&identity, SignatureProfile::XmlDsig)
            .build("<data><item>1</item></data>")
            .unwrap();

        let doc = Document::parse(&signed).unwrap();
        assert_eq!(doc.find_nodes(None, "Content").len(), 1);
        assert_eq!(doc.find_nodes(Some(uri::XMLDSIG_NS), "Signature").len(), 1);

        let signature = doc.find_node(Some(uri::XMLDSIG_NS), "Signature").unwrap();
        assert_eq!(
            local_names(&doc, signature),
            ["SignedInfo", "SignatureValue", "KeyInfo"]
        );
        let signed_info = doc.find_node(Some(uri::XMLDSIG_NS), "SignedInfo").unwrap();
        assert_eq!(
            local_names(&doc, signed_info),
            [
                "CanonicalizationMethod",
                "SignatureMethod",
                "Reference",
                "Reference"
            ]
        );

        // payload survives under Content
        let content = doc.find_node(None, "Content").unwrap();
        assert_eq!(doc.text_content(content), "1");
        assert_eq!(doc.attr(content, "MimeType"), Some("text/xml"));
        assert!(doc.attr(content, "Id").unwrap().starts_with("Content-"));
    }

    #[test]
    fn test_xades_reference_ordering() {
        let identity = identity();
        let signing_time = DateTime::parse_from_rfc3339("2019-05-28T17:48:53+02:00").unwrap();
        let signed = builder(&identity, SignatureProfile::XadesBes { signing_time })
            .build("<data/>")
            .unwrap();

        let doc = Document::parse(&signed).unwrap();
        let signature = doc.find_node(Some(uri::XMLDSIG_NS), "Signature").unwrap();
        // Object is appended after the skeleton children
        assert_eq!(
            local_names(&doc, signature),
            ["SignedInfo", "SignatureValue", "KeyInfo", "Object"]
        );

        // SignedProperties is referenced before KeyInfo: its digest was
        // final when the signature value was computed.
        let references = doc.find_nodes(Some(uri::XMLDSIG_NS), "Reference");
        assert_eq!(references.len(), 3);
        assert_eq!(
            doc.attr(references[0], "Type"),
            Some(uri::XMLDSIG_OBJECT)
        );
        assert_eq!(
            doc.attr(references[1], "Type"),
            Some(uri::XADES_SIGNED_PROPERTIES)
        );
        assert_eq!(doc.attr(references[2], "Type"), None);
    }

    #[test]
    fn test_ids_are_derived_from_signature_id() {
        let identity = identity();
        let signed = builder(&identity, SignatureProfile::XmlDsig)
            .build("<data/>")
            .unwrap();
        let doc = Document::parse(&signed).unwrap();

        let signature = doc.find_node(Some(uri::XMLDSIG_NS), "Signature").unwrap();
        let signature_id = doc.attr(signature, "Id").unwrap();
        let base = signature_id.strip_suffix("-Signature").unwrap();
        assert!(base.starts_with("Signature-"));

        let signed_info = doc.find_node(Some(uri::XMLDSIG_NS), "SignedInfo").unwrap();
        assert_eq!(
            doc.attr(signed_info, "Id").unwrap(),
            format!("{base}-SignedInfo")
        );
        let key_info = doc.find_node(Some(uri::XMLDSIG_NS), "KeyInfo").unwrap();
        assert_eq!(doc.attr(key_info, "Id").unwrap(), format!("{base}-KeyInfo"));
    }

    #[test]
    fn test_malformed_payload_aborts() {
        let identity = identity();
        let result = builder(&identity, SignatureProfile::XmlDsig).build("<unclosed");
        assert!(matches!(result, Err(Error::MalformedPayload(_))));
    }
}
