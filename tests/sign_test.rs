use chrono::DateTime;

use xmlsig::algorithms::{CanonicalizationMethod, DigestMethod, SignatureMethod, uri};
use xmlsig::dom::{Document, NodeId, c14n};
use xmlsig::identity::cert_utils::generate_test_identity;
use xmlsig::{Error, OpenSslIdentity, SignOptions, SignerConfig, SigningIdentity, XmlSigner};

const PAYLOAD: &str = "<root><a>1</a></root>";

fn test_identity() -> OpenSslIdentity {
    let material = generate_test_identity();
    OpenSslIdentity::from_pem(&material.key_pem, &material.cert_pem, None).unwrap()
}

fn find_by_id(doc: &Document, id: &str) -> NodeId {
    doc.descendants(doc.root())
        .into_iter()
        .find(|&n| doc.attr(n, "Id") == Some(id))
        .unwrap_or_else(|| panic!("no element with Id {id}"))
}

fn child_by_local(doc: &Document, node: NodeId, local: &str) -> NodeId {
    doc.children(node)
        .iter()
        .copied()
        .find(|&c| doc.qname(c).is_some_and(|q| q.local == local))
        .unwrap_or_else(|| panic!("no {local} child"))
}

/// Recompute every reference digest of a signed document from its own
/// serialized form and compare with the recorded digest values.
fn assert_reference_digests(signed: &str, identity: &dyn SigningIdentity) {
    let doc = Document::parse(signed).unwrap();
    let signed_info = doc.find_node(Some(uri::XMLDSIG_NS), "SignedInfo").unwrap();
    let c14n_method = CanonicalizationMethod::from_uri(
        doc.attr(
            child_by_local(&doc, signed_info, "CanonicalizationMethod"),
            "Algorithm",
        )
        .unwrap(),
    )
    .unwrap();

    let references = doc.find_nodes(Some(uri::XMLDSIG_NS), "Reference");
    assert!(!references.is_empty());
    for reference in references {
        let target_id = doc
            .attr(reference, "URI")
            .unwrap()
            .strip_prefix('#')
            .unwrap()
            .to_string();
        let digest_method = DigestMethod::from_uri(
            doc.attr(child_by_local(&doc, reference, "DigestMethod"), "Algorithm")
                .unwrap(),
        )
        .unwrap();
        let recorded = doc.text_content(child_by_local(&doc, reference, "DigestValue"));

        let target = find_by_id(&doc, &target_id);
        let data = c14n::canonicalize(&doc, target, c14n_method, None).unwrap();
        let recomputed = identity.digest(&data, digest_method).unwrap();
        assert_eq!(recomputed, recorded, "digest mismatch for #{target_id}");
    }
}

/// Re-canonicalize `SignedInfo` and check the stored signature value
/// against the signer certificate.
fn assert_signature_value(signed: &str, identity: &dyn SigningIdentity) {
    let doc = Document::parse(signed).unwrap();
    let signed_info = doc.find_node(Some(uri::XMLDSIG_NS), "SignedInfo").unwrap();
    let c14n_method = CanonicalizationMethod::from_uri(
        doc.attr(
            child_by_local(&doc, signed_info, "CanonicalizationMethod"),
            "Algorithm",
        )
        .unwrap(),
    )
    .unwrap();
    let signature_method = SignatureMethod::from_uri(
        doc.attr(
            child_by_local(&doc, signed_info, "SignatureMethod"),
            "Algorithm",
        )
        .unwrap(),
    )
    .unwrap();

    let data = c14n::canonicalize(&doc, signed_info, c14n_method, None).unwrap();
    let signature_value = doc.text_content(
        doc.find_node(Some(uri::XMLDSIG_NS), "SignatureValue")
            .unwrap(),
    );
    assert!(
        identity
            .verify(&data, &signature_value, signature_method)
            .unwrap()
    );
}

#[test]
fn test_xmldsig_end_to_end() {
    let identity = test_identity();
    let signer = XmlSigner::default();
    let signed = signer
        .sign(PAYLOAD, uri::XMLDSIG_NS, &identity, &SignOptions::default())
        .unwrap();

    let doc = Document::parse(&signed).unwrap();
    assert_eq!(doc.find_nodes(None, "Content").len(), 1);
    assert_eq!(doc.find_nodes(Some(uri::XMLDSIG_NS), "Signature").len(), 1);
    assert_eq!(doc.find_nodes(Some(uri::XMLDSIG_NS), "Reference").len(), 2);

    // key material is embedded both as certificate and as raw RSA values
    let key_info = doc.find_node(Some(uri::XMLDSIG_NS), "KeyInfo").unwrap();
    let x509_data = child_by_local(&doc, key_info, "X509Data");
    assert_eq!(
        doc.text_content(child_by_local(&doc, x509_data, "X509Certificate")),
        identity.certificate_b64()
    );
    let rsa_value = child_by_local(&doc, child_by_local(&doc, key_info, "KeyValue"), "RSAKeyValue");
    assert_eq!(
        doc.text_content(child_by_local(&doc, rsa_value, "Modulus")),
        identity.modulus_b64()
    );
    assert_eq!(
        doc.text_content(child_by_local(&doc, rsa_value, "Exponent")),
        identity.exponent_b64()
    );

    assert_reference_digests(&signed, &identity);
    assert_signature_value(&signed, &identity);
}

#[test]
fn test_xades_end_to_end() {
    let identity = test_identity();
    let signer = XmlSigner::default();
    let options = SignOptions {
        timezone: None,
        signing_time: Some(DateTime::parse_from_rfc3339("2019-05-28T17:48:53+02:00").unwrap()),
    };
    let signed = signer
        .sign(PAYLOAD, uri::XADES_NS, &identity, &options)
        .unwrap();

    let doc = Document::parse(&signed).unwrap();
    assert_eq!(doc.find_nodes(None, "Content").len(), 1);
    assert_eq!(doc.find_nodes(Some(uri::XMLDSIG_NS), "Signature").len(), 1);
    assert_eq!(doc.find_nodes(Some(uri::XMLDSIG_NS), "Reference").len(), 3);

    let signature = doc.find_node(Some(uri::XMLDSIG_NS), "Signature").unwrap();
    let signature_id = doc.attr(signature, "Id").unwrap();

    let qualifying = doc
        .find_node(Some(uri::XADES_NS), "QualifyingProperties")
        .unwrap();
    assert_eq!(
        doc.attr(qualifying, "Target").unwrap(),
        format!("#{signature_id}")
    );

    let signing_time = doc.find_node(Some(uri::XADES_NS), "SigningTime").unwrap();
    assert_eq!(doc.text_content(signing_time), "2019-05-28T17:48:53+02:00");

    let cert_digest = doc.find_node(Some(uri::XADES_NS), "CertDigest").unwrap();
    assert_eq!(
        doc.text_content(child_by_local(&doc, cert_digest, "DigestValue")),
        identity.digest_certificate(DigestMethod::Sha256).unwrap()
    );

    let issuer_serial = doc.find_node(Some(uri::XADES_NS), "IssuerSerial").unwrap();
    assert_eq!(
        doc.text_content(child_by_local(&doc, issuer_serial, "X509IssuerName")),
        identity.issuer_name()
    );
    assert_eq!(
        doc.text_content(child_by_local(&doc, issuer_serial, "X509SerialNumber")),
        identity.serial_number()
    );

    // DataObjectFormat points back at the payload reference
    let references = doc.find_nodes(Some(uri::XMLDSIG_NS), "Reference");
    let payload_reference_id = doc.attr(references[0], "Id").unwrap();
    let data_object_format = doc
        .find_node(Some(uri::XADES_NS), "DataObjectFormat")
        .unwrap();
    assert_eq!(
        doc.attr(data_object_format, "ObjectReference").unwrap(),
        format!("#{payload_reference_id}")
    );
    assert_eq!(
        doc.text_content(doc.find_node(Some(uri::XADES_NS), "Identifier").unwrap()),
        "urn:oid:1.2.840.10003.5.109.10"
    );
    assert_eq!(
        doc.text_content(doc.find_node(Some(uri::XADES_NS), "MimeType").unwrap()),
        "text/xml"
    );

    assert_reference_digests(&signed, &identity);
    assert_signature_value(&signed, &identity);
}

#[test]
fn test_exclusive_c14n_and_sha512_configuration() {
    let identity = test_identity();
    let signer = XmlSigner::new(SignerConfig {
        canonicalization_method: uri::EXC_C14N.to_string(),
        digest_method: uri::SHA512.to_string(),
        signature_method: uri::RSA_SHA512.to_string(),
    });
    let payload = r#"<inv:invoice xmlns:inv="http://example.com/invoice"><inv:total>12</inv:total></inv:invoice>"#;
    let signed = signer
        .sign(payload, uri::XADES_NS, &identity, &SignOptions::default())
        .unwrap();

    assert!(signed.contains(uri::EXC_C14N));
    assert!(signed.contains(uri::SHA512));
    assert_reference_digests(&signed, &identity);
    assert_signature_value(&signed, &identity);
}

#[test]
fn test_unsupported_algorithms_fail() {
    let identity = test_identity();
    for config in [
        SignerConfig {
            digest_method: "not-a-real-alg".to_string(),
            ..SignerConfig::default()
        },
        SignerConfig {
            signature_method: "not-a-real-alg".to_string(),
            ..SignerConfig::default()
        },
        SignerConfig {
            canonicalization_method: "not-a-real-alg".to_string(),
            ..SignerConfig::default()
        },
    ] {
        let result = XmlSigner::new(config).sign(
            PAYLOAD,
            uri::XMLDSIG_NS,
            &identity,
            &SignOptions::default(),
        );
        assert!(matches!(result, Err(Error::UnsupportedAlgorithm(_))));
    }
}

#[test]
fn test_unsupported_signature_type_fails() {
    let identity = test_identity();
    let result = XmlSigner::default().sign(
        PAYLOAD,
        "urn:not-a-signature-type",
        &identity,
        &SignOptions::default(),
    );
    assert!(matches!(result, Err(Error::UnsupportedSignatureType(_))));
}

#[test]
fn test_invalid_timezone_fails() {
    let identity = test_identity();
    let options = SignOptions {
        timezone: Some("Nowhere/Special".to_string()),
        signing_time: None,
    };
    let result = XmlSigner::default().sign(PAYLOAD, uri::XADES_NS, &identity, &options);
    assert!(matches!(result, Err(Error::InvalidTimeZone(_))));
    // the timezone option only applies to XAdES
    assert!(
        XmlSigner::default()
            .sign(PAYLOAD, uri::XMLDSIG_NS, &identity, &options)
            .is_ok()
    );
}

#[test]
fn test_malformed_payload_fails() {
    let identity = test_identity();
    let result =
        XmlSigner::default().sign("<unclosed", uri::XMLDSIG_NS, &identity, &SignOptions::default());
    assert!(matches!(result, Err(Error::MalformedPayload(_))));
}

#[test]
fn test_generated_ids_differ_across_runs() {
    let identity = test_identity();
    let signer = XmlSigner::default();
    let options = SignOptions::default();
    let first = signer
        .sign(PAYLOAD, uri::XMLDSIG_NS, &identity, &options)
        .unwrap();
    let second = signer
        .sign(PAYLOAD, uri::XMLDSIG_NS, &identity, &options)
        .unwrap();

    let id_of = |xml: &str| {
        let doc = Document::parse(xml).unwrap();
        let signature = doc.find_node(Some(uri::XMLDSIG_NS), "Signature").unwrap();
        doc.attr(signature, "Id").unwrap().to_string()
    };
    assert_ne!(id_of(&first), id_of(&second));

    // both stand on their own
    assert_signature_value(&first, &identity);
    assert_signature_value(&second, &identity);
}
