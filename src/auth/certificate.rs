//! Client certificate decoding.
//!
//! Accepts a password-protected PKCS#12 store or a PEM bundle holding the
//! leaf certificate and its private key (PKCS#8 or PKCS#1). Only RSA keys can
//! sign RS256 client assertions; anything else is rejected up front.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::EncodingKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, ObjectIdentifier, PrivateKeyInfo};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use x509_cert::Certificate;
use x509_cert::der::{Decode, Encode};

use crate::{Error, Result};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// An RSA signing key paired with the leaf certificate it belongs to.
#[derive(Clone)]
pub struct ClientCertificate {
    encoding_key: EncodingKey,
    public_key: RsaPublicKey,
    certificate_der: Vec<u8>,
    thumbprint: String,
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("thumbprint", &self.thumbprint)
            .field("key", &"[redacted]")
            .finish()
    }
}

impl ClientCertificate {
    /// Decode PEM or PKCS#12 input, detected by content.
    pub fn from_bytes(data: &[u8], password: Option<&str>) -> Result<Self> {
        if looks_like_pem(data) {
            Self::from_pem(data)
        } else {
            Self::from_pkcs12(data, password.unwrap_or_default())
        }
    }

    /// Decode a PKCS#12 store.
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self> {
        let store = p12_keystore::KeyStore::from_pkcs12(data, password)
            .map_err(|e| Error::Certificate(format!("failed to decode PKCS#12 store: {}", e)))?;

        let (alias, chain) = store.private_key_chain().ok_or_else(|| {
            Error::Certificate("PKCS#12 store contains no private key".into())
        })?;
        let leaf = chain.chain().first().ok_or_else(|| {
            Error::Certificate(format!("PKCS#12 entry '{}' contains no certificate", alias))
        })?;

        let key = decode_pkcs8_key(chain.key())?;
        Self::new(key, leaf.as_der().to_vec())
    }

    /// Decode a PEM bundle with a `CERTIFICATE` block and a private key block.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let blocks = pem::parse_many(data)
            .map_err(|e| Error::Certificate(format!("malformed PEM input: {}", e)))?;

        let mut certificate = None;
        let mut key = None;

        for block in blocks {
            match block.tag() {
                "CERTIFICATE" => {
                    // First certificate is the leaf.
                    if certificate.is_none() {
                        certificate = Some(block.into_contents());
                    }
                }
                "PRIVATE KEY" => key = Some(decode_pkcs8_key(block.contents())?),
                "RSA PRIVATE KEY" => {
                    key = Some(RsaPrivateKey::from_pkcs1_der(block.contents()).map_err(|e| {
                        Error::Certificate(format!("invalid PKCS#1 private key: {}", e))
                    })?)
                }
                "EC PRIVATE KEY" => {
                    return Err(Error::UnsupportedKey(
                        "EC keys cannot sign RS256 client assertions".into(),
                    ));
                }
                "ENCRYPTED PRIVATE KEY" => {
                    return Err(Error::Certificate(
                        "encrypted PEM private keys are not supported, use a PKCS#12 store".into(),
                    ));
                }
                _ => {}
            }
        }

        let certificate =
            certificate.ok_or_else(|| Error::Certificate("no CERTIFICATE block found".into()))?;
        let key = key.ok_or_else(|| Error::Certificate("no private key block found".into()))?;
        Self::new(key, certificate)
    }

    fn new(key: RsaPrivateKey, certificate_der: Vec<u8>) -> Result<Self> {
        let certificate = Certificate::from_der(&certificate_der)
            .map_err(|e| Error::Certificate(format!("invalid X.509 certificate: {}", e)))?;
        let spki = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("invalid certificate public key: {}", e)))?;

        let public_key = key.to_public_key();
        if RsaPublicKey::from_public_key_der(&spki).ok().as_ref() != Some(&public_key) {
            return Err(Error::Certificate(
                "private key does not match certificate".into(),
            ));
        }

        let pkcs1 = key
            .to_pkcs1_der()
            .map_err(|e| Error::Certificate(format!("failed to encode private key: {}", e)))?;
        let thumbprint = URL_SAFE_NO_PAD.encode(Sha1::digest(&certificate_der));

        Ok(Self {
            encoding_key: EncodingKey::from_rsa_der(pkcs1.as_bytes()),
            public_key,
            certificate_der,
            thumbprint,
        })
    }

    /// Base64url SHA-1 thumbprint of the DER certificate (`x5t`).
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Base64url SHA-256 thumbprint of the DER certificate (`x5t#S256`).
    pub fn thumbprint_sha256(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(&self.certificate_der))
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// Public half of the signing key, as published in the certificate.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

fn decode_pkcs8_key(der: &[u8]) -> Result<RsaPrivateKey> {
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| Error::Certificate(format!("invalid PKCS#8 private key: {}", e)))?;

    let oid = info.algorithm.oid;
    if oid != RSA_ENCRYPTION {
        let kind = if oid == EC_PUBLIC_KEY {
            "EC".to_string()
        } else if oid == ED25519 {
            "Ed25519".to_string()
        } else {
            format!("algorithm {}", oid)
        };
        return Err(Error::UnsupportedKey(format!(
            "{} keys cannot sign RS256 client assertions",
            kind
        )));
    }

    RsaPrivateKey::from_pkcs8_der(der)
        .map_err(|e| Error::Certificate(format!("invalid RSA private key: {}", e)))
}

fn looks_like_pem(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(b"-----BEGIN ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &[u8] = include_bytes!("../../tests/fixtures/rsa-bundle.pem");
    const KEY_ONLY: &[u8] = include_bytes!("../../tests/fixtures/rsa-key.pem");
    const CERT_ONLY: &[u8] = include_bytes!("../../tests/fixtures/rsa-cert.pem");
    const CERT_DER: &[u8] = include_bytes!("../../tests/fixtures/rsa-cert.der");
    const EC_BUNDLE: &[u8] = include_bytes!("../../tests/fixtures/ec-bundle.pem");
    const MISMATCHED_BUNDLE: &[u8] =
        include_bytes!("../../tests/fixtures/rsa-mismatched-bundle.pem");

    // openssl x509 -outform DER | openssl dgst -sha1 -binary | base64url
    const FIXTURE_THUMBPRINT: &str = "YpPEpK_hfqKo_XTUJVWWV5vrLbE";

    #[test]
    fn test_pem_bundle_thumbprint() {
        let cert = ClientCertificate::from_pem(BUNDLE).unwrap();
        assert_eq!(cert.thumbprint(), FIXTURE_THUMBPRINT);
        assert_eq!(cert.certificate_der(), CERT_DER);
        assert_ne!(cert.thumbprint_sha256(), cert.thumbprint());
    }

    #[test]
    fn test_from_bytes_detects_pem() {
        let cert = ClientCertificate::from_bytes(BUNDLE, None).unwrap();
        assert_eq!(cert.thumbprint(), FIXTURE_THUMBPRINT);
    }

    #[test]
    fn test_missing_parts() {
        let err = ClientCertificate::from_pem(KEY_ONLY).unwrap_err();
        assert!(err.to_string().contains("no CERTIFICATE block"));

        let err = ClientCertificate::from_pem(CERT_ONLY).unwrap_err();
        assert!(err.to_string().contains("no private key block"));
    }

    #[test]
    fn test_ec_key_is_unsupported() {
        let err = ClientCertificate::from_pem(EC_BUNDLE).unwrap_err();
        assert!(matches!(err, Error::UnsupportedKey(_)), "got {:?}", err);
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_der_certificate_without_key_is_rejected() {
        let err = ClientCertificate::from_bytes(CERT_DER, None).unwrap_err();
        assert!(matches!(err, Error::Certificate(_)));
    }

    #[test]
    fn test_malformed_pem() {
        let err = ClientCertificate::from_pem(
            b"-----BEGIN CERTIFICATE-----\nnot base64!\n-----END CERTIFICATE-----\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Certificate(_)), "got {:?}", err);

        let err = ClientCertificate::from_pem(b"-----BEGIN CERTIFICATE-----\nAAAA\n").unwrap_err();
        assert!(matches!(err, Error::Certificate(_)), "got {:?}", err);
    }

    #[test]
    fn test_key_must_match_certificate() {
        let err = ClientCertificate::from_pem(MISMATCHED_BUNDLE).unwrap_err();
        assert!(matches!(err, Error::Certificate(_)), "got {:?}", err);
        assert!(err.to_string().contains("private key does not match certificate"));
    }

    #[test]
    fn test_certificate_block_must_be_x509() {
        let key_block = std::str::from_utf8(KEY_ONLY).unwrap();
        let bundle = format!(
            "-----BEGIN CERTIFICATE-----\nMAMCAQE=\n-----END CERTIFICATE-----\n{}",
            key_block
        );
        let err = ClientCertificate::from_pem(bundle.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid X.509 certificate"), "got {}", err);
    }

    #[test]
    fn test_public_key_matches_private_key() {
        let cert = ClientCertificate::from_pem(BUNDLE).unwrap();
        let key = RsaPrivateKey::from_pkcs8_pem(std::str::from_utf8(KEY_ONLY).unwrap()).unwrap();
        assert_eq!(cert.public_key(), &key.to_public_key());
    }
}
