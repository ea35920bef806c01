//! This crate provides the key and X.509 certificate primitives the service
//! broker uses to synthesize secrets on demand. It can generate private keys,
//! encode and decode them as PEM, load a certificate authority (CA) from a PEM
//! key and certificate pair and build certificates which are either
//! self-signed or signed by such a CA.
//!
//! Everything here works on in-memory values only. Persisting the generated
//! material is up to the caller.
//!
//! ## References
//!
//! - <https://datatracker.ietf.org/doc/html/rfc5280>
//! - <https://datatracker.ietf.org/doc/html/rfc7468>
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use x509_cert::{
    Certificate,
    der::{DecodePem, EncodePem, pem::LineEnding},
};

pub mod ca;
pub mod cert_builder;
pub mod keys;

pub use cert_builder::{CertificateBuilder, DEFAULT_CERTIFICATE_VALIDITY};

/// The line ending used for all PEM output of this crate.
pub const PEM_LINE_ENDING: LineEnding = LineEnding::LF;

#[derive(Debug, Snafu)]
pub enum PemError {
    #[snafu(display("failed to encode certificate as PEM"))]
    EncodeCertificate { source: x509_cert::der::Error },

    #[snafu(display("failed to decode certificate from PEM"))]
    DecodeCertificate { source: x509_cert::der::Error },
}

/// Encodes a [`Certificate`] as a PEM string.
pub fn certificate_to_pem(certificate: &Certificate) -> Result<String, PemError> {
    certificate
        .to_pem(PEM_LINE_ENDING)
        .context(EncodeCertificateSnafu)
}

/// Decodes a single PEM-encoded [`Certificate`].
pub fn certificate_from_pem(input: &str) -> Result<Certificate, PemError> {
    Certificate::from_pem(input.as_bytes()).context(DecodeCertificateSnafu)
}

/// Supported private key types, currently [RSA](crate::keys::rsa) and
/// [ECDSA](crate::keys::ecdsa) on the NIST P-256 curve.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    Rsa,
    EcdsaP256,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Rsa => write!(f, "RSA"),
            KeyType::EcdsaP256 => write!(f, "ECDSA P-256"),
        }
    }
}

/// Private key encodings. All of them are emitted as PEM.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KeyEncoding {
    /// `RSA PRIVATE KEY`, RSA only.
    Pkcs1,
    /// `PRIVATE KEY`, any key type.
    Pkcs8,
    /// `EC PRIVATE KEY`, elliptic curve keys only.
    Sec1,
}

impl KeyEncoding {
    /// Whether keys of `key_type` can be written in this encoding.
    pub fn supports(self, key_type: KeyType) -> bool {
        !matches!(
            (key_type, self),
            (KeyType::Rsa, KeyEncoding::Sec1) | (KeyType::EcdsaP256, KeyEncoding::Pkcs1)
        )
    }
}

impl std::fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyEncoding::Pkcs1 => write!(f, "PKCS#1"),
            KeyEncoding::Pkcs8 => write!(f, "PKCS#8"),
            KeyEncoding::Sec1 => write!(f, "SEC1"),
        }
    }
}

/// What a certificate is allowed to be used for.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Usage {
    /// A certificate authority which can sign other certificates.
    Ca,
    /// A TLS server certificate.
    #[default]
    Server,
    /// A TLS client certificate.
    Client,
}

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Usage::Ca => write!(f, "ca"),
            Usage::Server => write!(f, "server"),
            Usage::Client => write!(f, "client"),
        }
    }
}
