//! Contains the certificate authority (CA) type which signs certificates on
//! behalf of a service instance. CAs are never created here, they are loaded
//! from previously generated (or operator supplied) PEM material.
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument};
use x509_cert::{Certificate, name::Name};

use crate::{PemError, certificate_from_pem, keys::PrivateKey};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to decode CA private key"))]
    DecodeKey { source: crate::keys::Error },

    #[snafu(display("failed to decode CA certificate"))]
    DecodeCertificate { source: PemError },

    #[snafu(display("the CA private key does not match the public key of the CA certificate"))]
    KeyMismatch,

    #[snafu(display("failed to read CA public key"))]
    ReadPublicKey { source: crate::keys::Error },
}

/// A certificate authority (CA) which is used to sign leaf or intermediate
/// certificates.
#[derive(Debug)]
pub struct CertificateAuthority {
    certificate: Certificate,
    key: PrivateKey,
}

impl CertificateAuthority {
    /// Loads a CA from a PEM-encoded private key and certificate. The key
    /// must be the one the certificate was issued for.
    #[instrument(name = "load_certificate_authority", skip_all)]
    pub fn from_pem(key: &str, certificate: &str) -> Result<Self, Error> {
        let key = PrivateKey::from_pem(key).context(DecodeKeySnafu)?;
        let certificate = certificate_from_pem(certificate).context(DecodeCertificateSnafu)?;

        let spki = key.subject_public_key_info().context(ReadPublicKeySnafu)?;
        ensure!(
            spki == certificate.tbs_certificate.subject_public_key_info,
            KeyMismatchSnafu
        );

        debug!(
            ca.subject = %certificate.tbs_certificate.subject,
            ca.not_after = %certificate.tbs_certificate.validity.not_after,
            ca.public_key.algorithm = %key.key_type(),
            "loaded certificate authority"
        );

        Ok(Self { certificate, key })
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    pub fn ca_cert(&self) -> &Certificate {
        &self.certificate
    }

    /// The subject of the CA, which becomes the issuer of all certificates it
    /// signs.
    pub fn subject(&self) -> &Name {
        &self.certificate.tbs_certificate.subject
    }
}
