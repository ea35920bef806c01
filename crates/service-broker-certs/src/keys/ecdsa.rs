//! Abstraction layer around the [`ecdsa`] crate. This module provides types
//! which abstract away the generation and encoding of ECDSA keys on the
//! NIST P-256 curve.
use p256::{
    NistP256, SecretKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
};
use rand_core::{CryptoRngCore, OsRng};
use snafu::{ResultExt, Snafu};
use tracing::instrument;
use zeroize::Zeroizing;

use crate::{
    KeyEncoding, PEM_LINE_ENDING,
    keys::{CertificateKeypair, PKCS8_LABEL, SEC1_LABEL, pem_label},
};

const KEY_SIZE: usize = 256;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read PEM label"))]
    ReadPemLabel { source: x509_cert::der::Error },

    #[snafu(display("unsupported PEM label {label:?} for an ECDSA key"))]
    UnsupportedPemLabel { label: String },

    #[snafu(display("failed to deserialize ECDSA key from PEM-encoded SEC1"))]
    DeserializeSec1 { source: p256::elliptic_curve::Error },

    #[snafu(display("failed to deserialize ECDSA key from PEM-encoded PKCS#8"))]
    DeserializePkcs8 { source: p256::pkcs8::Error },

    #[snafu(display("failed to serialize ECDSA key as PEM-encoded SEC1"))]
    SerializeSec1 { source: p256::elliptic_curve::Error },

    #[snafu(display("failed to serialize ECDSA key as PEM-encoded PKCS#8"))]
    SerializePkcs8 { source: p256::pkcs8::Error },

    #[snafu(display("ECDSA keys cannot be encoded as {encoding}"))]
    UnsupportedEncoding { encoding: KeyEncoding },
}

#[derive(Debug)]
pub struct SigningKey {
    secret_key: SecretKey,
    signing_key: p256::ecdsa::SigningKey,
}

impl SigningKey {
    #[instrument(name = "create_ecdsa_signing_key")]
    pub fn new() -> Result<Self> {
        let mut csprng = OsRng;
        Self::new_with_rng(&mut csprng)
    }

    #[instrument(name = "create_ecdsa_signing_key_custom_rng", skip_all)]
    pub fn new_with_rng<R>(csprng: &mut R) -> Result<Self>
    where
        R: CryptoRngCore + Sized,
    {
        Ok(Self::from_secret_key(SecretKey::random(csprng)))
    }

    fn from_secret_key(secret_key: SecretKey) -> Self {
        let signing_key = p256::ecdsa::SigningKey::from(&secret_key);

        Self {
            secret_key,
            signing_key,
        }
    }
}

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type Signature = ecdsa::der::Signature<NistP256>;
    type SigningKey = p256::ecdsa::SigningKey;
    type VerifyingKey = p256::ecdsa::VerifyingKey;

    fn signing_key(&self) -> &Self::SigningKey {
        &self.signing_key
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        *self.signing_key.verifying_key()
    }

    #[instrument(name = "create_ecdsa_signing_key_from_pem", skip(input))]
    fn from_pem(input: &str) -> Result<Self> {
        let label = pem_label(input).context(ReadPemLabelSnafu)?;

        let secret_key = match label {
            SEC1_LABEL => SecretKey::from_sec1_pem(input).context(DeserializeSec1Snafu)?,
            PKCS8_LABEL => SecretKey::from_pkcs8_pem(input).context(DeserializePkcs8Snafu)?,
            _ => return UnsupportedPemLabelSnafu { label }.fail(),
        };

        Ok(Self::from_secret_key(secret_key))
    }

    fn to_pem(&self, encoding: KeyEncoding) -> Result<Zeroizing<String>> {
        match encoding {
            KeyEncoding::Sec1 => self
                .secret_key
                .to_sec1_pem(PEM_LINE_ENDING)
                .context(SerializeSec1Snafu),
            KeyEncoding::Pkcs8 => self
                .secret_key
                .to_pkcs8_pem(PEM_LINE_ENDING)
                .context(SerializePkcs8Snafu),
            KeyEncoding::Pkcs1 => UnsupportedEncodingSnafu { encoding }.fail(),
        }
    }


    fn key_size(&self) -> usize {
        KEY_SIZE
    }
}
