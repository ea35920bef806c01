//! Abstraction layer around the [`rsa`] crate. This module provides types
//! which abstract away the generation and encoding of RSA keys used for
//! signing certificates.
use rand_core::{CryptoRngCore, OsRng};
use rsa::{
    RsaPrivateKey,
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
    traits::PublicKeyParts,
};
use signature::Keypair;
use snafu::{ResultExt, Snafu};
use tracing::instrument;
use zeroize::Zeroizing;

use crate::{
    KeyEncoding, PEM_LINE_ENDING,
    keys::{CertificateKeypair, PKCS1_LABEL, PKCS8_LABEL, pem_label},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create RSA key"))]
    CreateKey { source: rsa::Error },

    #[snafu(display("failed to read PEM label"))]
    ReadPemLabel { source: x509_cert::der::Error },

    #[snafu(display("unsupported PEM label {label:?} for an RSA key"))]
    UnsupportedPemLabel { label: String },

    #[snafu(display("failed to deserialize the signing (private) key from PEM-encoded PKCS#1"))]
    DeserializePkcs1 { source: rsa::pkcs1::Error },

    #[snafu(display("failed to deserialize the signing (private) key from PEM-encoded PKCS#8"))]
    DeserializePkcs8 { source: rsa::pkcs8::Error },

    #[snafu(display("failed to serialize the signing (private) key as PEM-encoded PKCS#1"))]
    SerializePkcs1 { source: rsa::pkcs1::Error },

    #[snafu(display("failed to serialize the signing (private) key as PEM-encoded PKCS#8"))]
    SerializePkcs8 { source: rsa::pkcs8::Error },

    #[snafu(display("RSA keys cannot be encoded as {encoding}"))]
    UnsupportedEncoding { encoding: KeyEncoding },
}

#[derive(Debug)]
pub struct SigningKey {
    private_key: RsaPrivateKey,
    signing_key: rsa::pkcs1v15::SigningKey<sha2::Sha256>,
}

impl SigningKey {
    /// Generates a new RSA key with the default random-number generator
    /// [`OsRng`].
    ///
    /// It should be noted that the generation of the key takes longer for
    /// larger key sizes. The generation of an RSA key with a key size of
    /// `4096` can take up to multiple seconds.
    #[instrument(name = "create_rsa_signing_key")]
    pub fn new(bits: usize) -> Result<Self> {
        let mut csprng = OsRng;
        Self::new_with_rng(&mut csprng, bits)
    }

    /// Generates a new RSA key with a custom random-number generator.
    #[instrument(name = "create_rsa_signing_key_custom_rng", skip(rng))]
    pub fn new_with_rng<Rng>(rng: &mut Rng, bits: usize) -> Result<Self>
    where
        Rng: CryptoRngCore + ?Sized,
    {
        let private_key = RsaPrivateKey::new(rng, bits).context(CreateKeySnafu)?;
        Ok(Self::from_private_key(private_key))
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key.clone());

        Self {
            private_key,
            signing_key,
        }
    }
}

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type Signature = rsa::pkcs1v15::Signature;
    type SigningKey = rsa::pkcs1v15::SigningKey<sha2::Sha256>;
    type VerifyingKey = rsa::pkcs1v15::VerifyingKey<sha2::Sha256>;

    fn signing_key(&self) -> &Self::SigningKey {
        &self.signing_key
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        self.signing_key.verifying_key()
    }

    #[instrument(name = "create_rsa_signing_key_from_pem", skip(input))]
    fn from_pem(input: &str) -> Result<Self> {
        let label = pem_label(input).context(ReadPemLabelSnafu)?;

        let private_key = match label {
            PKCS1_LABEL => RsaPrivateKey::from_pkcs1_pem(input).context(DeserializePkcs1Snafu)?,
            PKCS8_LABEL => RsaPrivateKey::from_pkcs8_pem(input).context(DeserializePkcs8Snafu)?,
            _ => return UnsupportedPemLabelSnafu { label }.fail(),
        };

        Ok(Self::from_private_key(private_key))
    }

    fn to_pem(&self, encoding: KeyEncoding) -> Result<Zeroizing<String>> {
        match encoding {
            KeyEncoding::Pkcs1 => self
                .private_key
                .to_pkcs1_pem(PEM_LINE_ENDING)
                .context(SerializePkcs1Snafu),
            KeyEncoding::Pkcs8 => self
                .private_key
                .to_pkcs8_pem(PEM_LINE_ENDING)
                .context(SerializePkcs8Snafu),
            KeyEncoding::Sec1 => UnsupportedEncodingSnafu { encoding }.fail(),
        }
    }


    fn key_size(&self) -> usize {
        self.private_key.size() * 8
    }
}
