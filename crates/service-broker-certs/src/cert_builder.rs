use std::{str::FromStr, time::Duration};

use bon::Builder;
use const_oid::db::rfc5280::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH};
use signature::Keypair;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument};
use x509_cert::{
    Certificate,
    builder::{Builder, Profile},
    der::asn1::Ia5String,
    ext::pkix::{ExtendedKeyUsage, SubjectAltName, name::GeneralName},
    name::Name,
    serial_number::SerialNumber,
    spki::{EncodePublicKey, SubjectPublicKeyInfoOwned},
    time::Validity,
};

use crate::{
    KeyType, Usage,
    ca::CertificateAuthority,
    keys::{CertificateKeypair, PrivateKey},
};

/// The default certificate validity time span of one year.
pub const DEFAULT_CERTIFICATE_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Defines all error variants which can occur when creating a certificate
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse validity"))]
    ParseValidity { source: x509_cert::der::Error },

    #[snafu(display("failed to parse common name {common_name:?} as subject"))]
    ParseSubject {
        source: x509_cert::der::Error,
        common_name: String,
    },

    #[snafu(display("failed to read the public key of the certificate key"))]
    ReadPublicKey { source: crate::keys::Error },

    #[snafu(display("failed to create certificate builder"))]
    CreateCertificateBuilder { source: x509_cert::builder::Error },

    #[snafu(display("failed to add certificate extension"))]
    AddCertificateExtension { source: x509_cert::builder::Error },

    #[snafu(display(
        "failed to parse subject alternative DNS name {subject_alternative_dns_name:?} as a Ia5 string"
    ))]
    ParseSubjectAlternativeDnsName {
        subject_alternative_dns_name: String,
        source: x509_cert::der::Error,
    },

    #[snafu(display(
        "failed to parse subject alternative email address {subject_alternative_email:?} as a Ia5 string"
    ))]
    ParseSubjectAlternativeEmail {
        subject_alternative_email: String,
        source: x509_cert::der::Error,
    },

    #[snafu(display("failed to build certificate"))]
    BuildCertificate { source: x509_cert::builder::Error },

    #[snafu(display(
        "the generated certificate for {common_name:?} would outlive the signing CA {ca_subject}"
    ))]
    CertOutlivesCa {
        common_name: String,
        ca_subject: String,
    },
}

/// This builder builds X.509 [`Certificate`]s.
///
/// The certificate binds the public half of `key`. Without `signed_by` the
/// certificate is self-signed with `key`, otherwise it is issued and signed by
/// the given [`CertificateAuthority`].
///
/// The [`Usage`] selects the profile:
///
/// - [`Usage::Ca`] creates a root (self-signed) or intermediate (CA-signed)
///   certificate with CA basic constraints and the `keyCertSign` usage.
/// - [`Usage::Server`] and [`Usage::Client`] create leaf certificates with the
///   matching extended key usage.
///
/// ```no_run
/// use service_broker_certs::{CertificateBuilder, KeyType, Usage, keys::PrivateKey};
///
/// let key = PrivateKey::generate(KeyType::EcdsaP256, None).unwrap();
/// let certificate = CertificateBuilder::builder()
///     .common_name("db")
///     .usage(Usage::Server)
///     .key(&key)
///     .build()
///     .expect("failed to build certificate");
/// ```
#[derive(Builder)]
#[builder(start_fn = start_builder, finish_fn = finish_builder)]
pub struct CertificateBuilder<'a> {
    /// Required common name (`CN`) of the subject.
    common_name: &'a str,

    /// Optional list of subject alternative name DNS entries.
    #[builder(default)]
    subject_alternative_dns_names: &'a [String],

    /// Optional list of subject alternative name email entries.
    #[builder(default)]
    subject_alternative_emails: &'a [String],

    /// Validity/lifetime of the certificate.
    ///
    /// If not specified the default of [`DEFAULT_CERTIFICATE_VALIDITY`] will be used.
    #[builder(default = DEFAULT_CERTIFICATE_VALIDITY)]
    validity: Duration,

    #[builder(default)]
    usage: Usage,

    /// The key which is bound to the certificate.
    key: &'a PrivateKey,

    /// Sign the certificate using the provided [`CertificateAuthority`]
    /// instead of self-signing it.
    signed_by: Option<&'a CertificateAuthority>,
}

impl<'a> CertificateBuilder<'a> {
    pub fn builder() -> CertificateBuilderBuilder<'a> {
        Self::start_builder()
    }
}

impl<S> CertificateBuilderBuilder<'_, S>
where
    S: certificate_builder_builder::IsComplete,
{
    /// Convenience function to avoid calling `builder().finish_builder().build()`
    pub fn build(self) -> Result<Certificate, Error> {
        self.finish_builder().build()
    }
}

impl CertificateBuilder<'_> {
    #[instrument(
        name = "build_certificate",
        skip(self),
        fields(common_name = self.common_name, usage = %self.usage),
    )]
    pub fn build(self) -> Result<Certificate, Error> {
        let validity = Validity::from_now(self.validity).context(ParseValiditySnafu)?;
        let subject = subject_from_common_name(self.common_name)?;

        // By choosing a random serial number we can make the reasonable assumption that we generate
        // a unique serial for each certificate.
        let serial_number = SerialNumber::from(rand::random::<u64>());

        if let Some(ca) = self.signed_by {
            let ca_not_after = ca.ca_cert().tbs_certificate.validity.not_after.to_system_time();
            ensure!(
                ca_not_after >= validity.not_after.to_system_time(),
                CertOutlivesCaSnafu {
                    common_name: self.common_name,
                    ca_subject: ca.subject().to_string(),
                }
            );
        }

        let spki = self
            .key
            .subject_public_key_info()
            .context(ReadPublicKeySnafu)?;

        let issuer = match self.signed_by {
            Some(ca) => ca.subject().clone(),
            None => subject.clone(),
        };
        let profile = match (self.usage, self.signed_by) {
            (Usage::Ca, None) => Profile::Root,
            (Usage::Ca, Some(_)) => Profile::SubCA {
                issuer,
                path_len_constraint: None,
            },
            (Usage::Server | Usage::Client, _) => Profile::Leaf {
                issuer,
                enable_key_agreement: false,
                enable_key_encipherment: self.key.key_type() == KeyType::Rsa,
            },
        };

        let extended_key_usage = match self.usage {
            Usage::Ca => None,
            Usage::Server => Some(ExtendedKeyUsage(vec![ID_KP_SERVER_AUTH])),
            Usage::Client => Some(ExtendedKeyUsage(vec![ID_KP_CLIENT_AUTH])),
        };

        let san_dns = self.subject_alternative_dns_names.iter().map(|dns_name| {
            Ok(GeneralName::DnsName(Ia5String::new(dns_name).with_context(
                |_| ParseSubjectAlternativeDnsNameSnafu {
                    subject_alternative_dns_name: dns_name.clone(),
                },
            )?))
        });
        let san_emails = self.subject_alternative_emails.iter().map(|email| {
            Ok(GeneralName::Rfc822Name(Ia5String::new(email).with_context(
                |_| ParseSubjectAlternativeEmailSnafu {
                    subject_alternative_email: email.clone(),
                },
            )?))
        });
        let sans = san_dns.chain(san_emails).collect::<Result<Vec<_>, Error>>()?;
        let sans = (!sans.is_empty()).then_some(SubjectAltName(sans));

        debug!(
            certificate.subject = %subject,
            certificate.not_after = %validity.not_after,
            certificate.not_before = %validity.not_before,
            certificate.serial = %serial_number,
            certificate.san.dns_names = ?self.subject_alternative_dns_names,
            certificate.san.emails = ?self.subject_alternative_emails,
            certificate.self_signed = self.signed_by.is_none(),
            certificate.public_key.algorithm = %self.key.key_type(),
            certificate.public_key.size = self.key.key_size(),
            "creating and signing certificate"
        );

        let parts = CertificateParts {
            profile,
            serial_number,
            validity,
            subject,
            spki,
            extended_key_usage,
            sans,
        };

        match self.signed_by.map_or(self.key, CertificateAuthority::key) {
            PrivateKey::Rsa(signer) => parts.sign(signer),
            PrivateKey::Ecdsa(signer) => parts.sign(signer),
        }
    }
}

/// Everything that goes into the to-be-signed certificate, independent of the
/// algorithm of the signing key.
struct CertificateParts {
    profile: Profile,
    serial_number: SerialNumber,
    validity: Validity,
    subject: Name,
    spki: SubjectPublicKeyInfoOwned,
    extended_key_usage: Option<ExtendedKeyUsage>,
    sans: Option<SubjectAltName>,
}

impl CertificateParts {
    fn sign<SKP>(self, signer: &SKP) -> Result<Certificate, Error>
    where
        SKP: CertificateKeypair,
        <SKP::SigningKey as Keypair>::VerifyingKey: EncodePublicKey,
    {
        let mut builder = x509_cert::builder::CertificateBuilder::new(
            self.profile,
            self.serial_number,
            self.validity,
            self.subject,
            self.spki,
            signer.signing_key(),
        )
        .context(CreateCertificateBuilderSnafu)?;

        if let Some(extended_key_usage) = &self.extended_key_usage {
            builder
                .add_extension(extended_key_usage)
                .context(AddCertificateExtensionSnafu)?;
        }

        if let Some(sans) = &self.sans {
            builder
                .add_extension(sans)
                .context(AddCertificateExtensionSnafu)?;
        }

        builder.build().context(BuildCertificateSnafu)
    }
}

/// Builds a subject containing only the common name. Characters with a
/// special meaning in RFC 4514 strings are escaped.
fn subject_from_common_name(common_name: &str) -> Result<Name, Error> {
    let mut escaped = String::with_capacity(common_name.len());
    for (index, chr) in common_name.chars().enumerate() {
        let leading = index == 0 && matches!(chr, ' ' | '#');
        if leading || matches!(chr, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(chr);
    }

    Name::from_str(&format!("CN={escaped}")).context(ParseSubjectSnafu { common_name })
}
