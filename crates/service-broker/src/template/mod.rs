//! The data model of templates as they are stored in the static
//! configuration.
//!
//! All tagged unions ([`Source`], [`Accessor`], [`Destination`] and
//! [`DefaultValue`]) are written as maps with exactly one key set, e.g.
//! `{registry: password}` or `{path: /spec/replicas}`. Decoding rejects maps
//! with zero or more than one variant.
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use service_broker_certs::{KeyEncoding, KeyType, Usage};

mod decode;

pub use decode::DecodeError;

/// A named, parameterized structured document describing a resource to
/// materialize.
///
/// Templates are immutable once loaded, rendering always operates on a copy of
/// [`Template::document`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Template {
    pub name: String,

    /// The raw body of the resource.
    #[serde(rename = "template")]
    pub document: Value,

    /// Parameters are resolved and applied in declaration order.
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// Whether the provisioning layer creates the resource once and shares it
    /// between all instances instead of creating one per instance.
    #[serde(default)]
    pub singleton: bool,
}

/// A declared slot of a [`Template`] whose value is computed at render time.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Parameter {
    pub name: String,

    #[serde(default)]
    pub source: Option<Source>,

    /// Used when the source yields no value.
    #[serde(default)]
    pub default: Option<DefaultValue>,

    /// Rendering fails if neither the source nor the default yields a value.
    #[serde(default)]
    pub required: bool,

    /// All destinations receive the same resolved value.
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

/// Where the value of a [`Parameter`] comes from.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "decode::RawSource")]
pub enum Source {
    Accessor(Accessor),
    Format(FormatSource),
    GeneratePassword(PasswordSource),
    GenerateKey(KeySource),
    GenerateCertificate(CertificateSource),

    /// The name of another template, which is rendered and used as value.
    Template(String),
}

/// A reference to a single named value.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "decode::RawAccessor")]
pub enum Accessor {
    /// A key in the user namespace of the registry.
    Registry(String),

    /// A JSON pointer (RFC 6901) into the client-supplied parameters.
    Parameter(String),
}

/// Where a resolved value is written to.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "decode::RawDestination")]
pub enum Destination {
    /// A key in the user namespace of the registry. Only strings can be stored.
    Registry(String),

    /// A JSON pointer (RFC 6901) into the template document.
    Path(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "decode::RawDefaultValue")]
pub enum DefaultValue {
    String(String),
    Bool(bool),
    Int(i64),
    Object(Value),
}

impl DefaultValue {
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(value) => Value::String(value.clone()),
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::from(*value),
            Self::Object(value) => value.clone(),
        }
    }
}

/// Positional string formatting, e.g. `%s.%s.svc` with two accessors.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormatSource {
    pub string: String,

    #[serde(default)]
    pub parameters: Vec<Accessor>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PasswordSource {
    pub length: usize,

    /// The characters to draw from, defaults to upper and lower case ASCII
    /// letters and digits.
    #[serde(default)]
    pub dictionary: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeySource {
    #[serde(rename = "type")]
    pub key_type: KeyType,

    pub encoding: KeyEncoding,

    #[serde(default)]
    pub bits: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CertificateSource {
    /// The PEM-encoded private key the certificate is issued for. Self-signed
    /// certificates are also signed with it.
    pub key: Accessor,

    pub name: CertificateName,

    /// Human readable lifetime, e.g. `8760h` or `365d`.
    #[serde(default, deserialize_with = "decode::optional_duration")]
    pub lifetime: Option<Duration>,

    #[serde(default)]
    pub usage: Usage,

    #[serde(default)]
    pub alternative_names: AlternativeNames,

    /// Sign with this CA instead of self-signing.
    #[serde(default)]
    pub ca: Option<CertificateAuthoritySource>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CertificateName {
    pub common_name: String,
}

/// Every accessor resolves to one name. Accessors without a value are
/// skipped.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AlternativeNames {
    #[serde(default)]
    pub dns: Vec<Accessor>,

    #[serde(default)]
    pub email: Vec<Accessor>,
}

/// The PEM-encoded key and certificate of a CA. Both must resolve.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CertificateAuthoritySource {
    pub key: Accessor,
    pub certificate: Accessor,
}

impl Source {
    /// The accessors this source reads from, in resolution order.
    pub fn accessors(&self) -> Vec<&Accessor> {
        match self {
            Self::Accessor(accessor) => vec![accessor],
            Self::Format(format) => format.parameters.iter().collect(),
            Self::GenerateCertificate(certificate) => {
                let names = &certificate.alternative_names;
                let mut accessors = vec![&certificate.key];
                accessors.extend(names.dns.iter().chain(&names.email));
                if let Some(ca) = &certificate.ca {
                    accessors.extend([&ca.key, &ca.certificate]);
                }
                accessors
            }
            Self::GeneratePassword(_) | Self::GenerateKey(_) | Self::Template(_) => {
                Vec::new()
            }
        }
    }
}
