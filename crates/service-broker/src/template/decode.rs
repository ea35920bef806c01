//! Raw (all fields optional) representations of the tagged unions, which are
//! converted into the closed enums after checking that exactly one variant is
//! populated.
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use snafu::Snafu;

use crate::template::{
    Accessor, CertificateSource, DefaultValue, Destination, FormatSource, KeySource,
    PasswordSource, Source,
};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum DecodeError {
    #[snafu(display("{kind} must have exactly one of {expected} set, found {found}"))]
    VariantCount {
        kind: &'static str,
        expected: &'static str,
        found: usize,
    },
}

fn exactly_one<T>(
    kind: &'static str,
    expected: &'static str,
    candidates: impl IntoIterator<Item = Option<T>>,
) -> Result<T, DecodeError> {
    let present = candidates.into_iter().flatten().collect::<Vec<_>>();
    let found = present.len();

    let mut present = present.into_iter();
    match (present.next(), present.next()) {
        (Some(variant), None) => Ok(variant),
        _ => VariantCountSnafu {
            kind,
            expected,
            found,
        }
        .fail(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(super) struct RawAccessor {
    registry: Option<String>,
    parameter: Option<String>,
}

impl TryFrom<RawAccessor> for Accessor {
    type Error = DecodeError;

    fn try_from(raw: RawAccessor) -> Result<Self, Self::Error> {
        exactly_one(
            "accessor",
            "registry, parameter",
            [
                raw.registry.map(Accessor::Registry),
                raw.parameter.map(Accessor::Parameter),
            ],
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(super) struct RawSource {
    registry: Option<String>,
    parameter: Option<String>,
    format: Option<FormatSource>,
    generate_password: Option<PasswordSource>,
    generate_key: Option<KeySource>,
    generate_certificate: Option<CertificateSource>,
    template: Option<String>,
}

impl TryFrom<RawSource> for Source {
    type Error = DecodeError;

    fn try_from(raw: RawSource) -> Result<Self, Self::Error> {
        exactly_one(
            "source",
            "registry, parameter, format, generatePassword, generateKey, generateCertificate, template",
            [
                raw.registry
                    .map(|key| Source::Accessor(Accessor::Registry(key))),
                raw.parameter
                    .map(|pointer| Source::Accessor(Accessor::Parameter(pointer))),
                raw.format.map(Source::Format),
                raw.generate_password.map(Source::GeneratePassword),
                raw.generate_key.map(Source::GenerateKey),
                raw.generate_certificate.map(Source::GenerateCertificate),
                raw.template.map(Source::Template),
            ],
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(super) struct RawDestination {
    registry: Option<String>,
    path: Option<String>,
}

impl TryFrom<RawDestination> for Destination {
    type Error = DecodeError;

    fn try_from(raw: RawDestination) -> Result<Self, Self::Error> {
        exactly_one(
            "destination",
            "registry, path",
            [
                raw.registry.map(Destination::Registry),
                raw.path.map(Destination::Path),
            ],
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(super) struct RawDefaultValue {
    string: Option<String>,
    bool: Option<bool>,
    int: Option<i64>,
    object: Option<Value>,
}

impl TryFrom<RawDefaultValue> for DefaultValue {
    type Error = DecodeError;

    fn try_from(raw: RawDefaultValue) -> Result<Self, Self::Error> {
        exactly_one(
            "default",
            "string, bool, int, object",
            [
                raw.string.map(DefaultValue::String),
                raw.bool.map(DefaultValue::Bool),
                raw.int.map(DefaultValue::Int),
                raw.object.map(DefaultValue::Object),
            ],
        )
    }
}

pub(super) fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|input| humantime::parse_duration(&input).map_err(serde::de::Error::custom))
        .transpose()
}
