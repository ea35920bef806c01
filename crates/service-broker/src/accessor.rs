//! Resolves a single [`Accessor`] against a registry [`Entry`].
//!
//! A lookup miss (absent key, pointer which resolves to nothing or to an
//! explicit `null`) yields [`None`] and is never an error. A syntactically
//! invalid pointer, an entry without client parameters and a failing registry
//! are.
use jsonptr::Pointer;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::trace;

use crate::{
    ErrorCategory,
    registry::{self, Entry, Namespace},
    template::Accessor,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse parameter path {pointer:?} as JSON pointer"))]
    ParsePointer {
        source: jsonptr::ParseError,
        pointer: String,
    },

    #[snafu(display("failed to read registry key {key:?}"))]
    ReadUser {
        source: registry::Error,
        key: String,
    },

    #[snafu(display("failed to read client parameters from the registry"))]
    ReadParameters { source: registry::Error },

    #[snafu(display("cannot resolve parameter path {pointer:?}, no client parameters are set"))]
    ParametersUnset { pointer: String },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParsePointer { .. } => ErrorCategory::Configuration,
            Self::ParametersUnset { .. } => ErrorCategory::Parameter,
            Self::ReadUser { source, .. } | Self::ReadParameters { source } => source.category(),
        }
    }
}

/// Resolves `accessor` to a value.
pub fn resolve<E>(accessor: &Accessor, entry: &E) -> Result<Option<Value>>
where
    E: Entry + ?Sized,
{
    match accessor {
        Accessor::Registry(key) => {
            let value = entry.get_user(key).context(ReadUserSnafu { key })?;
            trace!(registry.key = key.as_str(), found = value.is_some(), "resolved registry key");
            Ok(value.map(Value::String))
        }
        Accessor::Parameter(pointer) => {
            let parsed = Pointer::parse(pointer.as_str()).context(ParsePointerSnafu { pointer })?;

            let parameters = entry
                .get(Namespace::Parameters)
                .context(ReadParametersSnafu)?
                .context(ParametersUnsetSnafu { pointer })?;

            // An explicit null is the same as an absent member.
            let value = lookup(&parameters, parsed)
                .filter(|value| !value.is_null())
                .cloned();
            trace!(parameter.path = pointer.as_str(), found = value.is_some(), "resolved parameter");
            Ok(value)
        }
    }
}

/// Walks `pointer` through `value`. Object members are matched by their
/// decoded key, array elements by a decimal index.
pub(crate) fn lookup<'v>(value: &'v Value, pointer: &Pointer) -> Option<&'v Value> {
    pointer
        .tokens()
        .try_fold(value, |current, token| match current {
            Value::Object(map) => map.get(token.decoded().as_ref()),
            Value::Array(items) => token
                .decoded()
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::registry::MemoryEntry;

    fn entry() -> MemoryEntry {
        let mut entry = MemoryEntry::with_parameters(json!({
            "name": "db",
            "nodes": [{"size": 3}, {"size": 5}, null],
            "unset": null,
            "a/b": {"~tilde": true},
        }));
        entry.set_user("password", "s3cr3t".to_owned()).unwrap();
        entry
    }

    #[rstest]
    #[case(Accessor::Registry("password".to_owned()), Some(json!("s3cr3t")))]
    #[case(Accessor::Registry("missing".to_owned()), None)]
    #[case(Accessor::Parameter("/name".to_owned()), Some(json!("db")))]
    #[case(Accessor::Parameter("/nodes/1/size".to_owned()), Some(json!(5)))]
    #[case(Accessor::Parameter("/a~1b/~0tilde".to_owned()), Some(json!(true)))]
    #[case(Accessor::Parameter("".to_owned()), Some(entry().get(Namespace::Parameters).unwrap().unwrap()))]
    #[case(Accessor::Parameter("/nodes/7/size".to_owned()), None)]
    #[case(Accessor::Parameter("/nodes/first".to_owned()), None)]
    #[case(Accessor::Parameter("/name/length".to_owned()), None)]
    #[case(Accessor::Parameter("/missing".to_owned()), None)]
    #[case(Accessor::Parameter("/unset".to_owned()), None)]
    #[case(Accessor::Parameter("/nodes/2".to_owned()), None)]
    fn resolves(#[case] accessor: Accessor, #[case] expected: Option<Value>) {
        assert_eq!(resolve(&accessor, &entry()).unwrap(), expected);
    }

    #[test]
    fn malformed_pointer_is_an_error() {
        let err = resolve(&Accessor::Parameter("name".to_owned()), &entry()).unwrap_err();
        assert!(matches!(err, Error::ParsePointer { .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn unset_parameters_namespace_is_an_error() {
        let accessor = Accessor::Parameter("/name".to_owned());
        let err = resolve(&accessor, &MemoryEntry::new()).unwrap_err();
        assert!(matches!(err, Error::ParametersUnset { .. }), "unexpected error: {err}");
        assert_eq!(err.category(), ErrorCategory::Parameter);

        let accessor = Accessor::Registry("password".to_owned());
        assert_eq!(resolve(&accessor, &MemoryEntry::new()).unwrap(), None);
    }
}
