//! Turns resolved parameter values into registry writes and JSON patch `add`
//! operations, and applies those operations to template documents.
//!
//! In contrast to plain RFC 6902 `add`, applying an operation creates every
//! missing intermediate object or array along its path first. The kind of a
//! created container is derived from the following token: an array index or
//! `-` creates an array, anything else an object. Arrays are padded with
//! `null` up to the addressed index, by at most [`MAX_ARRAY_PADDING`]
//! elements.
use json_patch::{AddOperation, Patch, PatchOperation};
use jsonptr::{Pointer, PointerBuf, Token};
use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, trace};

use crate::{
    ErrorCategory,
    registry::{self, Entry},
    template::Destination,
};

/// How many `null` elements may be inserted to reach an array index beyond
/// the end of an existing array.
pub const MAX_ARRAY_PADDING: usize = 1024;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "parameter {parameter:?} cannot be written to registry key {key:?}, only strings can be stored"
    ))]
    ParameterType { parameter: String, key: String },

    #[snafu(display("failed to write registry key {key:?}"))]
    WriteRegistry {
        source: registry::Error,
        key: String,
    },

    #[snafu(display("failed to parse destination path {path:?} as JSON pointer"))]
    ParsePointer {
        source: jsonptr::ParseError,
        path: String,
    },

    #[snafu(display("{operation:?} operations are not supported, only \"add\" is"))]
    UnsupportedOperation { operation: &'static str },

    #[snafu(display("cannot descend into {path:?}, it is neither an object nor an array"))]
    NotAContainer { path: String },

    #[snafu(display("{token:?} at {path:?} is not a valid array index"))]
    InvalidIndex { path: String, token: String },

    #[snafu(display("failed to add value at {path:?}"))]
    Apply {
        source: json_patch::PatchError,
        path: String,
    },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParameterType { .. } => ErrorCategory::Parameter,
            Self::WriteRegistry { source, .. } => source.category(),
            Self::ParsePointer { .. }
            | Self::UnsupportedOperation { .. }
            | Self::NotAContainer { .. }
            | Self::InvalidIndex { .. }
            | Self::Apply { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Writes `value` to all registry destinations and collects all path
/// destinations into one patch, in declaration order.
///
/// Registry writes take effect immediately and are added to
/// `registry_writes` one by one, so the count stays accurate when a later
/// write fails. Returns [`None`] if there are no path destinations.
pub fn build<E>(
    parameter: &str,
    value: &Value,
    destinations: &[Destination],
    entry: &mut E,
    registry_writes: &mut usize,
) -> Result<Option<Patch>>
where
    E: Entry + ?Sized,
{
    for destination in destinations {
        let Destination::Registry(key) = destination else {
            continue;
        };

        let Value::String(value) = value else {
            return ParameterTypeSnafu { parameter, key }.fail();
        };
        entry
            .set_user(key, value.clone())
            .context(WriteRegistrySnafu { key })?;
        *registry_writes += 1;
        debug!(parameter.name = parameter, registry.key = key.as_str(), "wrote registry key");
    }

    let operations = destinations
        .iter()
        .filter_map(|destination| match destination {
            Destination::Path(path) => Some(path),
            Destination::Registry(_) => None,
        })
        .map(|path| -> Result<PatchOperation> {
            Ok(PatchOperation::Add(AddOperation {
                path: Pointer::parse(path.as_str())
                    .context(ParsePointerSnafu { path })?
                    .to_buf(),
                value: value.clone(),
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((!operations.is_empty()).then_some(Patch(operations)))
}

/// Applies `patch` to a copy of `document` and returns the patched copy.
///
/// If any operation fails the copy is discarded, so a patch is applied either
/// completely or not at all.
pub fn apply(document: &Value, patch: &Patch) -> Result<Value> {
    let mut patched = document.clone();

    for operation in &patch.0 {
        let PatchOperation::Add(add) = operation else {
            return UnsupportedOperationSnafu {
                operation: operation_name(operation),
            }
            .fail();
        };

        let path = ensure_path_exists(&mut patched, &add.path)?;
        trace!(patch.path = path.as_str(), "applying add operation");

        json_patch::patch(
            &mut patched,
            &[PatchOperation::Add(AddOperation {
                path: path.clone(),
                value: add.value.clone(),
            })],
        )
        .context(ApplySnafu {
            path: path.as_str(),
        })?;
    }

    Ok(patched)
}

/// Creates all missing parents of the location `path` points to, and returns
/// `path` with every `-` in a parent position replaced by the index of the
/// array element created for it.
fn ensure_path_exists(document: &mut Value, path: &Pointer) -> Result<PointerBuf> {
    let tokens = path.tokens().collect::<Vec<_>>();
    let Some((last, parents)) = tokens.split_last() else {
        return Ok(path.to_buf());
    };

    let mut resolved = PointerBuf::new();
    let mut current = document;

    for (position, token) in parents.iter().enumerate() {
        let next = tokens.get(position + 1).unwrap_or(last);
        let container = if is_array_token(next) {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };

        current = match current {
            Value::Object(map) => {
                resolved.push_back(token.clone());
                let child = map
                    .entry(token.decoded().into_owned())
                    .or_insert(Value::Null);
                if child.is_null() {
                    *child = container;
                }
                child
            }
            Value::Array(items) => {
                let decoded = token.decoded();
                let index = match decoded.as_ref() {
                    "-" => items.len(),
                    index => index
                        .parse::<usize>()
                        .ok()
                        .filter(|index| *index <= items.len().saturating_add(MAX_ARRAY_PADDING))
                        .context(InvalidIndexSnafu {
                            path: resolved.as_str(),
                            token: index,
                        })?,
                };

                if index >= items.len() {
                    items.resize(index + 1, Value::Null);
                }
                if items[index].is_null() {
                    items[index] = container;
                }

                resolved.push_back(Token::new(index.to_string()));
                &mut items[index]
            }
            _ => {
                return NotAContainerSnafu {
                    path: resolved.as_str(),
                }
                .fail();
            }
        };
    }

    resolved.push_back(last.clone());
    Ok(resolved)
}

fn is_array_token(token: &Token<'_>) -> bool {
    let decoded = token.decoded();
    decoded == "-" || (!decoded.is_empty() && decoded.bytes().all(|byte| byte.is_ascii_digit()))
}

fn operation_name(operation: &PatchOperation) -> &'static str {
    match operation {
        PatchOperation::Add(_) => "add",
        PatchOperation::Remove(_) => "remove",
        PatchOperation::Replace(_) => "replace",
        PatchOperation::Move(_) => "move",
        PatchOperation::Copy(_) => "copy",
        PatchOperation::Test(_) => "test",
    }
}

#[cfg(test)]
mod tests {
    use json_patch::RemoveOperation;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::registry::MemoryEntry;

    fn add(path: &str, value: Value) -> Patch {
        Patch(vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::parse(path).unwrap(),
            value,
        })])
    }

    #[rstest]
    #[case(json!({}), "/a/b/c", json!({"a": {"b": {"c": 1}}}))]
    #[case(json!({"a": {"x": true}}), "/a/b", json!({"a": {"x": true, "b": 1}}))]
    #[case(json!({}), "/items/0/name", json!({"items": [{"name": 1}]}))]
    #[case(json!({}), "/items/-/name", json!({"items": [{"name": 1}]}))]
    #[case(json!({"items": [0]}), "/items/-", json!({"items": [0, 1]}))]
    #[case(json!({"items": [0]}), "/items/0", json!({"items": [1, 0]}))]
    #[case(json!({}), "/list/2/x", json!({"list": [null, null, {"x": 1}]}))]
    #[case(json!({"a": null}), "/a/b", json!({"a": {"b": 1}}))]
    #[case(json!({"a": 0}), "/a", json!({"a": 1}))]
    #[case(json!({"old": true}), "", json!(1))]
    #[case(json!({}), "/a~1b/c~0d", json!({"a/b": {"c~d": 1}}))]
    fn apply_creates_structure(
        #[case] document: Value,
        #[case] path: &str,
        #[case] expected: Value,
    ) {
        let patched = apply(&document, &add(path, json!(1))).unwrap();
        assert_eq!(patched, expected);
    }

    #[test]
    fn apply_leaves_original_untouched_on_failure() {
        let document = json!({"a": "scalar"});
        let patch = Patch(vec![
            PatchOperation::Add(AddOperation {
                path: PointerBuf::parse("/b").unwrap(),
                value: json!(1),
            }),
            PatchOperation::Add(AddOperation {
                path: PointerBuf::parse("/a/b/c").unwrap(),
                value: json!(2),
            }),
        ]);

        let err = apply(&document, &patch).unwrap_err();
        assert!(matches!(err, Error::NotAContainer { .. }), "unexpected error: {err}");
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(document, json!({"a": "scalar"}));
    }

    #[rstest]
    #[case(json!({"items": []}), "/items/first/name")]
    #[case(json!({}), "/items/18446744073709551615/x")]
    #[case(json!({}), "/items/99999999999/x")]
    #[case(json!({"items": [0]}), "/items/1026/x")]
    fn apply_rejects_invalid_array_index(#[case] document: Value, #[case] path: &str) {
        let err = apply(&document, &add(path, json!(1))).unwrap_err();
        assert!(matches!(err, Error::InvalidIndex { .. }), "unexpected error: {err}");
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn apply_pads_up_to_the_limit() {
        let path = format!("/items/{MAX_ARRAY_PADDING}/x");
        let patched = apply(&json!({}), &add(&path, json!(1))).unwrap();
        let items = patched["items"].as_array().unwrap();
        assert_eq!(items.len(), MAX_ARRAY_PADDING + 1);
        assert_eq!(items[MAX_ARRAY_PADDING], json!({"x": 1}));
    }

    #[test]
    fn apply_rejects_other_operations() {
        let patch = Patch(vec![PatchOperation::Remove(RemoveOperation {
            path: PointerBuf::parse("/a").unwrap(),
        })]);
        let err = apply(&json!({"a": 1}), &patch).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedOperation {
                operation: "remove"
            }
        ));
    }

    #[test]
    fn build_splits_destinations() {
        let mut entry = MemoryEntry::new();
        let destinations = [
            Destination::Path("/stringData/password".to_owned()),
            Destination::Registry("password".to_owned()),
            Destination::Path("/metadata/annotations/password".to_owned()),
        ];

        let mut writes = 0;
        let patch = build("password", &json!("s3cr3t"), &destinations, &mut entry, &mut writes)
            .unwrap()
            .unwrap();

        assert_eq!(writes, 1);
        assert_eq!(entry.get_user("password").unwrap().as_deref(), Some("s3cr3t"));
        let paths = patch
            .0
            .iter()
            .map(|operation| match operation {
                PatchOperation::Add(add) => add.path.as_str(),
                _ => panic!("unexpected operation {operation:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(paths, ["/stringData/password", "/metadata/annotations/password"]);
    }

    #[test]
    fn build_without_paths() {
        let mut entry = MemoryEntry::new();
        let destinations = [Destination::Registry("name".to_owned())];
        assert!(
            build("name", &json!("db"), &destinations, &mut entry, &mut 0)
                .unwrap()
                .is_none()
        );
        assert!(build("name", &json!("db"), &[], &mut entry, &mut 0).unwrap().is_none());
    }

    #[test]
    fn build_rejects_non_string_registry_values() {
        let mut entry = MemoryEntry::new();
        let destinations = [Destination::Registry("replicas".to_owned())];

        let err = build("replicas", &json!(3), &destinations, &mut entry, &mut 0).unwrap_err();
        assert!(matches!(err, Error::ParameterType { .. }));
        assert_eq!(err.category(), ErrorCategory::Parameter);
        assert_eq!(entry.get_user("replicas").unwrap(), None);
    }

    #[test]
    fn build_rejects_malformed_paths() {
        let mut entry = MemoryEntry::new();
        let destinations = [Destination::Path("spec/replicas".to_owned())];

        let err = build("replicas", &json!(3), &destinations, &mut entry, &mut 0).unwrap_err();
        assert!(matches!(err, Error::ParsePointer { .. }));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    /// Rejects writes to a single key and stores everything else.
    struct ReadOnlyKey {
        key: &'static str,
        inner: MemoryEntry,
    }

    impl Entry for ReadOnlyKey {
        fn get_user(&self, key: &str) -> registry::Result<Option<String>> {
            self.inner.get_user(key)
        }

        fn set_user(&mut self, key: &str, value: String) -> registry::Result<()> {
            if key == self.key {
                return Err(registry::Error::backend(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only key",
                )));
            }
            self.inner.set_user(key, value)
        }

        fn get(&self, namespace: registry::Namespace) -> registry::Result<Option<Value>> {
            self.inner.get(namespace)
        }
    }

    #[test]
    fn build_counts_writes_before_a_failing_one() {
        let mut entry = ReadOnlyKey {
            key: "second",
            inner: MemoryEntry::new(),
        };
        let destinations = [
            Destination::Registry("first".to_owned()),
            Destination::Registry("second".to_owned()),
            Destination::Registry("third".to_owned()),
        ];

        let mut writes = 0;
        let err = build("token", &json!("abc"), &destinations, &mut entry, &mut writes)
            .unwrap_err();
        assert!(matches!(err, Error::WriteRegistry { .. }), "unexpected error: {err}");
        assert_eq!(err.category(), ErrorCategory::Registry);
        assert_eq!(writes, 1);
        assert_eq!(entry.get_user("first").unwrap().as_deref(), Some("abc"));
        assert_eq!(entry.get_user("third").unwrap(), None);
    }
}
