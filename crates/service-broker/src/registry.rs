//! The registry is a per-instance key/value store which bridges the stateless
//! request/response cycles of the broker API. Every service instance (and
//! every service binding) owns exactly one [`Entry`], which is created,
//! persisted and destroyed by the provisioning layer. The engine only reads and
//! writes through the [`Entry`] trait.
//!
//! An entry is partitioned into two namespaces:
//!
//! - [`Namespace::Parameters`] holds the request body supplied by the client.
//!   It is written once per request and read many times.
//! - [`Namespace::User`] holds broker-internal string values such as generated
//!   secrets and cross-call bookkeeping.
use std::collections::BTreeMap;

use serde_json::Value;
use snafu::{Snafu, ensure};
use strum::Display;

use crate::ErrorCategory;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum Namespace {
    Parameters,
    User,
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the {namespace} namespace is write-once and has already been set"))]
    AlreadySet { namespace: Namespace },

    #[snafu(display("the registry backend failed"))]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    /// Wraps an error of a registry implementation.
    pub fn backend(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend {
            source: Box::new(source),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Registry
    }
}

/// Access to the registry entry of a single service instance or binding.
///
/// Calls are synchronous from the point of view of the engine. Implementations
/// are responsible for serializing concurrent access to the same entry.
pub trait Entry {
    /// Looks up `key` in the [`Namespace::User`] namespace. A missing key is
    /// not an error.
    fn get_user(&self, key: &str) -> Result<Option<String>>;

    /// Writes `key` into the [`Namespace::User`] namespace, replacing any
    /// previous value.
    fn set_user(&mut self, key: &str, value: String) -> Result<()>;

    /// Returns the whole namespace as a generic JSON value, [`None`] if it was
    /// never written.
    fn get(&self, namespace: Namespace) -> Result<Option<Value>>;
}

/// An [`Entry`] kept in memory. It is used by tests and by tools which render
/// templates outside of a running broker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryEntry {
    parameters: Option<Value>,
    user: BTreeMap<String, String>,
}

impl MemoryEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(parameters: Value) -> Self {
        Self {
            parameters: Some(parameters),
            ..Self::default()
        }
    }

    /// Stores the client-supplied request body. The parameters namespace can
    /// only be written once.
    pub fn set_parameters(&mut self, parameters: Value) -> Result<()> {
        ensure!(
            self.parameters.is_none(),
            AlreadySetSnafu {
                namespace: Namespace::Parameters
            }
        );

        self.parameters = Some(parameters);
        Ok(())
    }

    pub fn user(&self) -> &BTreeMap<String, String> {
        &self.user
    }
}

impl Entry for MemoryEntry {
    fn get_user(&self, key: &str) -> Result<Option<String>> {
        Ok(self.user.get(key).cloned())
    }

    fn set_user(&mut self, key: &str, value: String) -> Result<()> {
        self.user.insert(key.to_owned(), value);
        Ok(())
    }

    fn get(&self, namespace: Namespace) -> Result<Option<Value>> {
        Ok(match namespace {
            Namespace::Parameters => self.parameters.clone(),
            Namespace::User => Some(Value::Object(
                self.user
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect(),
            )),
        })
    }
}
