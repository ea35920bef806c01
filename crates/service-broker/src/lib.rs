//! The template resolution and patch engine of the service broker.
//!
//! A [`Template`](template::Template) is a raw structured document plus an
//! ordered list of [`Parameter`](template::Parameter)s. Rendering resolves every
//! parameter against a per-instance registry [`Entry`](registry::Entry) and the
//! static [`Configuration`](config::Configuration), generates secrets where
//! asked to, and applies the results either to the registry or to the document
//! as JSON patch `add` operations.
//!
//! ```
//! use serde_json::json;
//! use service_broker::{config::Configuration, registry::MemoryEntry, render::Renderer};
//!
//! let configuration = Configuration::from_yaml_str(
//!     r#"
//! catalog:
//!   services: []
//! templates:
//!   - name: secret
//!     template:
//!       apiVersion: v1
//!       kind: Secret
//!     parameters:
//!       - name: name
//!         required: true
//!         source:
//!           parameter: /name
//!         destinations:
//!           - path: /metadata/name
//! "#,
//! )
//! .unwrap();
//!
//! let mut entry = MemoryEntry::with_parameters(json!({"name": "db-credentials"}));
//! let rendered = Renderer::new(&configuration)
//!     .render_named("secret", &mut entry)
//!     .unwrap();
//!
//! assert_eq!(rendered.document["metadata"]["name"], "db-credentials");
//! ```
pub mod accessor;
pub mod config;
pub mod error;
pub mod format;
pub mod generate;
pub mod patch;
pub mod registry;
pub mod render;
pub mod template;

pub use error::ErrorCategory;
