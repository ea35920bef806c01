//! The static configuration of the broker: the service catalog, the templates
//! and the bindings which connect a service plan to the templates rendered for
//! its instances and bindings.
//!
//! A [`Configuration`] is loaded once and then only ever borrowed. It is passed
//! into the [`Renderer`](crate::render::Renderer) explicitly, rendering never
//! reaches for process-wide state.
use std::path::Path;

use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use strum::{Display, EnumString};
use tracing::{debug, instrument};

use crate::{
    ErrorCategory,
    template::{Parameter, Template},
};

pub mod validation;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read configuration file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    #[snafu(display("failed to deserialize configuration"))]
    Deserialize { source: serde_yaml::Error },

    #[snafu(display("invalid configuration: {source}"))]
    Validate { source: validation::Errors },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Configuration {
    pub catalog: Catalog,

    #[serde(default)]
    pub templates: Vec<Template>,

    #[serde(default)]
    pub bindings: Vec<ConfigurationBinding>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Catalog {
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Service {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub bindable: bool,

    #[serde(default)]
    pub plans: Vec<Plan>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Plan {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,
}

/// Connects a service plan, referenced by the catalog names of the service and
/// the plan, to the resources rendered for it.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigurationBinding {
    pub name: String,
    pub service: String,
    pub plan: String,

    #[serde(default)]
    pub service_instance: Option<ResourceTemplates>,

    #[serde(default)]
    pub service_binding: Option<ResourceTemplates>,
}

impl ConfigurationBinding {
    pub fn resource(&self, resource_type: ResourceType) -> Option<&ResourceTemplates> {
        match resource_type {
            ResourceType::ServiceInstance => self.service_instance.as_ref(),
            ResourceType::ServiceBinding => self.service_binding.as_ref(),
        }
    }
}

/// What is rendered for one resource type of a plan.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceTemplates {
    /// Parameters rendered into the registry before any template. They may only
    /// have registry destinations.
    #[serde(default)]
    pub registry: Vec<Parameter>,

    /// Names of the templates to render, in order.
    #[serde(default)]
    pub templates: Vec<String>,
}

#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum ResourceType {
    ServiceInstance,
    ServiceBinding,
}

impl Configuration {
    /// Deserializes and validates a configuration from YAML (or JSON, which is
    /// a subset of YAML).
    #[instrument(name = "load_configuration", skip_all)]
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let configuration: Self = serde_yaml::from_str(input).context(DeserializeSnafu)?;
        configuration.validate().context(ValidateSnafu)?;

        debug!(
            configuration.services = configuration.catalog.services.len(),
            configuration.templates = configuration.templates.len(),
            configuration.bindings = configuration.bindings.len(),
            "loaded configuration"
        );
        Ok(configuration)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_yaml_str(&input)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|template| template.name == name)
    }

    pub fn service(&self, service_id: &str) -> Option<&Service> {
        self.catalog
            .services
            .iter()
            .find(|service| service.id == service_id)
    }

    /// Returns the display name of the service with the catalog ID `service_id`.
    pub fn service_name(&self, service_id: &str) -> Option<&str> {
        self.service(service_id).map(|service| service.name.as_str())
    }

    /// Returns the display name of the plan with the catalog ID `plan_id`.
    pub fn plan_name(&self, service_id: &str, plan_id: &str) -> Option<&str> {
        self.service(service_id)?
            .plans
            .iter()
            .find(|plan| plan.id == plan_id)
            .map(|plan| plan.name.as_str())
    }

    /// Looks up the binding for the service and plan with the given catalog IDs.
    pub fn binding(&self, service_id: &str, plan_id: &str) -> Option<&ConfigurationBinding> {
        let service_name = self.service_name(service_id)?;
        let plan_name = self.plan_name(service_id, plan_id)?;

        self.bindings
            .iter()
            .find(|binding| binding.service == service_name && binding.plan == plan_name)
    }
}
