//! Renders templates: every parameter is resolved, defaulted, checked and
//! applied in declaration order, folding the patched document forward.
//!
//! Rendering stops at the first error. Registry writes made for parameters
//! which were processed before the failing one are kept, callers must assume
//! that a failed render left the user namespace of the entry partially
//! updated.
use rand::{CryptoRng, Rng, rngs::ThreadRng};
use serde::Serialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, instrument, warn};

use crate::{
    ErrorCategory, accessor,
    config::{Configuration, ResourceType},
    format, generate, patch,
    registry::Entry,
    template::{Destination, Parameter, Template},
};

mod source;

/// How deeply template references may nest before rendering is aborted.
pub const DEFAULT_MAX_DEPTH: usize = 16;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("template {name:?} does not exist"))]
    TemplateNotFound { name: String },

    #[snafu(display("template references form a cycle: {cycle}"))]
    TemplateCycle { cycle: String },

    #[snafu(display(
        "template {template:?} is nested deeper than the maximum of {max_depth} levels"
    ))]
    RecursionLimit { template: String, max_depth: usize },

    #[snafu(display("no binding is configured for service {service_id:?} and plan {plan_id:?}"))]
    BindingNotFound { service_id: String, plan_id: String },

    #[snafu(display("binding {binding:?} has no {resource_type} configured"))]
    ResourceNotConfigured {
        binding: String,
        resource_type: ResourceType,
    },

    #[snafu(display("registry parameter {parameter:?} cannot have path destinations"))]
    RegistryPathDestination { parameter: String },

    #[snafu(display("parameter {parameter:?} is required but has no value"))]
    ParameterRequired { parameter: String },

    #[snafu(display("failed to resolve parameter {parameter:?}"))]
    Access {
        source: accessor::Error,
        parameter: String,
    },

    #[snafu(display("failed to format parameter {parameter:?}"))]
    Format {
        source: format::Error,
        parameter: String,
    },

    #[snafu(display("failed to generate a value for parameter {parameter:?}"))]
    Generate {
        source: generate::Error,
        parameter: String,
    },

    #[snafu(display("failed to apply parameter {parameter:?}"))]
    Patch {
        source: patch::Error,
        parameter: String,
    },

    #[snafu(display("failed to render template {template:?} referenced by parameter {parameter:?}"))]
    NestedTemplate {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        template: String,
        parameter: String,
    },

    #[snafu(display("failed to render template {template:?} of the {resource_type}"))]
    ResourceTemplate {
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        template: String,
        resource_type: ResourceType,
    },
}

impl Error {
    /// The category of the innermost cause.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TemplateNotFound { .. }
            | Self::TemplateCycle { .. }
            | Self::RecursionLimit { .. }
            | Self::BindingNotFound { .. }
            | Self::ResourceNotConfigured { .. }
            | Self::RegistryPathDestination { .. }
            | Self::Format { .. } => ErrorCategory::Configuration,
            Self::ParameterRequired { .. } => ErrorCategory::Parameter,
            Self::Access { source, .. } => source.category(),
            Self::Generate { source, .. } => source.category(),
            Self::Patch { source, .. } => source.category(),
            Self::NestedTemplate { source, .. } | Self::ResourceTemplate { source, .. } => {
                source.category()
            }
        }
    }

    /// The name of the required parameter which had no value, at any nesting
    /// depth.
    pub fn missing_parameter(&self) -> Option<&str> {
        match self {
            Self::ParameterRequired { parameter } => Some(parameter.as_str()),
            Self::NestedTemplate { source, .. } | Self::ResourceTemplate { source, .. } => {
                source.missing_parameter()
            }
            _ => None,
        }
    }
}

/// The fully resolved document of a template, ready to be submitted by the
/// provisioning layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedTemplate {
    pub name: String,
    pub singleton: bool,
    pub document: Value,
}

/// Renders templates of a [`Configuration`].
///
/// Rendering is a function of the configuration, the entry and the random
/// source only. Passing a seeded RNG makes generated passwords reproducible.
pub struct Renderer<'c, R = ThreadRng> {
    configuration: &'c Configuration,
    rng: R,
    max_depth: usize,
}

/// Bookkeeping of a single top-level render call.
#[derive(Default)]
struct RenderState {
    /// Names of the templates currently being rendered, outermost first.
    stack: Vec<String>,
    registry_writes: usize,
}

impl<'c> Renderer<'c, ThreadRng> {
    /// Creates a renderer which draws randomness from the thread-local CSPRNG.
    pub fn new(configuration: &'c Configuration) -> Self {
        Self::with_rng(configuration, rand::rng())
    }
}

impl<'c, R> Renderer<'c, R>
where
    R: CryptoRng + Rng,
{
    pub fn with_rng(configuration: &'c Configuration, rng: R) -> Self {
        Self {
            configuration,
            rng,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Renders `template` against `entry`. The template itself is not
    /// modified, the rendered document is a fresh copy.
    pub fn render<E>(&mut self, template: &Template, entry: &mut E) -> Result<RenderedTemplate>
    where
        E: Entry + ?Sized,
    {
        let mut state = RenderState::default();
        let rendered = self.render_template(template, entry, &mut state);
        warn_on_partial_writes(&rendered, &state);
        rendered
    }

    /// Renders the template called `name` of the configuration.
    pub fn render_named<E>(&mut self, name: &str, entry: &mut E) -> Result<RenderedTemplate>
    where
        E: Entry + ?Sized,
    {
        let configuration = self.configuration;
        let template = configuration
            .template(name)
            .context(TemplateNotFoundSnafu { name })?;
        self.render(template, entry)
    }

    /// Resolves `parameters` which only write to the registry, such as the
    /// registry parameters of a binding.
    #[instrument(name = "render_registry", skip_all, fields(parameters = parameters.len()))]
    pub fn render_registry<E>(&mut self, parameters: &[Parameter], entry: &mut E) -> Result<()>
    where
        E: Entry + ?Sized,
    {
        let mut state = RenderState::default();
        let result = parameters.iter().try_for_each(|parameter| {
            ensure!(
                parameter
                    .destinations
                    .iter()
                    .all(|destination| matches!(destination, Destination::Registry(_))),
                RegistryPathDestinationSnafu {
                    parameter: &parameter.name
                }
            );

            // Without path destinations no patch is built, the document stays
            // untouched.
            self.apply_parameter(parameter, Value::Null, entry, &mut state)
                .map(drop)
        });
        warn_on_partial_writes(&result, &state);
        result
    }

    /// Renders everything the binding of the given catalog service and plan
    /// declares for `resource_type`: first the registry parameters, then all
    /// templates in order.
    #[instrument(name = "render_resource", skip(self, entry))]
    pub fn render_resource<E>(
        &mut self,
        service_id: &str,
        plan_id: &str,
        resource_type: ResourceType,
        entry: &mut E,
    ) -> Result<Vec<RenderedTemplate>>
    where
        E: Entry + ?Sized,
    {
        let configuration = self.configuration;
        let binding = configuration
            .binding(service_id, plan_id)
            .context(BindingNotFoundSnafu {
                service_id,
                plan_id,
            })?;
        let resource = binding
            .resource(resource_type)
            .context(ResourceNotConfiguredSnafu {
                binding: &binding.name,
                resource_type,
            })?;

        debug!(
            binding.name = %binding.name,
            resource.registry = resource.registry.len(),
            resource.templates = resource.templates.len(),
            "rendering resource"
        );

        self.render_registry(&resource.registry, entry)?;
        resource
            .templates
            .iter()
            .map(|template| {
                self.render_named(template, entry)
                    .context(ResourceTemplateSnafu {
                        template,
                        resource_type,
                    })
            })
            .collect()
    }

    #[instrument(
        name = "render_template",
        skip_all,
        fields(template.name = %template.name, template.depth = state.stack.len()),
    )]
    fn render_template<E>(
        &mut self,
        template: &Template,
        entry: &mut E,
        state: &mut RenderState,
    ) -> Result<RenderedTemplate>
    where
        E: Entry + ?Sized,
    {
        if state.stack.contains(&template.name) {
            let cycle = state
                .stack
                .iter()
                .chain([&template.name])
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            return TemplateCycleSnafu { cycle }.fail();
        }
        ensure!(
            state.stack.len() < self.max_depth,
            RecursionLimitSnafu {
                template: &template.name,
                max_depth: self.max_depth,
            }
        );

        state.stack.push(template.name.clone());
        let document = template
            .parameters
            .iter()
            .try_fold(template.document.clone(), |document, parameter| {
                self.apply_parameter(parameter, document, entry, state)
            });
        state.stack.pop();

        let document = document?;
        debug!("rendered template");
        Ok(RenderedTemplate {
            name: template.name.clone(),
            singleton: template.singleton,
            document,
        })
    }

    /// Resolves `parameter` and applies it to the registry and to `document`.
    /// A parameter without a value leaves both untouched.
    fn apply_parameter<E>(
        &mut self,
        parameter: &Parameter,
        document: Value,
        entry: &mut E,
        state: &mut RenderState,
    ) -> Result<Value>
    where
        E: Entry + ?Sized,
    {
        let Some(value) = self.resolve_parameter(parameter, entry, state)? else {
            return Ok(document);
        };

        let patch = patch::build(
            &parameter.name,
            &value,
            &parameter.destinations,
            entry,
            &mut state.registry_writes,
        )
        .context(PatchSnafu {
            parameter: &parameter.name,
        })?;

        match patch {
            Some(patch) => patch::apply(&document, &patch).context(PatchSnafu {
                parameter: &parameter.name,
            }),
            None => Ok(document),
        }
    }
}

fn warn_on_partial_writes<T>(result: &Result<T>, state: &RenderState) {
    if state.registry_writes == 0 {
        return;
    }
    if let Err(err) = result {
        warn!(
            error = %err,
            registry.writes = state.registry_writes,
            "render failed after writing to the registry, the writes are kept"
        );
    }
}
