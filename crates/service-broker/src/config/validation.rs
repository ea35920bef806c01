//! Checks run once when a [`Configuration`] is loaded, so that operator
//! mistakes surface at startup instead of on the first request which happens
//! to render the broken template.
use std::{collections::BTreeSet, fmt::Display};

use jsonptr::Pointer;
use service_broker_certs::{
    KeyEncoding, KeyType,
    keys::MIN_RSA_KEY_SIZE,
};
use snafu::{ResultExt, Snafu};

use crate::{
    config::Configuration,
    format,
    template::{Accessor, Destination, KeySource, Parameter, Source},
};

type Result<T = (), E = Errors> = std::result::Result<T, E>;

/// A collection of errors discovered during validation.
#[derive(Debug)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn errors(&self) -> &[Error] {
        &self.0
    }
}

impl Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

/// A single validation error.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("template {name:?} is defined more than once"))]
    DuplicateTemplate { name: String },

    #[snafu(display("service ID {id:?} is defined more than once"))]
    DuplicateService { id: String },

    #[snafu(display("plan ID {id:?} of service {service:?} is defined more than once"))]
    DuplicatePlan { service: String, id: String },

    #[snafu(display("binding {binding:?} references unknown service {service:?}"))]
    UnknownService { binding: String, service: String },

    #[snafu(display("binding {binding:?} references unknown plan {plan:?} of service {service:?}"))]
    UnknownPlan {
        binding: String,
        service: String,
        plan: String,
    },

    #[snafu(display("{location} references unknown template {template:?}"))]
    UnknownTemplate { location: String, template: String },

    #[snafu(display("{location} has an invalid JSON pointer {pointer:?}"))]
    InvalidPointer {
        source: jsonptr::ParseError,
        location: String,
        pointer: String,
    },

    #[snafu(display("{location} is rendered into the registry only and cannot have path destinations"))]
    PathDestination { location: String },

    #[snafu(display("{location} generates passwords from an empty dictionary"))]
    EmptyDictionary { location: String },

    #[snafu(display("{location} cannot encode {key_type} keys as {encoding}"))]
    KeyEncodingMismatch {
        location: String,
        key_type: KeyType,
        encoding: KeyEncoding,
    },

    #[snafu(display("{location} cannot generate {key_type} keys with {bits} bits"))]
    KeySize {
        location: String,
        key_type: KeyType,
        bits: usize,
    },

    #[snafu(display("{location} has an invalid format string"))]
    InvalidFormat {
        source: format::Error,
        location: String,
    },
}

impl Configuration {
    /// Returns [`Ok`] if the configuration is consistent, otherwise returns all
    /// errors.
    pub fn validate(&self) -> Result {
        let mut errors = Vec::new();

        let mut template_names = BTreeSet::new();
        for template in &self.templates {
            if !template_names.insert(template.name.as_str()) {
                errors.push(Error::DuplicateTemplate {
                    name: template.name.clone(),
                });
            }
        }

        let mut service_ids = BTreeSet::new();
        for service in &self.catalog.services {
            if !service_ids.insert(service.id.as_str()) {
                errors.push(Error::DuplicateService {
                    id: service.id.clone(),
                });
            }

            let mut plan_ids = BTreeSet::new();
            for plan in &service.plans {
                if !plan_ids.insert(plan.id.as_str()) {
                    errors.push(Error::DuplicatePlan {
                        service: service.name.clone(),
                        id: plan.id.clone(),
                    });
                }
            }
        }

        for template in &self.templates {
            for parameter in &template.parameters {
                let location = format!(
                    "parameter {:?} of template {:?}",
                    parameter.name, template.name
                );
                self.validate_parameter(&location, parameter, &mut errors);
            }
        }

        for binding in &self.bindings {
            match self
                .catalog
                .services
                .iter()
                .find(|service| service.name == binding.service)
            {
                None => errors.push(Error::UnknownService {
                    binding: binding.name.clone(),
                    service: binding.service.clone(),
                }),
                Some(service) if !service.plans.iter().any(|plan| plan.name == binding.plan) => {
                    errors.push(Error::UnknownPlan {
                        binding: binding.name.clone(),
                        service: binding.service.clone(),
                        plan: binding.plan.clone(),
                    })
                }
                Some(_) => {}
            }

            let resources = [
                ("service instance", &binding.service_instance),
                ("service binding", &binding.service_binding),
            ];
            for (resource_type, resource) in resources {
                let Some(resource) = resource else {
                    continue;
                };

                for template in &resource.templates {
                    if self.template(template).is_none() {
                        errors.push(Error::UnknownTemplate {
                            location: format!("{resource_type} of binding {:?}", binding.name),
                            template: template.clone(),
                        });
                    }
                }

                for parameter in &resource.registry {
                    let location = format!(
                        "registry parameter {:?} of the {resource_type} of binding {:?}",
                        parameter.name, binding.name
                    );
                    if parameter
                        .destinations
                        .iter()
                        .any(|destination| matches!(destination, Destination::Path(_)))
                    {
                        errors.push(Error::PathDestination {
                            location: location.clone(),
                        });
                    }
                    self.validate_parameter(&location, parameter, &mut errors);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Errors(errors))
        }
    }

    fn validate_parameter(&self, location: &str, parameter: &Parameter, errors: &mut Vec<Error>) {
        for destination in &parameter.destinations {
            if let Destination::Path(pointer) = destination {
                errors.extend(validate_pointer(location, pointer).err());
            }
        }

        let Some(source) = &parameter.source else {
            return;
        };

        for accessor in source.accessors() {
            if let Accessor::Parameter(pointer) = accessor {
                errors.extend(validate_pointer(location, pointer).err());
            }
        }

        match source {
            Source::Template(template) if self.template(template).is_none() => {
                errors.push(Error::UnknownTemplate {
                    location: location.to_owned(),
                    template: template.clone(),
                });
            }
            Source::Format(format_source) => {
                let arguments = format_source.parameters.len();
                let checked = format::count_verbs(&format_source.string).and_then(|verbs| {
                    if verbs == arguments {
                        Ok(())
                    } else {
                        Err(format::Error::ArgumentCount { verbs, arguments })
                    }
                });
                errors.extend(checked.context(InvalidFormatSnafu { location }).err());
            }
            Source::GeneratePassword(password)
                if password
                    .dictionary
                    .as_ref()
                    .is_some_and(|dictionary| dictionary.is_empty()) =>
            {
                errors.push(Error::EmptyDictionary {
                    location: location.to_owned(),
                });
            }
            Source::GenerateKey(key) => errors.extend(validate_key(location, key).err()),
            _ => {}
        }
    }
}

fn validate_pointer(location: &str, pointer: &str) -> Result<(), Error> {
    Pointer::parse(pointer)
        .map(|_| ())
        .context(InvalidPointerSnafu { location, pointer })
}

fn validate_key(location: &str, key: &KeySource) -> Result<(), Error> {
    if !key.encoding.supports(key.key_type) {
        return KeyEncodingMismatchSnafu {
            location,
            key_type: key.key_type,
            encoding: key.encoding,
        }
        .fail();
    }

    match (key.key_type, key.bits) {
        (KeyType::Rsa, Some(bits)) if bits < MIN_RSA_KEY_SIZE => KeySizeSnafu {
            location,
            key_type: key.key_type,
            bits,
        }
        .fail(),
        (KeyType::EcdsaP256, Some(bits)) if bits != 256 => KeySizeSnafu {
            location,
            key_type: key.key_type,
            bits,
        }
        .fail(),
        _ => Ok(()),
    }
}
