use rand::{CryptoRng, Rng};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, instrument};

use super::{
    AccessSnafu, FormatSnafu, GenerateSnafu, NestedTemplateSnafu, ParameterRequiredSnafu,
    RenderState, Renderer, Result, TemplateNotFoundSnafu,
};
use crate::{
    accessor, format, generate,
    registry::Entry,
    template::{DefaultValue, Parameter, Source},
};

impl<R> Renderer<'_, R>
where
    R: CryptoRng + Rng,
{
    /// Resolves the value of `parameter`, falling back to its default.
    ///
    /// Returns [`None`] for an optional parameter without a value and fails
    /// for a required one.
    pub(super) fn resolve_parameter<E>(
        &mut self,
        parameter: &Parameter,
        entry: &mut E,
        state: &mut RenderState,
    ) -> Result<Option<Value>>
    where
        E: Entry + ?Sized,
    {
        let resolved = match &parameter.source {
            Some(source) => self.resolve_source(&parameter.name, source, entry, state)?,
            None => None,
        };
        let from_source = resolved.is_some();

        let value = resolved.or_else(|| parameter.default.as_ref().map(DefaultValue::to_value));
        debug!(
            parameter.name = %parameter.name,
            parameter.from_source = from_source,
            parameter.found = value.is_some(),
            "resolved parameter"
        );

        match value {
            Some(value) => Ok(Some(value)),
            None if parameter.required => ParameterRequiredSnafu {
                parameter: &parameter.name,
            }
            .fail(),
            None => Ok(None),
        }
    }

    fn resolve_source<E>(
        &mut self,
        parameter: &str,
        source: &Source,
        entry: &mut E,
        state: &mut RenderState,
    ) -> Result<Option<Value>>
    where
        E: Entry + ?Sized,
    {
        match source {
            Source::Accessor(accessor) => {
                accessor::resolve(accessor, &*entry).context(AccessSnafu { parameter })
            }
            Source::Format(format_source) => {
                let mut arguments = Vec::with_capacity(format_source.parameters.len());
                for accessor in &format_source.parameters {
                    // One unset argument leaves the whole string unset.
                    let Some(argument) =
                        accessor::resolve(accessor, &*entry).context(AccessSnafu { parameter })?
                    else {
                        return Ok(None);
                    };
                    arguments.push(argument);
                }

                format::format(&format_source.string, &arguments)
                    .map(|formatted| Some(Value::String(formatted)))
                    .context(FormatSnafu { parameter })
            }
            Source::GeneratePassword(password) => {
                generate::generate_password(&mut self.rng, password)
                    .map(|password| Some(Value::String(password)))
                    .context(GenerateSnafu { parameter })
            }
            Source::GenerateKey(key) => generate::generate_key(key)
                .map(|key| Some(Value::String(key)))
                .context(GenerateSnafu { parameter }),
            Source::GenerateCertificate(certificate) => {
                generate::generate_certificate(certificate, &*entry)
                    .map(|certificate| Some(Value::String(certificate)))
                    .context(GenerateSnafu { parameter })
            }
            Source::Template(name) => self
                .resolve_template(name, entry, state)
                .map(Some)
                .context(NestedTemplateSnafu {
                    template: name,
                    parameter,
                }),
        }
    }

    /// Renders the referenced template against the same entry and uses its
    /// document as value.
    #[instrument(name = "resolve_template_reference", skip(self, entry, state))]
    fn resolve_template<E>(
        &mut self,
        name: &str,
        entry: &mut E,
        state: &mut RenderState,
    ) -> Result<Value>
    where
        E: Entry + ?Sized,
    {
        let configuration = self.configuration;
        let template = configuration
            .template(name)
            .context(TemplateNotFoundSnafu { name })?;

        self.render_template(template, entry, state)
            .map(|rendered| rendered.document)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;

    use crate::{
        config::Configuration,
        registry::{Entry, MemoryEntry},
        render::{Error, Renderer},
    };

    const CONFIGURATION: &str = indoc! {"
        catalog: {}
        templates:
          - name: host
            template: {}
            parameters:
              - name: host
                source:
                  format:
                    string: '%s.%s.svc'
                    parameters:
                      - parameter: /name
                      - registry: namespace
                destinations:
                  - path: /host
          - name: child
            template:
              kind: Child
            parameters:
              - name: size
                required: true
                source:
                  parameter: /size
                destinations:
                  - path: /size
          - name: parent
            template:
              kind: Parent
            parameters:
              - name: child
                source:
                  template: child
                destinations:
                  - path: /spec/child
    "};

    fn render(name: &str, entry: &mut MemoryEntry) -> Result<serde_json::Value, Error> {
        let configuration = Configuration::from_yaml_str(CONFIGURATION).unwrap();
        Renderer::with_rng(&configuration, StdRng::seed_from_u64(0))
            .render_named(name, entry)
            .map(|rendered| rendered.document)
    }

    #[test]
    fn format_substitutes_all_arguments() {
        let mut entry = MemoryEntry::with_parameters(json!({"name": "db"}));
        entry.set_user("namespace", "default".to_owned()).unwrap();

        assert_eq!(
            render("host", &mut entry).unwrap(),
            json!({"host": "db.default.svc"})
        );
    }

    #[test]
    fn format_short_circuits_on_unset_argument() {
        let mut entry = MemoryEntry::with_parameters(json!({"name": "db"}));
        assert_eq!(render("host", &mut entry).unwrap(), json!({}));
    }

    #[test]
    fn format_treats_null_arguments_as_unset() {
        let mut entry = MemoryEntry::with_parameters(json!({"name": null}));
        entry.set_user("namespace", "default".to_owned()).unwrap();

        assert_eq!(render("host", &mut entry).unwrap(), json!({}));
    }

    #[test]
    fn template_reference_embeds_the_rendered_document() {
        let mut entry = MemoryEntry::with_parameters(json!({"size": 3}));
        assert_eq!(
            render("parent", &mut entry).unwrap(),
            json!({"kind": "Parent", "spec": {"child": {"kind": "Child", "size": 3}}})
        );
    }

    #[test]
    fn template_reference_propagates_missing_parameters() {
        let mut entry = MemoryEntry::with_parameters(json!({}));
        let err = render("parent", &mut entry).unwrap_err();

        assert!(matches!(err, Error::NestedTemplate { .. }), "unexpected error: {err}");
        assert_eq!(err.missing_parameter(), Some("size"));
        assert_eq!(err.category(), crate::ErrorCategory::Parameter);
    }
}
