//! Renders templates of a broker configuration without a running broker, so
//! that template authors can check what a request would produce.
//!
//! Rendered documents are written to stdout as a YAML stream, logs go to
//! stderr. The log level is controlled by `BROKER_RENDER_LOG`.
use std::{io::Write, path::PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use service_broker::{
    config::{self, Configuration, ResourceType},
    registry::{self, Entry, MemoryEntry},
    render::{self, RenderedTemplate, Renderer},
};
use snafu::{ResultExt, Snafu};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "BROKER_RENDER_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to load configuration"))]
    LoadConfiguration { source: config::Error },

    #[snafu(display("failed to read parameters file {path:?}"))]
    ReadParameters {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse parameters"))]
    ParseParameters { source: serde_yaml::Error },

    #[snafu(display("failed to prepare the registry entry"))]
    PrepareEntry { source: registry::Error },

    #[snafu(display("failed to render ({category})"))]
    Render {
        source: render::Error,
        category: service_broker::ErrorCategory,
    },

    #[snafu(display("failed to serialize rendered document {name:?}"))]
    SerializeDocument {
        source: serde_yaml::Error,
        name: String,
    },

    #[snafu(display("failed to write to stdout"))]
    WriteOutput { source: std::io::Error },
}

#[derive(Debug, Parser)]
#[command(about, version)]
struct Cli {
    /// The broker configuration (YAML or JSON).
    #[arg(long, short)]
    config: PathBuf,

    /// Client parameters as inline YAML or JSON, e.g. '{name: orders}'.
    /// Defaults to an empty object.
    #[arg(long, conflicts_with = "parameters_file")]
    parameters: Option<String>,

    /// Read the client parameters from a YAML or JSON file.
    #[arg(long)]
    parameters_file: Option<PathBuf>,

    /// Pre-populate a key of the registry. Can be given multiple times.
    #[arg(long = "registry", value_name = "KEY=VALUE", value_parser = parse_registry_value)]
    registry: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a single template by name.
    Template { name: String },

    /// Render everything the binding of a catalog service and plan declares
    /// for a resource type.
    Resource {
        /// The catalog ID of the service.
        #[arg(long)]
        service: String,

        /// The catalog ID of the plan.
        #[arg(long)]
        plan: String,

        /// Either service-instance or service-binding.
        #[arg(long, default_value = "service-instance")]
        resource_type: ResourceType,
    },
}

fn parse_registry_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got {input:?}")),
    }
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    initialize_logging();

    let configuration = Configuration::from_file(&cli.config).context(LoadConfigurationSnafu)?;
    let mut entry = entry(&cli)?;
    let mut renderer = Renderer::new(&configuration);

    let rendered = match &cli.command {
        Command::Template { name } => renderer
            .render_named(name, &mut entry)
            .map(|rendered| vec![rendered]),
        Command::Resource {
            service,
            plan,
            resource_type,
        } => renderer.render_resource(service, plan, *resource_type, &mut entry),
    }
    .map_err(|source| Error::Render {
        category: source.category(),
        source,
    })?;

    info!(
        documents = rendered.len(),
        registry.keys = entry.user().len(),
        "rendered"
    );
    write_documents(&rendered)
}

fn initialize_logging() {
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn entry(cli: &Cli) -> Result<MemoryEntry, Error> {
    let parameters = match (&cli.parameters, &cli.parameters_file) {
        (Some(inline), _) => Some(inline.clone()),
        (None, Some(path)) => {
            Some(std::fs::read_to_string(path).context(ReadParametersSnafu { path })?)
        }
        (None, None) => None,
    };

    // Without parameters the request is rendered like one with an empty body.
    let parameters = match parameters {
        Some(parameters) => serde_yaml::from_str(&parameters).context(ParseParametersSnafu)?,
        None => Value::Object(Map::new()),
    };

    let mut entry = MemoryEntry::new();
    entry
        .set_parameters(parameters)
        .context(PrepareEntrySnafu)?;
    for (key, value) in &cli.registry {
        entry
            .set_user(key, value.clone())
            .context(PrepareEntrySnafu)?;
    }

    Ok(entry)
}

fn write_documents(rendered: &[RenderedTemplate]) -> Result<(), Error> {
    let mut stdout = std::io::stdout().lock();
    for template in rendered {
        let document = serde_yaml::to_string(&template.document).context(SerializeDocumentSnafu {
            name: &template.name,
        })?;
        write!(stdout, "---\n# {}\n{document}", template.name).context(WriteOutputSnafu)?;
    }

    stdout.flush().context(WriteOutputSnafu)
}
