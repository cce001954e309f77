use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use schemaforge::backend::generator_for;
use schemaforge::{Backend, Introspector, Layer, Pipeline, RawSchema, SchemaConnector};
use std::fs;
use std::path::PathBuf;

mod config;
mod output;
mod postgres;
mod snapshot;

use config::ForgeConfig;
use postgres::PostgresConnector;
use snapshot::SnapshotFormat;

#[derive(Parser)]
#[command(name = "schemaforge")]
#[command(about = "Generate multi-layer backend projects from a PostgreSQL schema")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./schemaforge.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Introspect, build and write a complete project
    Generate {
        #[command(flatten)]
        source: SourceArgs,

        /// Target backend (dotnet, fastapi)
        #[arg(short, long)]
        backend: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Name of the generated project
        #[arg(long)]
        project_name: Option<String>,

        /// Connection string for the generated project (defaults to the database URL)
        #[arg(long)]
        app_connection_string: Option<String>,

        /// Worker threads for rendering
        #[arg(long)]
        threads: Option<usize>,

        /// Overwrite a non-empty output directory
        #[arg(long)]
        force: bool,
    },

    /// Write a catalog snapshot for offline generation
    Introspect {
        #[command(flatten)]
        source: SourceArgs,

        /// Snapshot file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Snapshot format; inferred from the output extension when omitted
        #[arg(short, long, value_enum)]
        format: Option<SnapshotFormat>,
    },

    /// Render one layer of one entity to stdout
    Preview {
        #[command(flatten)]
        source: SourceArgs,

        /// Target backend (dotnet, fastapi)
        #[arg(short, long)]
        backend: Option<String>,

        /// Entity or table name
        entity: String,

        /// Layer id (domain-entity, data-access, contract, validation, service, api-surface, project)
        #[arg(short, long, default_value = "domain-entity")]
        layer: String,
    },

    /// List available backends and their layers
    Backends,
}

#[derive(Args)]
struct SourceArgs {
    /// PostgreSQL URL to introspect
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Read the catalog from a JSON or YAML snapshot; takes precedence over the database URL
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Catalog schemas to read (repeatable)
    #[arg(long = "schema")]
    schemas: Vec<String>,
}

/// Where the catalog comes from
enum Source {
    Snapshot(RawSchema),
    Database(PostgresConnector),
}

impl Source {
    fn open(args: &SourceArgs, config: &ForgeConfig) -> Result<Self> {
        if let Some(path) = &args.snapshot {
            log::info!("Reading snapshot {}", path.display());
            return Ok(Source::Snapshot(snapshot::load(path)?));
        }

        let url = args
            .database_url
            .clone()
            .or_else(|| config.database_url.clone())
            .ok_or_else(|| anyhow!("No schema source: pass --database-url, set DATABASE_URL or use --snapshot"))?;
        let schemas = if args.schemas.is_empty() {
            config.schemas.clone()
        } else {
            args.schemas.clone()
        };
        Ok(Source::Database(PostgresConnector::new(url, schemas)))
    }

    fn connector(&self) -> &dyn SchemaConnector {
        match self {
            Source::Snapshot(schema) => schema,
            Source::Database(connector) => connector,
        }
    }

    fn database_url(&self, args: &SourceArgs, config: &ForgeConfig) -> Option<String> {
        match self {
            Source::Snapshot(_) => None,
            Source::Database(_) => args.database_url.clone().or_else(|| config.database_url.clone()),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let config = ForgeConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            source,
            backend,
            output,
            project_name,
            app_connection_string,
            threads,
            force,
        } => {
            let schema_source = Source::open(&source, &config)?;
            let backend = selected_backend(backend, &config)?;

            let mut request = config.request(&backend)?;
            if let Some(name) = project_name {
                request.project.project_name = name;
            }
            if let Some(connection) = app_connection_string {
                request.project.connection_string = connection;
            } else if config.app_connection_string.is_none() {
                if let Some(url) = schema_source.database_url(&source, &config) {
                    request.project.connection_string = url;
                }
            }
            if let Some(threads) = threads {
                request.render_threads = threads.max(1);
            }

            let output = output
                .or_else(|| config.output.clone())
                .unwrap_or_else(|| PathBuf::from("generated"));

            let pipeline = Pipeline::new(request)?;
            let outcome = pipeline.run(schema_source.connector())?;

            for diagnostic in outcome.diagnostics.iter() {
                println!("warning: {}", diagnostic);
            }
            let written = output::write_artifacts(&output, &outcome.artifacts, force)?;
            println!("Generated {} file(s) for {} in {}", written, outcome.backend, output.display());

            if !outcome.is_complete() {
                for failure in &outcome.failures {
                    eprintln!("error: {} ({}): {}", failure.entity, failure.layer, failure.error);
                }
                bail!("{} template(s) failed to render", outcome.failures.len());
            }
        }

        Commands::Introspect { source, output, format } => {
            let schema_source = Source::open(&source, &config)?;
            let mut connection = schema_source.connector().connect()?;
            let introspection = Introspector::new(&mut *connection).read()?;
            drop(connection);

            for diagnostic in introspection.diagnostics.iter() {
                eprintln!("warning: {}", diagnostic);
            }

            let format = format
                .or_else(|| output.as_deref().map(SnapshotFormat::from_path))
                .unwrap_or(SnapshotFormat::Json);
            let rendered = snapshot::render(&introspection.schema, format)?;
            match output {
                Some(path) => {
                    fs::write(&path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "Wrote {} table(s) to {}",
                        introspection.schema.tables.len(),
                        path.display()
                    );
                }
                None => println!("{}", rendered),
            }
        }

        Commands::Preview {
            source,
            backend,
            entity,
            layer,
        } => {
            let layer: Layer = layer.parse().map_err(|e: String| anyhow!(e))?;
            let schema_source = Source::open(&source, &config)?;
            let backend = selected_backend(backend, &config)?;

            let pipeline = Pipeline::new(config.request(&backend)?)?;
            for artifact in pipeline.preview(schema_source.connector(), &entity, layer)? {
                println!("==> {} <==", artifact.path);
                println!("{}", artifact.content);
            }
        }

        Commands::Backends => {
            for backend in Backend::ALL {
                let generator = generator_for(backend);
                let layers: Vec<&str> = generator.layers().iter().map(|l| l.as_str()).collect();
                println!("{:<10} {}", backend.id(), backend.description());
                println!("{:<10} aliases: {}", "", backend.aliases().join(", "));
                println!("{:<10} layers: {}", "", layers.join(", "));
            }
        }
    }

    Ok(())
}

fn selected_backend(flag: Option<String>, config: &ForgeConfig) -> Result<String> {
    flag.or_else(|| config.backend.clone())
        .ok_or_else(|| anyhow!("No backend selected: pass --backend or set `backend` in the config"))
}
