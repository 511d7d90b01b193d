//! apigraph CLI - extract the public API surface of a package

use anyhow::{bail, Context};
use apigraph::config::resolve_config;
use apigraph::engine::{GoModule, MavenProject, PyProject};
use apigraph::toolchain::ToolchainSpec;
use apigraph::ui::{self, Icons};
use apigraph::{
    ApiIndex, CrossLanguageMap, EngineContext, EngineResult, GoEngine, GraphEngine, JavaEngine,
    Language, PythonEngine, Target,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_ENV: &str = "APIGRAPH_LOG";

#[derive(Parser)]
#[command(name = "apigraph")]
#[command(version)]
#[command(about = "Public API graph engine - canonical API surfaces for Python, Go and Java")]
#[command(long_about = r#"
apigraph extracts the public surface of a package (types, members,
signatures, docs) into one canonical JSON index, whatever the language.

Example usage:
  apigraph graph python --path ./sdk --prune
  apigraph graph java --manifest ./sdk/pom.xml --stubs
  apigraph usage --index api.json --samples ./samples python
  apigraph doctor
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./apigraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the API index of a package
    Graph {
        /// python, go or java
        language: Language,

        /// Source tree to analyze in-process
        #[arg(short, long, conflicts_with = "manifest")]
        path: Option<PathBuf>,

        /// Build manifest (pyproject.toml, go.mod, pom.xml) for the external analyzer
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Compiled classes directory (java manifests only)
        #[arg(long, requires = "manifest")]
        classes: Option<PathBuf>,

        /// Render language stubs instead of JSON
        #[arg(long, conflicts_with = "json")]
        stubs: bool,

        /// Render JSON (the default)
        #[arg(long)]
        json: bool,

        /// Drop types no entry point can reach
        #[arg(long)]
        prune: bool,

        /// Cross-language id mapping file
        #[arg(long)]
        map: Option<PathBuf>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the metadata fingerprint of a source tree
    Fingerprint {
        /// Directory to fingerprint
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Only count this language's files
        #[arg(short, long)]
        language: Option<Language>,
    },

    /// Report which client operations sample programs exercise
    Usage {
        /// Sample language
        language: Language,

        /// API index JSON produced by `graph`
        #[arg(short, long)]
        index: PathBuf,

        /// Directory holding the sample programs
        #[arg(short, long)]
        samples: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which external analyzers are available
    Doctor {
        /// Check one language only
        language: Option<Language>,

        /// Ignore cached results
        #[arg(long)]
        refresh: bool,
    },
}

struct GraphArgs {
    stubs: bool,
    prune: bool,
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = resolve_config(cli.config.as_deref())?;
    tracing::debug!(?config, "Resolved configuration");

    match cli.command {
        Commands::Graph {
            language,
            path,
            manifest,
            classes,
            stubs,
            json: _,
            prune,
            map,
            output,
        } => {
            let map = map
                .map(|p| {
                    CrossLanguageMap::load(&p)
                        .with_context(|| format!("Failed to load id map {}", p.display()))
                })
                .transpose()?;
            let args = GraphArgs { stubs, prune, output };
            let ctx = EngineContext::new(config);
            let source = path.unwrap_or_else(|| PathBuf::from("."));

            match language {
                Language::Python => {
                    let target = match manifest {
                        Some(pyproject) => Target::Manifest(PyProject { pyproject }),
                        None => Target::Source(source),
                    };
                    run_graph(&PythonEngine::new(ctx), &target, map.as_ref(), &args)?;
                }
                Language::Go => {
                    let target = match manifest {
                        Some(go_mod) => Target::Manifest(GoModule { go_mod }),
                        None => Target::Source(source),
                    };
                    run_graph(&GoEngine::new(ctx), &target, map.as_ref(), &args)?;
                }
                Language::Java => {
                    let target = match manifest {
                        Some(pom) => Target::Manifest(MavenProject {
                            pom,
                            classes_dir: classes,
                        }),
                        None => Target::Source(source),
                    };
                    run_graph(&JavaEngine::new(ctx), &target, map.as_ref(), &args)?;
                }
            }
        }

        Commands::Fingerprint { path, language } => {
            let extensions: Vec<&str> = match language {
                Some(language) => language.extensions().to_vec(),
                None => Language::all().iter().flat_map(|l| l.extensions()).copied().collect(),
            };
            let fingerprint =
                apigraph::fingerprint::compute_with_excludes(&path, &extensions, &config.exclude)?;
            if fingerprint.is_empty() {
                ui::warn(&format!("No {} files under {}", extensions.join("/"), path.display()));
            } else {
                ui::header(&format!("{} {}", Icons::FINGERPRINT, path.display()));
            }
            println!("{}", fingerprint);
        }

        Commands::Usage {
            language,
            index,
            samples,
            json,
        } => {
            let contents = std::fs::read_to_string(&index)
                .with_context(|| format!("Failed to read index {}", index.display()))?;
            let api = ApiIndex::from_json(&contents)?;
            let report = apigraph::usage::analyze(&api, &samples, language)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            ui::header(&format!("{} {}", Icons::TARGET, api.package));
            ui::summary_row("Sample files:", &report.file_count.to_string());
            ui::summary_row("Covered:", &report.covered.len().to_string());
            ui::summary_row("Uncovered:", &report.uncovered.len().to_string());
            ui::summary_row("Coverage:", &format!("{:.1}%", report.coverage() * 100.0));
            if !report.patterns.is_empty() {
                ui::summary_row("Patterns:", &report.patterns.join(", "));
            }

            if !report.uncovered.is_empty() {
                ui::section("Uncovered operations");
                for op in &report.uncovered {
                    eprintln!("  {}.{} {}", op.client, op.method, ui::muted(&op.sig));
                }
            }
        }

        Commands::Doctor { language, refresh } => {
            let ctx = EngineContext::new(config);
            let languages = match language {
                Some(language) => vec![language],
                None => Language::all().to_vec(),
            };

            ui::header(&format!("{} Analyzer toolchains", Icons::GEAR));
            let mut missing = 0;
            for language in languages {
                let spec = ToolchainSpec::for_language(language);
                let resolved = if refresh {
                    ctx.availability.resolve_forced(spec)
                } else {
                    ctx.availability.resolve(spec)
                };
                ui::availability_row(language.as_str(), &resolved.availability);
                if let Some(warning) = &resolved.warning {
                    ui::warn(warning);
                }
                if !resolved.availability.is_available() {
                    missing += 1;
                    eprintln!("      {}", ui::dim(spec.install_hint));
                }
            }
            if missing == 0 {
                ui::success("All toolchains available");
            }
        }
    }

    Ok(())
}

fn run_graph<E: GraphEngine>(
    engine: &E,
    target: &Target<E::Manifest>,
    map: Option<&CrossLanguageMap>,
    args: &GraphArgs,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let (index, diagnostics) = match engine.graph(target, map) {
        EngineResult::Success { value, diagnostics } => (value, diagnostics),
        EngineResult::Failure(failure) => {
            ui::error(&failure.to_string());
            bail!("{} engine failed", engine.language());
        }
    };

    let (index, stats) = if args.prune {
        let (pruned, stats) = apigraph::reachability::prune_with_stats(&index);
        tracing::debug!("{}", stats);
        (pruned, Some(stats))
    } else {
        (index, None)
    };

    let rendered = if args.stubs {
        engine.to_stubs(&index)
    } else {
        engine.to_json(&index)?
    };
    write_output(args.output.as_deref(), &rendered)?;

    ui::header(&format!("{} {}", index.package, ui::dim(engine.language().as_str())));
    ui::summary_row("Namespaces:", &index.namespaces.len().to_string());
    ui::summary_row("Types:", &index.type_count().to_string());
    if let Some(stats) = &stats {
        ui::summary_row(
            "Reachable:",
            &format!("{} of {} ({} roots)", stats.reachable, stats.types, stats.roots),
        );
    }
    if !diagnostics.is_empty() {
        ui::section("Diagnostics");
        for d in &diagnostics {
            ui::diagnostic(d);
        }
    }
    if let Some(path) = &args.output {
        ui::info("Written to", &path.display().to_string());
    }
    ui::timing(started.elapsed());
    Ok(())
}

fn write_output(path: Option<&Path>, rendered: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }
    Ok(())
}
