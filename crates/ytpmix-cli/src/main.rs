use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use serde_json::Value;

use ytpmix_core::core::captions::{remix_transcript_seeded, FileTranscriptProvider, TranscriptProvider};
use ytpmix_core::core::jobs::{load_batch_file, BatchJob, ExportWorker, JobEvent};
use ytpmix_core::core::plugin::{HookContext, PluginRegistry};
use ytpmix_core::core::presets::load_presets;
use ytpmix_core::core::project::{Overlay, Project};
use ytpmix_core::core::session::{Session, SessionDir};
use ytpmix_core::core::settings::{AppSettings, SettingsStore};

#[derive(Parser, Debug)]
#[command(name = "ytpmix", version, about = "Compile YTP-style remix effects into FFmpeg renders")]
struct Cli {
    /// Project state file.
    #[arg(long, short = 'p', global = true, default_value = "ytpmix.json")]
    project: PathBuf,

    /// Settings file (defaults to the per-user config directory).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Also write daily-rolling logs into this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty project file.
    Init {
        /// Replace an existing project file.
        #[arg(long)]
        force: bool,
    },
    /// Add a local source file (the first source is the one rendered).
    AddSource { path: String },
    /// Remove a source by index.
    RemoveSource { index: usize },
    /// Add an image or clip overlay.
    AddOverlay(OverlayArgs),
    /// Remove an overlay by index.
    RemoveOverlay { index: usize },
    /// Set one effect parameter; the value is parsed as JSON, else taken as text.
    SetEffect { name: String, value: String },
    /// List available presets.
    Presets,
    /// Apply a preset to the project.
    Preset { name: String },
    /// Attach a transcript for subtitle burn-in.
    Transcript(TranscriptArgs),
    /// Print the engine command without running it.
    Plan {
        #[arg(long)]
        out: PathBuf,
        /// Print the full plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Render the project.
    Render {
        #[arg(long)]
        out: PathBuf,
        /// Convert GIF overlays to WebM clips before rendering.
        #[arg(long)]
        convert_gifs: bool,
    },
    /// Render every job of a batch file (`[{name, output, overrides}]`).
    Batch { jobs: PathBuf },
    /// Play the main source with ffplay.
    Preview,
    /// Manage plugins.
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },
}

#[derive(Parser, Debug)]
struct OverlayArgs {
    path: String,
    /// Horizontal position expression.
    #[arg(long, default_value = "(main_w-overlay_w)/2")]
    x: String,
    /// Vertical position expression.
    #[arg(long, default_value = "(main_h-overlay_h)/2")]
    y: String,
    /// Seconds before the overlay appears.
    #[arg(long, default_value_t = 0.0)]
    start: f64,
    /// Seconds the overlay stays visible (until the end when omitted).
    #[arg(long)]
    duration: Option<f64>,
}

#[derive(Parser, Debug)]
struct TranscriptArgs {
    /// UTF-8 text file; one caption line per sentence.
    #[arg(long, conflicts_with = "clear")]
    file: Option<PathBuf>,
    /// Remove the transcript.
    #[arg(long)]
    clear: bool,
    /// Remix the transcript with this intensity (0..1).
    #[arg(long)]
    remix: Option<f64>,
    /// Seed for the remix.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Do not duplicate short words while remixing.
    #[arg(long)]
    no_repeats: bool,
}

#[derive(Subcommand, Debug)]
enum PluginAction {
    List,
    Enable { name: String },
    Disable { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    ytpmix_core::init_logging(cli.log_dir.as_deref());

    let store = match &cli.settings {
        Some(path) => SettingsStore::at_path(path),
        None => SettingsStore::default_location(),
    };
    let settings = store
        .load()
        .with_context(|| format!("load settings '{}'", store.settings_path().display()))?;
    tracing::debug!("Using settings from {}", store.settings_path().display());

    match cli.cmd {
        Command::Init { force } => cmd_init(&cli.project, force),
        Command::AddSource { path } => edit_project(&cli.project, |p| {
            p.add_source(&path)?;
            Ok(())
        }),
        Command::RemoveSource { index } => edit_project(&cli.project, |p| {
            p.remove_source(index)?;
            Ok(())
        }),
        Command::AddOverlay(args) => edit_project(&cli.project, |p| {
            p.add_overlay(Overlay::new(
                args.path.trim(),
                args.x,
                args.y,
                args.start,
                args.duration,
            ))?;
            Ok(())
        }),
        Command::RemoveOverlay { index } => edit_project(&cli.project, |p| {
            p.remove_overlay(index)?;
            Ok(())
        }),
        Command::SetEffect { name, value } => edit_project(&cli.project, |p| {
            p.set_effect(&name, &parse_value(&value))?;
            Ok(())
        }),
        Command::Presets => cmd_presets(&settings),
        Command::Preset { name } => cmd_preset(&cli.project, &settings, &name),
        Command::Transcript(args) => cmd_transcript(&cli.project, args),
        Command::Plan { out, json } => cmd_plan(&cli.project, &settings, &out, json),
        Command::Render { out, convert_gifs } => {
            cmd_render(&cli.project, &settings, &out, convert_gifs).await
        }
        Command::Batch { jobs } => cmd_batch(&cli.project, &settings, &jobs).await,
        Command::Preview => cmd_preview(&cli.project, &settings),
        Command::Plugins { action } => cmd_plugins(&settings, action),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn open_project(path: &Path) -> anyhow::Result<Project> {
    Project::open(path).with_context(|| format!("open project '{}'", path.display()))
}

fn save_project(project: &Project, path: &Path) -> anyhow::Result<()> {
    project
        .export_project_state(path)
        .with_context(|| format!("save project '{}'", path.display()))
}

fn edit_project(
    path: &Path,
    edit: impl FnOnce(&mut Project) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut project = open_project(path)?;
    edit(&mut project)?;
    save_project(&project, path)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("'{}' already exists (use --force to replace it)", path.display());
    }
    save_project(&Project::new(), path)?;
    eprintln!("created {}", path.display());
    Ok(())
}

fn cmd_presets(settings: &AppSettings) -> anyhow::Result<()> {
    let presets = load_presets(settings.presets_path.as_deref());
    for (name, params) in &presets {
        println!("{name}: {}", Value::Object(params.clone()));
    }
    Ok(())
}

fn cmd_preset(path: &Path, settings: &AppSettings, name: &str) -> anyhow::Result<()> {
    let presets = load_presets(settings.presets_path.as_deref());
    let params = presets
        .get(name)
        .with_context(|| format!("unknown preset '{name}'"))?;
    edit_project(path, |p| {
        p.load_preset(name, params)?;
        Ok(())
    })
}

fn cmd_transcript(path: &Path, args: TranscriptArgs) -> anyhow::Result<()> {
    edit_project(path, |p| {
        if args.clear {
            p.set_transcript(None);
            return Ok(());
        }
        if let Some(file) = &args.file {
            let provider = FileTranscriptProvider::new(file);
            let source = p.main_source()?.path().to_path_buf();
            p.set_transcript(Some(provider.transcript(&source)?));
        }
        if let Some(intensity) = args.remix {
            let text = p
                .transcript()
                .context("project has no transcript to remix")?
                .to_string();
            p.set_transcript(Some(remix_transcript_seeded(
                &text,
                intensity,
                !args.no_repeats,
                args.seed,
            )));
        }
        Ok(())
    })
}

fn cmd_plan(path: &Path, settings: &AppSettings, out: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(path)?;
    let session = Session::open(settings).context("open session")?;
    let plan = session.plan(&project, out)?;
    if plan.compiled.subtitle_file.is_some() {
        let kept = session.persist_dir();
        eprintln!("generated files kept in {}", kept.display());
    }
    if json {
        print_json(&plan)?;
    } else {
        println!("{}", plan.command.display());
        for failure in &plan.hooks.failures {
            eprintln!(
                "plugin {} failed in {}: {}",
                failure.plugin,
                failure.hook.as_str(),
                failure.error
            );
        }
    }
    Ok(())
}

async fn cmd_render(
    path: &Path,
    settings: &AppSettings,
    out: &Path,
    convert_gifs: bool,
) -> anyhow::Result<()> {
    let mut project = open_project(path)?;
    let session = Session::open(settings).context("open session")?;
    if convert_gifs {
        let converted = session.convert_gif_overlays(&mut project).await?;
        eprintln!("converted {converted} GIF overlay(s)");
    }
    let outcome = session.export(&mut project, out).await?;
    print_json(&outcome)
}

async fn cmd_batch(path: &Path, settings: &AppSettings, jobs_path: &Path) -> anyhow::Result<()> {
    let project = open_project(path)?;
    let jobs: Vec<BatchJob> = load_batch_file(jobs_path)
        .with_context(|| format!("read batch file '{}'", jobs_path.display()))?;
    let session = std::sync::Arc::new(Session::open(settings).context("open session")?);

    let (worker, mut events) = ExportWorker::spawn(session);
    for job in jobs {
        let name = job.name.clone();
        let id = worker.submit(&project, job)?;
        eprintln!("queued {name} as {id}");
    }
    worker.shutdown().await;

    let mut failed = 0usize;
    while let Some(event) = events.recv().await {
        if matches!(event, JobEvent::Failed { .. }) {
            failed += 1;
        }
        println!("{}", serde_json::to_string(&event)?);
    }
    if failed > 0 {
        bail!("{failed} batch job(s) failed");
    }
    Ok(())
}

fn cmd_preview(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    let project = open_project(path)?;
    let session = Session::open(settings).context("open session")?;
    let mut child = session.preview(&project)?;
    child.wait().context("wait for preview player")?;
    Ok(())
}

fn cmd_plugins(settings: &AppSettings, action: PluginAction) -> anyhow::Result<()> {
    let registry = PluginRegistry::from_settings(&settings.plugins);
    let scratch = SessionDir::create(settings.session.temp_root.as_deref())?;
    let ctx = HookContext::new(scratch.path());

    let report = match action {
        PluginAction::List => return print_json(&registry.list()),
        PluginAction::Enable { name } => registry.enable(&name, &ctx)?,
        PluginAction::Disable { name } => registry.disable(&name, &ctx)?,
    };
    for failure in &report.failures {
        eprintln!("warning: {} hook failed: {}", failure.hook.as_str(), failure.error);
    }
    Ok(())
}
