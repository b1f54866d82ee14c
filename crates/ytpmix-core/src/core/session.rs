//! Session
//!
//! A session ties the pieces together for one run of the tool: a scratch
//! directory for generated subtitles and converted overlays, the duration
//! prober, the plugin registry, the command assembler and the engine
//! executor. The scramble seed is drawn once when the session is opened.

use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::core::captions::{remix_transcript_seeded, TranscriptProvider};
use crate::core::effects::{CompileInput, CompiledGraph, EffectCompiler, EffectConfig};
use crate::core::ffmpeg::{detect_ffmpeg, DurationProber, FFmpegRunner};
use crate::core::fs::remove_best_effort;
use crate::core::jobs::{BatchJob, Job, JobStatus};
use crate::core::plugin::{HookContext, HookName, HookReport, PluginRegistry};
use crate::core::project::{ExportStatus, Project};
use crate::core::render::{
    CommandAssembler, EngineCommand, EngineExecutor, ExportOutcome, FFmpegExecutor,
};
use crate::core::settings::AppSettings;
use crate::core::{CoreError, CoreResult};

/// Name of the built-in transcript remix plugin
const REMIX_PLUGIN: &str = "sentence_pooper";

// =============================================================================
// Scratch Directory
// =============================================================================

/// Per-session temp directory. Removed on [`SessionDir::release`] or drop.
#[derive(Debug)]
pub struct SessionDir {
    path: PathBuf,
    released: AtomicBool,
}

impl SessionDir {
    /// Create `ytpmix_<uuid>` under `root` (system temp dir when `None`).
    pub fn create(root: Option<&Path>) -> CoreResult<Self> {
        let parent = root
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let path = parent.join(format!("ytpmix_{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            released: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory. Failures are logged; later calls do nothing.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        remove_best_effort(&self.path);
    }

    /// Leave the directory on disk; release and drop no longer remove it.
    pub fn persist(&self) -> &Path {
        self.released.store(true, Ordering::SeqCst);
        &self.path
    }
}

impl Drop for SessionDir {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Session
// =============================================================================

/// Collaborators a session is built from.
pub struct SessionParts {
    pub ffmpeg_path: PathBuf,
    pub prober: Arc<dyn DurationProber>,
    pub executor: Arc<dyn EngineExecutor>,
    pub plugins: PluginRegistry,
    /// Needed for GIF conversion and preview only
    pub runner: Option<FFmpegRunner>,
}

/// Compiled and assembled export, ready to run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPlan {
    pub command: EngineCommand,
    #[serde(skip)]
    pub compiled: CompiledGraph,
    pub hooks: HookReport,
}

pub struct Session {
    dir: SessionDir,
    prober: Arc<dyn DurationProber>,
    executor: Arc<dyn EngineExecutor>,
    plugins: PluginRegistry,
    assembler: CommandAssembler,
    runner: Option<FFmpegRunner>,
    scramble_seed: u64,
    sample_rate: u32,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dir", &self.dir.path())
            .field("plugins", &self.plugins)
            .field("scramble_seed", &self.scramble_seed)
            .finish()
    }
}

impl Session {
    /// Open a session against the FFmpeg install described by `settings`.
    pub fn open(settings: &AppSettings) -> CoreResult<Self> {
        let runner = FFmpegRunner::new(detect_ffmpeg(&settings.ffmpeg)?);
        info!(
            "Using FFmpeg {} at {}",
            runner.info().version,
            runner.info().ffmpeg_path.display()
        );
        Self::new(
            settings,
            SessionParts {
                ffmpeg_path: runner.info().ffmpeg_path.clone(),
                prober: Arc::new(runner.clone()),
                executor: Arc::new(FFmpegExecutor),
                plugins: PluginRegistry::from_settings(&settings.plugins),
                runner: Some(runner),
            },
        )
    }

    pub fn new(settings: &AppSettings, parts: SessionParts) -> CoreResult<Self> {
        let dir = SessionDir::create(settings.session.temp_root.as_deref())?;
        let scramble_seed = rand::random::<u64>();
        info!(
            dir = %dir.path().display(),
            scramble_seed,
            "Session opened"
        );
        Ok(Self {
            dir,
            prober: parts.prober,
            executor: parts.executor,
            plugins: parts.plugins,
            assembler: CommandAssembler::new(parts.ffmpeg_path, settings.export.clone()),
            runner: parts.runner,
            scramble_seed,
            sample_rate: settings.audio.sample_rate,
        })
    }

    /// Replace the random scramble seed with a fixed one.
    pub fn with_scramble_seed(mut self, seed: u64) -> Self {
        self.scramble_seed = seed;
        self
    }

    pub fn scramble_seed(&self) -> u64 {
        self.scramble_seed
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn hook_context(&self) -> HookContext<'_> {
        HookContext::new(self.dir.path())
    }

    fn compiler(&self) -> EffectCompiler {
        EffectCompiler::new(
            Arc::clone(&self.prober),
            self.scramble_seed,
            self.sample_rate,
            self.dir.path(),
        )
    }

    // -------------------------------------------------------------------------
    // Compile & plan
    // -------------------------------------------------------------------------

    /// Compile the project's own effect configuration.
    pub fn compile(&self, project: &Project) -> CoreResult<CompiledGraph> {
        self.compile_with(project, project.effects())
    }

    /// Compile `project` with an explicit effect configuration.
    pub fn compile_with(&self, project: &Project, effects: &EffectConfig) -> CoreResult<CompiledGraph> {
        let source = project.main_source()?;
        self.compiler().compile(&CompileInput {
            source,
            overlays: project.overlays(),
            effects,
            transcript: project.transcript(),
        })
    }

    /// Compile and assemble the engine command for `output`.
    pub fn plan(&self, project: &Project, output: &Path) -> CoreResult<ExportPlan> {
        self.plan_with(project, project.effects(), output)
    }

    pub fn plan_with(
        &self,
        project: &Project,
        effects: &EffectConfig,
        output: &Path,
    ) -> CoreResult<ExportPlan> {
        let ctx = self.hook_context().with_effects(effects);
        let mut hooks = HookReport::default();
        if touches_audio(effects) {
            hooks.merge(self.plugins.run_hook_all(HookName::OnPreprocessAudio, &ctx));
        }

        let compiled = self.compile_with(project, effects)?;
        let source = project.main_source()?;
        let (command, report) = self.assembler.assemble(
            source.path(),
            project.overlays(),
            &compiled,
            output,
            &self.plugins,
            &ctx,
        );
        hooks.merge(report);

        Ok(ExportPlan {
            command,
            compiled,
            hooks,
        })
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Notify plugins and run an assembled command.
    pub async fn execute(&self, command: &EngineCommand) -> CoreResult<ExportOutcome> {
        let report = self.plugins.run_export(&self.hook_context(), command);
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "on_run_export hooks failed");
        }
        self.executor.execute(command).await
    }

    /// Compile, assemble and render `project`, tracking its phase.
    pub async fn export(&self, project: &mut Project, output: &Path) -> CoreResult<ExportOutcome> {
        let effects = project.effects().clone();
        self.export_with(project, &effects, output).await
    }

    async fn export_with(
        &self,
        project: &mut Project,
        effects: &EffectConfig,
        output: &Path,
    ) -> CoreResult<ExportOutcome> {
        let planned = match self.probe_main_source(project, effects).await {
            Ok(()) => self.plan_with(project, effects, output),
            Err(e) => Err(e),
        };
        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => {
                project.mark_failed();
                return Err(e);
            }
        };
        project.mark_compiled();

        let result = self.execute(&plan.command).await;
        project.mark_exported(if result.is_ok() {
            ExportStatus::Success
        } else {
            ExportStatus::Failure
        });
        result
    }

    /// Probe the main source on a blocking thread when `effects` need its
    /// duration, so compiling afterwards only reads the cache.
    async fn probe_main_source(&self, project: &Project, effects: &EffectConfig) -> CoreResult<()> {
        if !(effects.stutter || effects.scramble) {
            return Ok(());
        }
        let source = project.main_source()?;
        if source.cached_duration().is_some() {
            return Ok(());
        }
        let prober = Arc::clone(&self.prober);
        let path = source.path().to_path_buf();
        let probed = tokio::task::spawn_blocking(move || prober.probe(&path))
            .await
            .map_err(|e| CoreError::Internal(format!("probe task failed: {e}")))??;
        source.prime_duration(probed)?;
        Ok(())
    }

    /// Render one output per job.
    ///
    /// Each job compiles a merged copy of the project's effects, so the
    /// project's own configuration is the same before and after every job.
    /// A failing job does not stop the ones after it.
    pub async fn run_batch(&self, project: &mut Project, jobs: &[BatchJob]) -> Vec<Job> {
        let mut finished = Vec::with_capacity(jobs.len());
        for request in jobs {
            let mut job = Job::new(request.clone());
            info!(job_id = %job.id, name = %request.name, "Batch job started");

            let status = match self.run_batch_job(project, request).await {
                Ok(outcome) => JobStatus::Completed { outcome },
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Batch job failed");
                    JobStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            job.finish(status);
            finished.push(job);
        }
        finished
    }

    async fn run_batch_job(
        &self,
        project: &mut Project,
        request: &BatchJob,
    ) -> CoreResult<ExportOutcome> {
        let effects = match project.effects().merged(&request.overrides) {
            Ok(effects) => effects,
            Err(e) => {
                project.mark_failed();
                return Err(e);
            }
        };
        self.export_with(project, &effects, &request.output).await
    }

    // -------------------------------------------------------------------------
    // Overlays, preview, transcript
    // -------------------------------------------------------------------------

    fn runner(&self) -> CoreResult<&FFmpegRunner> {
        self.runner
            .as_ref()
            .ok_or_else(|| CoreError::Resource("no FFmpeg install attached to this session".into()))
    }

    /// Convert a GIF into a WebM overlay clip inside the session directory.
    pub async fn prepare_overlay_from_gif(&self, gif: &Path) -> CoreResult<PathBuf> {
        let output = self
            .dir
            .path()
            .join(format!("overlay_{}.webm", uuid::Uuid::new_v4().simple()));
        self.runner()?.convert_gif_to_webm(gif, &output).await?;
        Ok(output)
    }

    /// Convert every `.gif` overlay of `project` and repoint it at the clip.
    ///
    /// Returns the number of converted overlays.
    pub async fn convert_gif_overlays(&self, project: &mut Project) -> CoreResult<usize> {
        let gifs: Vec<(usize, PathBuf)> = project
            .overlays()
            .iter()
            .enumerate()
            .filter(|(_, o)| is_gif(&o.path))
            .map(|(i, o)| (i, o.path.clone()))
            .collect();

        for (index, gif) in &gifs {
            let clip = self.prepare_overlay_from_gif(gif).await?;
            project.replace_overlay_path(*index, clip)?;
        }
        Ok(gifs.len())
    }

    /// Play the main source with the preview player.
    pub fn preview(&self, project: &Project) -> CoreResult<Child> {
        let source = project.main_source()?;
        Ok(self.runner()?.preview(source.path())?)
    }

    /// Fetch a transcript for the main source and store it on the project.
    pub fn transcribe(
        &self,
        project: &mut Project,
        provider: &dyn TranscriptProvider,
    ) -> CoreResult<()> {
        let text = provider.transcript(project.main_source()?.path())?;
        project.set_transcript(Some(text));
        Ok(())
    }

    /// Remix the project's transcript in place.
    ///
    /// Uses the `sentence_pooper` plugin when it is enabled and falls back to
    /// the built-in remixer otherwise.
    pub fn remix_project_transcript(
        &self,
        project: &mut Project,
        intensity: f64,
        allow_repeats: bool,
        seed: u64,
    ) -> CoreResult<()> {
        let text = project
            .transcript()
            .ok_or_else(|| CoreError::InvalidProjectState("project has no transcript".into()))?
            .to_string();

        let remixed = if self.plugins.is_enabled(REMIX_PLUGIN) {
            let args = json!({
                "text": text,
                "intensity": intensity,
                "allow_repeats": allow_repeats,
                "seed": seed,
            });
            let result = self.plugins.run(REMIX_PLUGIN, &self.hook_context(), &args)?;
            result
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| CoreError::PluginError(format!("{REMIX_PLUGIN} returned no text")))?
        } else {
            remix_transcript_seeded(&text, intensity, allow_repeats, seed)
        };

        project.set_transcript(Some(remixed));
        Ok(())
    }

    /// Remove the session directory now instead of on drop.
    pub fn release(&self) {
        self.dir.release();
    }

    /// Keep the session directory after the session ends, e.g. so a printed
    /// command can still find its generated subtitles.
    pub fn persist_dir(&self) -> &Path {
        self.dir.persist()
    }
}

fn touches_audio(effects: &EffectConfig) -> bool {
    effects.reverse || effects.stutter || effects.scramble || effects.pitch_semitones != 0.0
}

fn is_gif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"))
}
