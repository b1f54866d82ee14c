//! End-to-end tests: project -> compile -> assemble -> export -> batch,
//! with in-memory doubles for the prober, the engine and plugins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use crate::core::effects::EffectConfig;
use crate::core::ffmpeg::DurationProber;
use crate::core::jobs::{BatchJob, ExportWorker, JobEvent, JobStatus};
use crate::core::plugin::{ExportHook, HookContext, HookName, PluginRegistry};
use crate::core::project::{ExportStatus, Overlay, Project, ProjectPhase};
use crate::core::render::{EngineCommand, EngineExecutor, ExportOutcome};
use crate::core::session::{Session, SessionParts};
use crate::core::settings::{AppSettings, PluginSettings};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Doubles
// =============================================================================

struct FixedProber {
    duration: f64,
    calls: AtomicUsize,
}

impl FixedProber {
    fn new(duration: f64) -> Arc<Self> {
        Arc::new(Self {
            duration,
            calls: AtomicUsize::new(0),
        })
    }
}

impl DurationProber for FixedProber {
    fn probe(&self, _path: &Path) -> CoreResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.duration)
    }
}

/// Records every command; fails outputs whose file name contains "bad".
#[derive(Default)]
struct RecordingExecutor {
    commands: Mutex<Vec<EngineCommand>>,
}

impl RecordingExecutor {
    fn commands(&self) -> Vec<EngineCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineExecutor for RecordingExecutor {
    async fn execute(&self, command: &EngineCommand) -> CoreResult<ExportOutcome> {
        self.commands.lock().unwrap().push(command.clone());
        let failing = command
            .output
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains("bad"));
        if failing {
            return Err(CoreError::EngineExecution {
                status: "exit status: 1".to_string(),
                stderr: "Conversion failed!".to_string(),
            });
        }
        Ok(ExportOutcome {
            output_path: command.output.clone(),
            file_size: 1024,
            encoding_time_sec: 0.5,
        })
    }
}

/// Tags the output metadata, or panics when asked to.
struct MetadataPlugin {
    name: &'static str,
    panic: bool,
    run_exports: AtomicUsize,
    audio_calls: AtomicUsize,
}

impl MetadataPlugin {
    fn new(name: &'static str, panic: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            panic,
            run_exports: AtomicUsize::new(0),
            audio_calls: AtomicUsize::new(0),
        })
    }
}

impl ExportHook for MetadataPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn on_before_export(&self, _ctx: &HookContext<'_>, command: &mut EngineCommand) -> CoreResult<()> {
        if self.panic {
            panic!("metadata plugin exploded");
        }
        command.output_args.push("-metadata".to_string());
        command.output_args.push("title=poop".to_string());
        Ok(())
    }

    fn on_run_export(&self, _ctx: &HookContext<'_>, _command: &EngineCommand) -> CoreResult<()> {
        self.run_exports.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_preprocess_audio(&self, _ctx: &HookContext<'_>) -> CoreResult<()> {
        self.audio_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

struct Fixture {
    dir: TempDir,
    prober: Arc<FixedProber>,
    executor: Arc<RecordingExecutor>,
}

impl Fixture {
    fn new(duration: f64) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            prober: FixedProber::new(duration),
            executor: Arc::new(RecordingExecutor::default()),
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"media").unwrap();
        path
    }

    fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    fn session_with(&self, plugins: PluginRegistry, seed: u64) -> Session {
        let mut settings = AppSettings::default();
        settings.session.temp_root = Some(self.dir.path().join("sessions"));
        Session::new(
            &settings,
            SessionParts {
                ffmpeg_path: PathBuf::from("ffmpeg"),
                prober: self.prober.clone(),
                executor: self.executor.clone(),
                plugins,
                runner: None,
            },
        )
        .unwrap()
        .with_scramble_seed(seed)
    }

    fn session(&self) -> Session {
        self.session_with(PluginRegistry::new(), 7)
    }

    fn project(&self) -> Project {
        let mut project = Project::new();
        project
            .add_source(&self.file("main.mp4").to_string_lossy())
            .unwrap();
        project
    }
}

// =============================================================================
// Export
// =============================================================================

#[tokio::test]
async fn passthrough_export_maps_raw_streams() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();

    let outcome = session
        .export(&mut project, &fx.output("plain.mp4"))
        .await
        .unwrap();

    assert_eq!(outcome.file_size, 1024);
    assert_eq!(project.phase(), ProjectPhase::Exported(ExportStatus::Success));

    let commands = fx.executor.commands();
    assert_eq!(commands.len(), 1);
    let args = commands[0].args();
    assert!(!args.contains(&"-filter_complex".to_string()));
    let maps: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "-map")
        .map(|w| w[1].as_str())
        .collect();
    assert_eq!(maps, vec!["0:v", "0:a?"]);
    assert_eq!(fx.prober.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stutter_export_runs_program_with_encode_flags() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    project.set_effect("stutter", &json!(true)).unwrap();
    project.set_effect("stutter_ms", &json!(200)).unwrap();
    project.set_effect("stutter_repeats", &json!(3)).unwrap();

    session
        .export(&mut project, &fx.output("stutter.mp4"))
        .await
        .unwrap();

    let commands = fx.executor.commands();
    let command = &commands[0];
    let program = command.filter_complex.as_deref().unwrap();
    assert!(program.contains("concat=n=5:v=1:a=1"));
    assert_eq!(command.global_args, vec!["-y".to_string()]);
    assert_eq!(
        command.output_args,
        vec!["-c:v", "libx264", "-preset", "medium", "-crf", "18", "-c:a", "aac", "-b:a", "192k"]
    );
    assert!(command.maps.iter().all(|m| m.starts_with('[') && m.ends_with(']')));
    assert!(command.args().last().unwrap().ends_with("stutter.mp4"));
}

#[tokio::test]
async fn compile_error_fails_before_engine_starts() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    project.set_effect("scramble", &json!(true)).unwrap();
    project.set_effect("scramble_segments", &json!(0)).unwrap();

    let err = session
        .export(&mut project, &fx.output("x.mp4"))
        .await
        .unwrap_err();

    assert!(err.is_compile_time());
    assert!(fx.executor.commands().is_empty());
    assert_eq!(project.phase(), ProjectPhase::Failed);
}

#[tokio::test]
async fn engine_failure_keeps_diagnostics() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    project.set_effect("reverse", &json!(true)).unwrap();

    let err = session
        .export(&mut project, &fx.output("bad.mp4"))
        .await
        .unwrap_err();

    match err {
        CoreError::EngineExecution { stderr, .. } => assert_eq!(stderr, "Conversion failed!"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(project.phase(), ProjectPhase::Exported(ExportStatus::Failure));
}

#[test]
fn plan_without_sources_is_rejected() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let err = session
        .plan(&Project::new(), &fx.output("x.mp4"))
        .unwrap_err();
    assert!(matches!(err, CoreError::NoSources));
}

#[test]
fn overlays_follow_the_main_input() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    let first = fx.file("first.png");
    let second = fx.file("second.webm");
    project
        .add_overlay(Overlay::new(&first, "0", "0", 0.0, None))
        .unwrap();
    project
        .add_overlay(Overlay::new(&second, "10", "10", 1.0, Some(2.0)))
        .unwrap();

    let plan = session.plan(&project, &fx.output("o.mp4")).unwrap();

    assert_eq!(plan.command.inputs.len(), 3);
    assert_eq!(plan.command.inputs[1], first);
    assert_eq!(plan.command.inputs[2], second);
    let program = plan.command.filter_complex.unwrap();
    assert!(program.contains("[1:v]overlay="));
    assert!(program.contains("[2:v]overlay="));
    assert!(program.contains("enable='between(t,1,3)'"));
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn scramble_is_stable_within_a_session() {
    let fx = Fixture::new(12.0);
    let session = fx.session_with(PluginRegistry::new(), 42);
    let mut project = fx.project();
    project.set_effect("scramble", &json!(true)).unwrap();

    let first = session.compile(&project).unwrap();
    let second = session.compile(&project).unwrap();
    assert_eq!(first, second);
    // Duration probed once per source
    assert_eq!(fx.prober.calls.load(Ordering::SeqCst), 1);

    let other = fx.session_with(PluginRegistry::new(), 42);
    assert_eq!(other.compile(&project).unwrap(), first);
}

// =============================================================================
// Plugins
// =============================================================================

#[tokio::test]
async fn plugin_hooks_rewrite_and_observe_export() {
    let fx = Fixture::new(10.0);
    let tagger = MetadataPlugin::new("tagger", false);
    let broken = MetadataPlugin::new("broken", true);
    let mut plugins = PluginRegistry::new();
    plugins.register(broken.clone()).unwrap();
    plugins.register(tagger.clone()).unwrap();
    let session = fx.session_with(plugins, 1);
    let ctx_dir = session.dir().to_path_buf();
    let ctx = HookContext::new(&ctx_dir);
    session.plugins().enable("broken", &ctx).unwrap();
    session.plugins().enable("tagger", &ctx).unwrap();

    let mut project = fx.project();
    project.set_effect("pitch_semitones", &json!(12)).unwrap();

    let plan = session.plan(&project, &fx.output("p.mp4")).unwrap();
    assert_eq!(plan.hooks.failures.len(), 1);
    assert_eq!(plan.hooks.failures[0].plugin, "broken");
    assert_eq!(plan.hooks.failures[0].hook, HookName::OnBeforeExport);
    assert!(plan.command.output_args.ends_with(&[
        "-metadata".to_string(),
        "title=poop".to_string()
    ]));
    assert_eq!(tagger.audio_calls.load(Ordering::SeqCst), 1);

    session.export(&mut project, &fx.output("p.mp4")).await.unwrap();
    assert_eq!(tagger.run_exports.load(Ordering::SeqCst), 1);
    assert_eq!(broken.run_exports.load(Ordering::SeqCst), 1);
}

#[test]
fn transcript_remix_uses_plugin_or_fallback_identically() {
    let fx = Fixture::new(10.0);
    let text = "the quick brown fox jumps over the lazy dog. it was not amused";

    let mut plain = fx.project();
    plain.set_transcript(Some(text.to_string()));
    fx.session()
        .remix_project_transcript(&mut plain, 0.7, true, 99)
        .unwrap();

    let plugin_settings = PluginSettings {
        config_path: fx.dir.path().join("plugins.json"),
        ..Default::default()
    };
    let session = fx.session_with(PluginRegistry::from_settings(&plugin_settings), 1);
    let ctx_dir = session.dir().to_path_buf();
    session
        .plugins()
        .enable("sentence_pooper", &HookContext::new(&ctx_dir))
        .unwrap();
    let mut via_plugin = fx.project();
    via_plugin.set_transcript(Some(text.to_string()));
    session
        .remix_project_transcript(&mut via_plugin, 0.7, true, 99)
        .unwrap();

    assert_eq!(plain.transcript(), via_plugin.transcript());
    assert!(plain.transcript().unwrap().ends_with(". "));

    let mut empty = fx.project();
    assert!(matches!(
        fx.session().remix_project_transcript(&mut empty, 0.5, true, 1),
        Err(CoreError::InvalidProjectState(_))
    ));
}

// =============================================================================
// Batch
// =============================================================================

#[tokio::test]
async fn batch_isolates_failures_and_keeps_project_effects() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    project.set_effect("reverse", &json!(true)).unwrap();
    let before: EffectConfig = project.effects().clone();

    let jobs = vec![
        BatchJob::new("fast", fx.output("fast.mp4")).with_override("pitch_semitones", json!(12)),
        BatchJob::new("broken", fx.output("bad.mp4")).with_override("stutter", json!(true)),
        BatchJob::new("typo", fx.output("typo.mp4")).with_override("stuter", json!(true)),
        BatchJob::new("plain", fx.output("plain.mp4")),
    ];

    let results = session.run_batch(&mut project, &jobs).await;

    assert_eq!(results.len(), 4);
    assert!(results[0].succeeded());
    assert!(matches!(&results[1].status, JobStatus::Failed { error } if error.contains("Conversion failed")));
    assert!(matches!(&results[2].status, JobStatus::Failed { error } if error.contains("stuter")));
    assert!(results[3].succeeded());
    assert!(results.iter().all(|j| j.completed_at.is_some()));
    assert_eq!(project.effects(), &before);

    let commands = fx.executor.commands();
    assert_eq!(commands.len(), 3);
    assert!(commands[0].filter_complex.as_deref().unwrap().contains("asetrate="));
    assert!(commands[1].filter_complex.as_deref().unwrap().contains("concat="));
    // The last job sees only the project's own reverse
    let last = commands[2].filter_complex.as_deref().unwrap();
    assert!(last.contains("reverse") && !last.contains("asetrate=") && !last.contains("concat="));
}

#[tokio::test]
async fn batch_phase_follows_the_last_job() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();

    let jobs = vec![
        BatchJob::new("reversed", fx.output("reversed.mp4")).with_override("reverse", json!(true)),
        BatchJob::new("no-chunks", fx.output("no-chunks.mp4"))
            .with_override("scramble", json!(true))
            .with_override("scramble_segments", json!(0)),
    ];
    let results = session.run_batch(&mut project, &jobs).await;
    assert!(results[0].succeeded());
    assert!(matches!(results[1].status, JobStatus::Failed { .. }));
    assert_eq!(project.phase(), ProjectPhase::Failed);
    assert_eq!(fx.executor.commands().len(), 1);

    // An unknown override fails before compiling and is tracked the same way
    let jobs = vec![
        BatchJob::new("plain", fx.output("plain.mp4")),
        BatchJob::new("typo", fx.output("typo.mp4")).with_override("stuter", json!(true)),
    ];
    session.run_batch(&mut project, &jobs).await;
    assert_eq!(project.phase(), ProjectPhase::Failed);

    let jobs = vec![BatchJob::new("stuttered", fx.output("stuttered.mp4"))
        .with_override("stutter", json!(true))];
    session.run_batch(&mut project, &jobs).await;
    assert_eq!(project.phase(), ProjectPhase::Exported(ExportStatus::Success));
    // Probed once on a blocking thread and served from the cache afterwards
    assert_eq!(fx.prober.calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Worker
// =============================================================================

#[tokio::test]
async fn worker_reports_events_in_order() {
    let fx = Fixture::new(10.0);
    let session = Arc::new(fx.session());
    let (worker, mut events) = ExportWorker::spawn(Arc::clone(&session));

    let mut project = fx.project();
    project.set_effect("reverse", &json!(true)).unwrap();
    let good = worker
        .submit(&project, BatchJob::new("good", fx.output("good.mp4")))
        .unwrap();
    // Edits after submission do not reach the queued snapshot
    project.set_effect("reverse", &json!(false)).unwrap();
    let bad = worker
        .submit(&project, BatchJob::new("bad", fx.output("bad.mp4")))
        .unwrap();
    worker.shutdown().await;

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }

    assert_eq!(received.len(), 4);
    assert_eq!(received[0], JobEvent::Started { job_id: good.clone() });
    assert!(matches!(&received[1], JobEvent::Completed { job_id, .. } if *job_id == good));
    assert_eq!(received[2].job_id(), bad);
    assert!(matches!(&received[3], JobEvent::Failed { job_id, error } if *job_id == bad && error.contains("Conversion failed")));

    let commands = fx.executor.commands();
    assert!(commands[0].filter_complex.is_some());
    assert!(commands[1].filter_complex.is_none());
}

// =============================================================================
// Temporary resources
// =============================================================================

#[test]
fn subtitle_file_lives_in_session_dir_until_release() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    project.set_transcript(Some("hello there.general kenobi".to_string()));

    let compiled = session.compile(&project).unwrap();
    let subtitles = compiled.subtitle_file.unwrap();
    assert!(subtitles.starts_with(session.dir()));
    assert!(subtitles.exists());

    session.release();
    assert!(!subtitles.exists());
    assert!(!session.dir().exists());
    session.release();
}

#[test]
fn persisted_plan_keeps_its_subtitles() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    project.set_transcript(Some("hello there".to_string()));

    let plan = session.plan(&project, &fx.output("subs.mp4")).unwrap();
    let subtitles = plan.compiled.subtitle_file.clone().unwrap();
    let kept = session.persist_dir().to_path_buf();
    drop(session);

    assert!(subtitles.starts_with(&kept));
    assert!(subtitles.exists());
    assert!(plan.command.filter_complex.as_deref().unwrap().contains("subtitles="));
}

#[test]
fn state_round_trip_compiles_identically() {
    let fx = Fixture::new(10.0);
    let session = fx.session();
    let mut project = fx.project();
    project
        .add_overlay(Overlay::new(fx.file("logo.png"), "W-w", "H-h", 0.5, None))
        .unwrap();
    project.set_effect("stutter", &json!(true)).unwrap();
    project.set_effect("pitch_semitones", &json!(-24)).unwrap();

    let path = fx.dir.path().join("project.json");
    project.export_project_state(&path).unwrap();
    let loaded = Project::open(&path).unwrap();

    let a = session.plan(&project, &fx.output("a.mp4")).unwrap();
    let b = session.plan(&loaded, &fx.output("a.mp4")).unwrap();
    assert_eq!(a.command, b.command);
    let program = a.command.filter_complex.unwrap();
    assert_eq!(program.matches("atempo=2[").count(), 2);
}
