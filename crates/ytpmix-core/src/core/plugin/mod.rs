//! Plugin System
//!
//! Plugins are plain Rust objects implementing [`ExportHook`], registered
//! explicitly in a [`PluginRegistry`] at startup. Enabled flags persist in a
//! small JSON file. Hook failures are logged as structured events and
//! collected in a [`HookReport`]; they never abort compilation or export.

mod builtin;
mod registry;

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::core::effects::EffectConfig;
use crate::core::render::EngineCommand;
use crate::core::{CoreError, CoreResult};

pub use builtin::{ExtraOutputArgsPlugin, SentenceRemixPlugin};
pub use registry::{PluginInfo, PluginRegistry, PLUGIN_CONFIG_FILE};

/// What a hook can see of the running session.
#[derive(Clone, Copy, Debug)]
pub struct HookContext<'a> {
    /// Per-session scratch directory
    pub session_dir: &'a Path,
    /// Effect configuration of the compile in flight, when there is one
    pub effects: Option<&'a EffectConfig>,
}

impl<'a> HookContext<'a> {
    pub fn new(session_dir: &'a Path) -> Self {
        Self {
            session_dir,
            effects: None,
        }
    }

    pub fn with_effects(mut self, effects: &'a EffectConfig) -> Self {
        self.effects = Some(effects);
        self
    }
}

/// Capability set of a plugin. Every hook has a no-op default.
pub trait ExportHook: Send + Sync {
    /// Unique name used for enabling and persistence
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Incompatible plugins stay registered but cannot be enabled.
    fn is_compatible(&self, _ctx: &HookContext<'_>) -> bool {
        true
    }

    fn initialize(&self, _ctx: &HookContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    fn on_disable(&self, _ctx: &HookContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    /// May rewrite the command before it is returned to the caller.
    fn on_before_export(
        &self,
        _ctx: &HookContext<'_>,
        _command: &mut EngineCommand,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// Observes the final command right before the engine starts.
    fn on_run_export(&self, _ctx: &HookContext<'_>, _command: &EngineCommand) -> CoreResult<()> {
        Ok(())
    }

    fn on_preprocess_audio(&self, _ctx: &HookContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    /// Free-form entry point; arguments and result are plugin defined.
    fn run(&self, _ctx: &HookContext<'_>, _args: &Value) -> CoreResult<Value> {
        Err(CoreError::PluginError(format!(
            "plugin {} has no run entry point",
            self.name()
        )))
    }
}

/// Hook identifiers, used in logs and reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookName {
    Initialize,
    OnDisable,
    OnBeforeExport,
    OnRunExport,
    OnPreprocessAudio,
    Run,
}

impl HookName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::Initialize => "initialize",
            HookName::OnDisable => "on_disable",
            HookName::OnBeforeExport => "on_before_export",
            HookName::OnRunExport => "on_run_export",
            HookName::OnPreprocessAudio => "on_preprocess_audio",
            HookName::Run => "run",
        }
    }
}

/// One swallowed hook failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HookFailure {
    pub plugin: String,
    pub hook: HookName,
    pub error: String,
}

/// Outcome of invoking a hook across plugins.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HookReport {
    /// Plugins whose hook was called
    pub invoked: Vec<String>,
    pub failures: Vec<HookFailure>,
}

impl HookReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: HookReport) {
        self.invoked.extend(other.invoked);
        self.failures.extend(other.failures);
    }
}
