//! Plugin registry: explicit registration, enabled flags, guarded hook calls.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::builtin::{ExtraOutputArgsPlugin, SentenceRemixPlugin};
use super::{ExportHook, HookContext, HookFailure, HookName, HookReport};
use crate::core::fs::atomic_write_json_pretty;
use crate::core::render::EngineCommand;
use crate::core::settings::PluginSettings;
use crate::core::{CoreError, CoreResult};

/// Default file holding enabled flags
pub const PLUGIN_CONFIG_FILE: &str = ".plugins.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PluginConfigFile {
    #[serde(default)]
    enabled: BTreeMap<String, bool>,
}

/// Summary of a registered plugin
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

/// Registered plugins in registration order.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ExportHook>>,
    enabled: RwLock<BTreeMap<String, bool>>,
    config_path: Option<PathBuf>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .field("config_path", &self.config_path)
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Registry without persistence
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            enabled: RwLock::new(BTreeMap::new()),
            config_path: None,
        }
    }

    /// Registry persisting enabled flags to `path`. An unreadable file is
    /// treated as "nothing enabled".
    pub fn with_config(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let enabled = load_config(&path);
        Self {
            plugins: Vec::new(),
            enabled: RwLock::new(enabled),
            config_path: Some(path),
        }
    }

    /// Registry with the built-in plugins, seeded from settings.
    ///
    /// Flags stored in the config file take precedence over settings.
    pub fn from_settings(settings: &PluginSettings) -> Self {
        let mut registry = Self::with_config(&settings.config_path);
        {
            let mut enabled = registry.enabled_mut();
            for (name, on) in &settings.enabled {
                enabled.entry(name.clone()).or_insert(*on);
            }
        }

        let builtins: [Arc<dyn ExportHook>; 2] = [
            Arc::new(SentenceRemixPlugin::default()),
            Arc::new(ExtraOutputArgsPlugin::new(settings.extra_output_args.clone())),
        ];
        for plugin in builtins {
            if let Err(e) = registry.register(plugin) {
                warn!("Failed to register built-in plugin: {}", e);
            }
        }
        registry
    }

    fn enabled_ref(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, bool>> {
        self.enabled.read().unwrap_or_else(|e| e.into_inner())
    }

    fn enabled_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, bool>> {
        self.enabled.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a plugin. Names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn ExportHook>) -> CoreResult<()> {
        let name = plugin.name().to_string();
        if self.find(&name).is_some() {
            return Err(CoreError::PluginError(format!(
                "plugin {name} is already registered"
            )));
        }
        self.enabled_mut().entry(name.clone()).or_insert(false);
        self.plugins.push(plugin);
        info!("Registered plugin: {}", name);
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn ExportHook>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    fn require(&self, name: &str) -> CoreResult<&Arc<dyn ExportHook>> {
        self.find(name)
            .ok_or_else(|| CoreError::PluginNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn list(&self) -> Vec<PluginInfo> {
        let enabled = self.enabled_ref();
        self.plugins
            .iter()
            .map(|p| PluginInfo {
                name: p.name().to_string(),
                description: p.description().to_string(),
                enabled: enabled.get(p.name()).copied().unwrap_or(false),
            })
            .collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.find(name).is_some() && self.enabled_ref().get(name).copied().unwrap_or(false)
    }

    /// Enable a plugin and call its `initialize` hook.
    pub fn enable(&self, name: &str, ctx: &HookContext<'_>) -> CoreResult<HookReport> {
        let plugin = Arc::clone(self.require(name)?);
        if !plugin.is_compatible(ctx) {
            return Err(CoreError::PluginError(format!(
                "plugin {name} is not compatible with this session"
            )));
        }

        self.enabled_mut().insert(name.to_string(), true);
        self.save_config();
        info!("Enabled plugin: {}", name);

        let mut report = HookReport::default();
        invoke(&mut report, &plugin, HookName::Initialize, || plugin.initialize(ctx));
        Ok(report)
    }

    /// Disable a plugin and call its `on_disable` hook.
    pub fn disable(&self, name: &str, ctx: &HookContext<'_>) -> CoreResult<HookReport> {
        let plugin = Arc::clone(self.require(name)?);

        self.enabled_mut().insert(name.to_string(), false);
        self.save_config();
        info!("Disabled plugin: {}", name);

        let mut report = HookReport::default();
        invoke(&mut report, &plugin, HookName::OnDisable, || plugin.on_disable(ctx));
        Ok(report)
    }

    /// Call a plugin's `run` entry point. Errors are returned to the caller;
    /// a panic becomes [`CoreError::PluginError`].
    pub fn run(&self, name: &str, ctx: &HookContext<'_>, args: &Value) -> CoreResult<Value> {
        let plugin = self.require(name)?;
        if !self.is_enabled(name) {
            return Err(CoreError::PluginNotEnabled(name.to_string()));
        }

        match catch_unwind(AssertUnwindSafe(|| plugin.run(ctx, args))) {
            Ok(result) => result,
            Err(payload) => Err(CoreError::PluginError(format!(
                "plugin {name} panicked in run: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn enabled_plugins(&self) -> Vec<Arc<dyn ExportHook>> {
        let enabled = self.enabled_ref();
        self.plugins
            .iter()
            .filter(|p| enabled.get(p.name()).copied().unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Call a context-only hook on every enabled plugin, in registration order.
    pub fn run_hook_all(&self, hook: HookName, ctx: &HookContext<'_>) -> HookReport {
        let mut report = HookReport::default();
        for plugin in self.enabled_plugins() {
            invoke(&mut report, &plugin, hook, || match hook {
                HookName::Initialize => plugin.initialize(ctx),
                HookName::OnDisable => plugin.on_disable(ctx),
                HookName::OnPreprocessAudio => plugin.on_preprocess_audio(ctx),
                HookName::OnBeforeExport | HookName::OnRunExport | HookName::Run => {
                    Err(CoreError::PluginError(format!(
                        "{} needs arguments and cannot be broadcast",
                        hook.as_str()
                    )))
                }
            });
        }
        report
    }

    /// Let enabled plugins rewrite `command`.
    pub fn before_export(&self, ctx: &HookContext<'_>, command: &mut EngineCommand) -> HookReport {
        let mut report = HookReport::default();
        for plugin in self.enabled_plugins() {
            invoke(&mut report, &plugin, HookName::OnBeforeExport, || {
                plugin.on_before_export(ctx, command)
            });
        }
        report
    }

    /// Notify enabled plugins that `command` is about to run.
    pub fn run_export(&self, ctx: &HookContext<'_>, command: &EngineCommand) -> HookReport {
        let mut report = HookReport::default();
        for plugin in self.enabled_plugins() {
            invoke(&mut report, &plugin, HookName::OnRunExport, || {
                plugin.on_run_export(ctx, command)
            });
        }
        report
    }

    fn save_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        let file = PluginConfigFile {
            enabled: self.enabled_ref().clone(),
        };
        if let Err(e) = atomic_write_json_pretty(path, &file) {
            warn!(path = %path.display(), error = %e, "Failed to save plugin config");
        }
    }
}

fn load_config(path: &Path) -> BTreeMap<String, bool> {
    if !path.exists() {
        return BTreeMap::new();
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<PluginConfigFile>(&s).map_err(|e| e.to_string()));
    match parsed {
        Ok(file) => file.enabled,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable plugin config");
            BTreeMap::new()
        }
    }
}

/// Run one hook, turning errors and panics into a logged [`HookFailure`].
fn invoke(
    report: &mut HookReport,
    plugin: &Arc<dyn ExportHook>,
    hook: HookName,
    call: impl FnOnce() -> CoreResult<()>,
) {
    let name = plugin.name().to_string();
    let error = match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
    };

    if let Some(error) = error {
        warn!(plugin = %name, hook = hook.as_str(), error = %error, "Plugin hook failed");
        report.failures.push(HookFailure {
            plugin: name.clone(),
            hook,
            error,
        });
    }
    report.invoked.push(name);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
