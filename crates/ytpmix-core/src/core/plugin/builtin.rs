//! Built-in plugins.

use serde_json::{json, Value};

use super::{ExportHook, HookContext};
use crate::core::captions::remix_transcript_seeded;
use crate::core::render::EngineCommand;
use crate::core::{CoreError, CoreResult};

/// `sentence_pooper`: remixes transcript text.
///
/// `run` arguments: `{"text": str, "intensity"?: 0..1, "allow_repeats"?: bool,
/// "seed"?: u64}`; returns `{"text": remixed}`.
#[derive(Debug, Default)]
pub struct SentenceRemixPlugin;

impl ExportHook for SentenceRemixPlugin {
    fn name(&self) -> &str {
        "sentence_pooper"
    }

    fn description(&self) -> &str {
        "Shuffle and stutter words inside each transcript sentence"
    }

    fn run(&self, _ctx: &HookContext<'_>, args: &Value) -> CoreResult<Value> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::PluginError("sentence_pooper needs a text argument".into()))?;
        let intensity = args.get("intensity").and_then(Value::as_f64).unwrap_or(0.5);
        let allow_repeats = args
            .get("allow_repeats")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let seed = args
            .get("seed")
            .and_then(Value::as_u64)
            .unwrap_or_else(rand::random);

        let remixed = remix_transcript_seeded(text, intensity, allow_repeats, seed);
        Ok(json!({ "text": remixed, "seed": seed }))
    }
}

/// `extra_output_args`: appends configured arguments right before the
/// output path of every export.
#[derive(Debug, Default)]
pub struct ExtraOutputArgsPlugin {
    args: Vec<String>,
}

impl ExtraOutputArgsPlugin {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

impl ExportHook for ExtraOutputArgsPlugin {
    fn name(&self) -> &str {
        "extra_output_args"
    }

    fn description(&self) -> &str {
        "Insert extra encoder arguments before the output path"
    }

    fn on_before_export(&self, _ctx: &HookContext<'_>, command: &mut EngineCommand) -> CoreResult<()> {
        if !self.args.is_empty() {
            tracing::debug!("Adding extra output args: {:?}", self.args);
            command.output_args.extend(self.args.iter().cloned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_pooper_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = HookContext::new(dir.path());
        let plugin = SentenceRemixPlugin;
        let args = json!({"text": "one two three four. five six", "seed": 9, "intensity": 1.0});

        let a = plugin.run(&ctx, &args).unwrap();
        let b = plugin.run(&ctx, &args).unwrap();
        assert_eq!(a, b);
        assert!(a["text"].as_str().unwrap().ends_with(". "));
        assert_eq!(a["seed"], 9);
    }

    #[test]
    fn test_sentence_pooper_requires_text() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = HookContext::new(dir.path());
        assert!(matches!(
            SentenceRemixPlugin.run(&ctx, &json!({})),
            Err(CoreError::PluginError(_))
        ));
    }

    #[test]
    fn test_extra_output_args_precede_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = HookContext::new(dir.path());
        let plugin = ExtraOutputArgsPlugin::new(vec!["-movflags".into(), "+faststart".into()]);

        let mut cmd = EngineCommand::new("ffmpeg", "out.mp4");
        cmd.output_args.push("-crf".into());
        plugin.on_before_export(&ctx, &mut cmd).unwrap();

        let args = cmd.args();
        let n = args.len();
        assert_eq!(&args[n - 3..], &["-movflags", "+faststart", "out.mp4"]);
    }
}
