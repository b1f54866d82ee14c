//! Duration probing seam used by the effect compiler.

use std::path::Path;
use std::sync::Arc;

use super::FFmpegRunner;
use crate::core::CoreResult;

/// Answers "how long is this source, in seconds".
///
/// Implementations must fail with [`CoreError::Probe`](crate::core::CoreError::Probe)
/// when the duration cannot be determined and never return a negative value.
pub trait DurationProber: Send + Sync {
    fn probe(&self, path: &Path) -> CoreResult<f64>;
}

impl DurationProber for FFmpegRunner {
    fn probe(&self, path: &Path) -> CoreResult<f64> {
        let duration = self.probe_duration(path)?;
        tracing::debug!("Probed {} -> {:.3}s", path.display(), duration);
        Ok(duration)
    }
}

impl<P: DurationProber + ?Sized> DurationProber for Arc<P> {
    fn probe(&self, path: &Path) -> CoreResult<f64> {
        (**self).probe(path)
    }
}
