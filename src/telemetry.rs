//! Telemetry hooks for engine runs.

use crate::engine::Language;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Source,
    Toolchain,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Source => "source",
            RunMode::Toolchain => "toolchain",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure(String),
}

/// One completed engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRunEvent {
    pub language: Language,
    pub mode: RunMode,
    pub duration: Duration,
    pub types: usize,
    pub diagnostics: usize,
    pub outcome: RunOutcome,
}

/// Receives engine run events. Implementations must be cheap; they are
/// called on the engine's thread.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &EngineRunEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: &EngineRunEvent) {
        match &event.outcome {
            RunOutcome::Success => tracing::info!(
                language = %event.language,
                mode = %event.mode,
                types = event.types,
                diagnostics = event.diagnostics,
                elapsed_ms = event.duration.as_millis() as u64,
                "engine run finished"
            ),
            RunOutcome::Failure(reason) => tracing::warn!(
                language = %event.language,
                mode = %event.mode,
                elapsed_ms = event.duration.as_millis() as u64,
                %reason,
                "engine run failed"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collects events for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingTelemetry {
        pub events: Mutex<Vec<EngineRunEvent>>,
    }

    impl TelemetrySink for RecordingTelemetry {
        fn record(&self, event: &EngineRunEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
