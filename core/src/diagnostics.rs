use std::sync::Arc;

/// Single channel through which transition failures are surfaced.
pub trait DiagnosticsService: Send + Sync + 'static {
    fn error(&self, error: &anyhow::Error);
    fn fatal(&self, error: &anyhow::Error);
}

/// Reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsService for TracingDiagnostics {
    fn error(&self, error: &anyhow::Error) {
        tracing::error!(error = ?error, "{error:#}");
    }

    fn fatal(&self, error: &anyhow::Error) {
        tracing::error!(error = ?error, fatal = true, "{error:#}");
    }
}

pub type SharedDiagnostics = Arc<dyn DiagnosticsService>;
