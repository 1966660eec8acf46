//! Execution context the engine runs under.

/// How the current process was invoked. Rate limits apply only to live
/// served requests - CLI invocations and background jobs are never counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Http,
    Cli,
    Background,
}

/// Runtime context threaded into the evaluator at construction, so
/// evaluation never probes process-global state.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeContext {
    pub mode: RuntimeMode,
    /// Whether this deployment is serving automated-test traffic.
    pub test_run: bool,
}

impl RuntimeContext {
    pub fn http() -> Self {
        Self {
            mode: RuntimeMode::Http,
            test_run: false,
        }
    }

    pub fn cli() -> Self {
        Self {
            mode: RuntimeMode::Cli,
            test_run: false,
        }
    }

    pub fn background() -> Self {
        Self {
            mode: RuntimeMode::Background,
            test_run: false,
        }
    }

    pub fn with_test_run(mut self, test_run: bool) -> Self {
        self.test_run = test_run;
        self
    }

    /// Whether this context serves live requests that limits apply to.
    pub fn limits_apply(&self) -> bool {
        matches!(self.mode, RuntimeMode::Http)
    }
}
