use strum::Display;

/// The coarse classification of every error the engine can return. The
/// provisioning layer uses it to decide how a failure is surfaced.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorCategory {
    /// A malformed or missing template, binding or generation config, or an
    /// invalid JSON pointer. These are operator mistakes.
    Configuration,

    /// A required parameter is missing or a client-supplied value has the
    /// wrong type. These are surfaced to the API caller as request errors.
    Parameter,

    /// Random source or cryptographic failures.
    Generation,

    /// Failures of the registry backend, passed through unchanged.
    Registry,
}

impl ErrorCategory {
    /// Whether retrying the same request can succeed without any change to
    /// the configuration or the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Generation | Self::Registry)
    }
}
