use thiserror::Error;

/// Fault taxonomy for the control core.
///
/// Everything except [`Error::FatalFallback`] is recoverable: controllers map
/// it to a zero-force output at the trait boundary and the simulation keeps
/// ticking.
#[derive(Debug, Error)]
pub enum Error {
    /// A computation produced a degenerate or non-finite value.
    #[error("numeric fault in {context}")]
    Numeric { context: &'static str },

    /// No rule fired above the discretization resolution, so the aggregated
    /// output set carries no area and the centroid is undefined.
    #[error("no rule activation over the output universe")]
    NoActivation,

    /// A membership function, universe or rule base failed validation.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// The hard-coded fallback genome itself failed to materialize. There is
    /// no safe state to continue from.
    #[error("fallback genome failed to materialize: {source}")]
    FatalFallback { source: Box<Error> },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
