//! Shorthands for building and returning [`crate::error::PipelineError`]s.

/// Builds a [`crate::error::PipelineError`].
///
/// Accepts a kind and a static description, optionally followed by anything implementing
/// [`ToString`] as detail, and optionally by `source: err` to attach the originating error.
///
/// ```
/// use pipeline::error::ErrorKind;
/// use pipeline::pipeline_error;
///
/// let err = pipeline_error!(ErrorKind::UnknownTransform, "Unknown transform", "upper");
/// assert_eq!(err.detail(), Some("upper"));
/// ```
#[macro_export]
macro_rules! pipeline_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::PipelineError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::PipelineError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::PipelineError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::PipelineError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Returns early with a [`crate::error::PipelineError`] built by [`pipeline_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr $(, $($rest:tt)+)?) => {
        return ::core::result::Result::Err($crate::pipeline_error!($kind, $desc $(, $($rest)+)?))
    };
}
