// error.rs - Error taxonomy for the preview pipeline.
//
// Only construction-time problems (bad configuration, inconsistent mode
// table, GPU device creation) are returned to the caller. Per-tick problems
// (frames before configuration, short camera planes, detectors asked to run
// while inactive) are produced here but consumed by the driver, which logs
// them and abandons the tick.

use std::path::PathBuf;

use thiserror::Error;

use crate::detect::{DetectorKind, OutputKind};
use crate::gpu::device::GpuError;
use crate::render::RendererKind;

/// Problems loading or validating a [`PreviewConfig`](crate::config::PreviewConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Frame-ingestion failures. Recovered locally by dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("frame received before camera size was configured")]
    NotConfigured,
    #[error("frame is {got_w}×{got_h}, camera configured for {expected_w}×{expected_h}")]
    DimensionMismatch {
        expected_w: usize,
        expected_h: usize,
        got_w: usize,
        got_h: usize,
    },
    #[error("frame size {width}×{height} overflows the address space")]
    TooLarge { width: usize, height: usize },
    #[error("camera plane holds {got} bytes, {needed} needed for the configured size")]
    PlaneTooShort { needed: usize, got: usize },
    #[error("invalid plane strides (row {row_stride}, pixel {pixel_stride}) for width {width}")]
    InvalidStride {
        row_stride: usize,
        pixel_stride: usize,
        width: usize,
    },
}

/// Detector misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DetectError {
    #[error("{0:?} detector used while inactive")]
    Inactive(DetectorKind),
}

/// Construction and mode-selection failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("mode index {index} out of range (registry holds {count} modes)")]
    ModeOutOfRange { index: usize, count: usize },
    #[error("mode {index}: {detector:?} produces {produces:?} but {renderer:?} expects {expects:?}")]
    IncompatiblePairing {
        index: usize,
        detector: DetectorKind,
        renderer: RendererKind,
        produces: OutputKind,
        expects: OutputKind,
    },
    #[error("mode registry is empty")]
    EmptyRegistry,
}
