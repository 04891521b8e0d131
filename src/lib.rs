// edge-preview: real-time camera preview with switchable edge and corner
// visualisations.
//
// Pipeline per camera frame: luma Frame ─► Detector ─► DetectionResult
// ─► Renderer ─► GpuSubmit (wgpu canvas or headless recorder). A
// ModeSelector cycles through eight fixed (detector, renderer) pairings;
// FrameDriver owns the tick logic.

pub mod image;
pub mod convolution;
pub mod gradient;
pub mod canny;
pub mod morphology;
pub mod compose;
pub mod fast;
pub mod nms;

pub mod config;
pub mod error;
pub mod frame;
pub mod detect;
pub mod geometry;
pub mod gpu;
pub mod render;
pub mod mode;
pub mod driver;

pub use config::PreviewConfig;
pub use detect::{DetectionResult, Detector, DetectorKind};
pub use driver::{DrawOutcome, FrameDriver, FrameOutcome, PreviewPipeline};
pub use error::{ConfigError, DetectError, IngestError, PipelineError};
pub use frame::{Frame, FrameSource, LumaPlane};
pub use mode::{ModeSelector, PreviewMode};
pub use render::{Renderer, RendererKind};
