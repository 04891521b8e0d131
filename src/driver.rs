// driver.rs - Frame and draw entry points.
//
// Two independent clocks drive the preview:
//
//   camera ─► on_frame / on_plane ─► detector.detect ─► renderer.consume
//   display ─► on_draw ──────────────────────────────► renderer.draw
//
// While a mode switch is pending both entry points do nothing but the
// draw tick performs the one-time program rebind:
//
//   tick     pending?   on_frame      on_draw
//   ─────────────────────────────────────────────────
//   n        yes        Deferred      Rebound (no draw)
//   n+1      no         Detected      Drawn / Skipped
//
// Ingestion problems (no camera size yet, wrong dimensions, short or
// malformed planes) drop the frame with a warning and never escape.
//
// `PreviewPipeline` wraps the driver in a Mutex so the mode trigger can
// arrive from another thread than the camera and display callbacks.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::config::PreviewConfig;
use crate::detect::OutputKind;
use crate::error::{DetectError, IngestError, PipelineError};
use crate::frame::{Frame, FrameSource, LumaPlane};
use crate::gpu::GpuSubmit;
use crate::mode::{ModeSelector, PreviewMode};
use crate::render::DrawStats;

/// What happened to one incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Detection ran and the renderer holds the result.
    Detected(OutputKind),
    /// A mode switch is pending; the frame was ignored.
    Deferred,
    /// The frame could not be ingested.
    Dropped(IngestError),
    /// The detector refused to run.
    Rejected(DetectError),
}

/// What happened on one render tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The pending switch's program was bound; nothing drawn.
    Rebound,
    Drawn(DrawStats),
    /// The renderer is inactive or has nothing to draw yet.
    Skipped,
}

/// Running counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverStats {
    pub detected: u64,
    pub deferred: u64,
    pub dropped: u64,
    pub drawn: u64,
    pub rebinds: u64,
    pub switches: u64,
}

pub struct FrameDriver<G: GpuSubmit> {
    gpu: G,
    selector: ModeSelector,
    camera: Option<(usize, usize)>,
    packed: Vec<u8>,
    stats: DriverStats,
}

impl<G: GpuSubmit> FrameDriver<G> {
    /// Build the selector on `gpu` and start in mode 0.
    pub fn new(config: &PreviewConfig, mut gpu: G) -> Result<Self, PipelineError> {
        let selector = ModeSelector::new(config, &mut gpu)?;
        Ok(FrameDriver {
            gpu,
            selector,
            camera: None,
            packed: Vec::new(),
            stats: DriverStats::default(),
        })
    }

    /// Set the camera frame size. Frames before this call are dropped.
    pub fn configure_camera(&mut self, width: usize, height: usize) {
        debug!("camera configured for {width}×{height}");
        self.camera = Some((width, height));
    }

    /// Run the current detector on `frame` and hand the result to the
    /// current renderer.
    pub fn on_frame(&mut self, frame: &Frame<'_>) -> FrameOutcome {
        if self.selector.pending_switch() {
            return self.defer();
        }
        if let Err(e) = self.check_size(frame.width(), frame.height()) {
            return self.drop_frame(e);
        }
        Self::detect_and_consume(&mut self.selector, &mut self.stats, frame)
    }

    /// Pack a strided camera plane into driver-owned scratch and process it.
    pub fn on_plane(&mut self, plane: LumaPlane<'_>) -> FrameOutcome {
        if self.selector.pending_switch() {
            return self.defer();
        }
        let Some((w, h)) = self.camera else {
            return self.drop_frame(IngestError::NotConfigured);
        };
        if let Err(e) = plane.pack_into(w, h, &mut self.packed) {
            return self.drop_frame(e);
        }
        let outcome = match Frame::new(&self.packed, w, h) {
            Ok(frame) => Self::detect_and_consume(&mut self.selector, &mut self.stats, &frame),
            Err(e) => {
                self.stats.dropped += 1;
                warn!("frame dropped: {e}");
                FrameOutcome::Dropped(e)
            }
        };
        self.packed.clear();
        outcome
    }

    /// Take one plane from `source` if it has one ready.
    pub fn pull<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Option<FrameOutcome> {
        let (sw, sh) = source.dimensions();
        let plane = source.next_plane()?;
        if self.selector.pending_switch() {
            return Some(self.defer());
        }
        if let Err(e) = self.check_size(sw, sh) {
            return Some(self.drop_frame(e));
        }
        Some(self.on_plane(plane))
    }

    /// One render tick.
    pub fn on_draw(&mut self) -> DrawOutcome {
        if self.selector.complete_switch(&mut self.gpu) {
            self.stats.rebinds += 1;
            return DrawOutcome::Rebound;
        }
        let (_, renderer) = self.selector.current_pair_mut();
        match renderer.draw(&mut self.gpu) {
            Some(stats) => {
                self.stats.drawn += 1;
                DrawOutcome::Drawn(stats)
            }
            None => DrawOutcome::Skipped,
        }
    }

    /// Advance to the next mode. Returns its index.
    pub fn request_next(&mut self) -> usize {
        self.stats.switches += 1;
        self.selector.request_next(&mut self.gpu)
    }

    /// Jump to mode `index`.
    pub fn select(&mut self, index: usize) -> Result<(), PipelineError> {
        let before = self.selector.state();
        self.selector.select(index, &mut self.gpu)?;
        if self.selector.state() != before {
            self.stats.switches += 1;
        }
        Ok(())
    }

    pub fn current_index(&self) -> usize {
        self.selector.current_index()
    }

    pub fn current_mode(&self) -> PreviewMode {
        self.selector.current_mode()
    }

    pub fn pending_switch(&self) -> bool {
        self.selector.pending_switch()
    }

    pub fn selector(&self) -> &ModeSelector {
        &self.selector
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    /// Release every GPU resource the preview holds.
    pub fn shutdown(&mut self) {
        self.selector.shutdown(&mut self.gpu);
    }

    fn check_size(&self, width: usize, height: usize) -> Result<(), IngestError> {
        match self.camera {
            None => Err(IngestError::NotConfigured),
            Some((w, h)) if (w, h) != (width, height) => Err(IngestError::DimensionMismatch {
                expected_w: w,
                expected_h: h,
                got_w: width,
                got_h: height,
            }),
            Some(_) => Ok(()),
        }
    }

    fn defer(&mut self) -> FrameOutcome {
        self.stats.deferred += 1;
        debug!("frame deferred: mode switch pending");
        FrameOutcome::Deferred
    }

    fn drop_frame(&mut self, e: IngestError) -> FrameOutcome {
        self.stats.dropped += 1;
        warn!("frame dropped: {e}");
        FrameOutcome::Dropped(e)
    }

    fn detect_and_consume(selector: &mut ModeSelector, stats: &mut DriverStats, frame: &Frame<'_>) -> FrameOutcome {
        let (detector, renderer) = selector.current_pair_mut();
        match detector.detect(frame) {
            Ok(result) => {
                let kind = result.kind();
                renderer.consume(result);
                stats.detected += 1;
                FrameOutcome::Detected(kind)
            }
            Err(e) => {
                stats.dropped += 1;
                warn!("frame dropped: {e}");
                FrameOutcome::Rejected(e)
            }
        }
    }
}

/// Thread-safe front for [`FrameDriver`]. Every call runs under one lock.
pub struct PreviewPipeline<G: GpuSubmit> {
    inner: Mutex<FrameDriver<G>>,
}

impl<G: GpuSubmit> PreviewPipeline<G> {
    pub fn new(config: &PreviewConfig, gpu: G) -> Result<Self, PipelineError> {
        Ok(PreviewPipeline {
            inner: Mutex::new(FrameDriver::new(config, gpu)?),
        })
    }

    /// Lock the driver. A poisoned lock is recovered: the driver's state is
    /// consistent between calls.
    pub fn lock(&self) -> MutexGuard<'_, FrameDriver<G>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn configure_camera(&self, width: usize, height: usize) {
        self.lock().configure_camera(width, height);
    }

    pub fn on_frame(&self, frame: &Frame<'_>) -> FrameOutcome {
        self.lock().on_frame(frame)
    }

    pub fn on_plane(&self, plane: LumaPlane<'_>) -> FrameOutcome {
        self.lock().on_plane(plane)
    }

    pub fn on_draw(&self) -> DrawOutcome {
        self.lock().on_draw()
    }

    pub fn request_next(&self) -> usize {
        self.lock().request_next()
    }

    pub fn select(&self, index: usize) -> Result<(), PipelineError> {
        self.lock().select(index)
    }

    pub fn stats(&self) -> DriverStats {
        self.lock().stats()
    }

    pub fn into_inner(self) -> FrameDriver<G> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recorder::CommandRecorder;

    fn driver() -> FrameDriver<CommandRecorder> {
        let mut d = FrameDriver::new(&PreviewConfig::default(), CommandRecorder::new()).unwrap();
        d.configure_camera(32, 24);
        d
    }

    #[test]
    fn test_frame_before_configure_dropped() {
        let mut d = FrameDriver::new(&PreviewConfig::default(), CommandRecorder::new()).unwrap();
        let data = vec![0u8; 32 * 24];
        let frame = Frame::new(&data, 32, 24).unwrap();
        assert_eq!(d.on_frame(&frame), FrameOutcome::Dropped(IngestError::NotConfigured));
        assert_eq!(
            d.on_plane(LumaPlane::packed(&data, 32)),
            FrameOutcome::Dropped(IngestError::NotConfigured)
        );
        assert_eq!(d.stats().dropped, 2);
    }

    #[test]
    fn test_corrupt_plane_strides_dropped() {
        let mut d = FrameDriver::new(&PreviewConfig::default(), CommandRecorder::new()).unwrap();
        d.configure_camera(4, 2);
        let data = [0u8; 16];
        let plane = LumaPlane { data: &data, row_stride: 8, pixel_stride: usize::MAX / 2 };
        assert!(matches!(
            d.on_plane(plane),
            FrameOutcome::Dropped(IngestError::InvalidStride { .. })
        ));
        let plane = LumaPlane { data: &data, row_stride: usize::MAX / 2, pixel_stride: 1 };
        d.configure_camera(4, 3);
        assert!(matches!(
            d.on_plane(plane),
            FrameOutcome::Dropped(IngestError::InvalidStride { .. })
        ));
        assert_eq!(d.stats().dropped, 2);
        assert_eq!(d.stats().detected, 0);
    }

    #[test]
    fn test_oversized_camera_dropped() {
        let mut d = FrameDriver::new(&PreviewConfig::default(), CommandRecorder::new()).unwrap();
        d.configure_camera(usize::MAX, 2);
        assert!(matches!(
            d.on_plane(LumaPlane::packed(&[0u8; 8], 4)),
            FrameOutcome::Dropped(IngestError::InvalidStride { .. } | IngestError::TooLarge { .. })
        ));
        assert_eq!(d.stats().dropped, 1);
    }

    #[test]
    fn test_dimension_mismatch_dropped() {
        let mut d = driver();
        let data = vec![0u8; 16 * 16];
        let frame = Frame::new(&data, 16, 16).unwrap();
        assert!(matches!(
            d.on_frame(&frame),
            FrameOutcome::Dropped(IngestError::DimensionMismatch { got_w: 16, got_h: 16, .. })
        ));
    }

    #[test]
    fn test_detect_then_draw() {
        let mut d = driver();
        assert_eq!(d.on_draw(), DrawOutcome::Skipped);
        let data = vec![50u8; 32 * 24];
        let frame = Frame::new(&data, 32, 24).unwrap();
        assert_eq!(d.on_frame(&frame), FrameOutcome::Detected(OutputKind::Image));
        assert_eq!(d.on_draw(), DrawOutcome::Drawn(DrawStats { points: 0, elements: 6 }));
        // Consumed data stays drawable.
        assert!(matches!(d.on_draw(), DrawOutcome::Drawn(_)));
        assert_eq!(d.stats().drawn, 2);
    }

    #[test]
    fn test_switch_defers_one_frame_and_one_draw() {
        let mut d = driver();
        let data = vec![50u8; 32 * 24];
        let frame = Frame::new(&data, 32, 24).unwrap();
        d.on_frame(&frame);

        d.request_next();
        assert_eq!(d.on_frame(&frame), FrameOutcome::Deferred);
        let draws_before = d.gpu().draws().count();
        assert_eq!(d.on_draw(), DrawOutcome::Rebound);
        assert_eq!(d.gpu().draws().count(), draws_before);

        assert_eq!(d.on_frame(&frame), FrameOutcome::Detected(OutputKind::Image));
        assert!(matches!(d.on_draw(), DrawOutcome::Drawn(_)));
        let s = d.stats();
        assert_eq!((s.deferred, s.rebinds, s.switches), (1, 1, 1));
    }

    #[test]
    fn test_short_plane_dropped() {
        let mut d = driver();
        let data = vec![0u8; 100];
        assert!(matches!(
            d.on_plane(LumaPlane::packed(&data, 32)),
            FrameOutcome::Dropped(IngestError::PlaneTooShort { .. })
        ));
    }

    #[test]
    fn test_strided_plane_detected() {
        let mut d = driver();
        d.select(6).unwrap();
        d.on_draw();
        let data = vec![9u8; 40 * 24];
        let plane = LumaPlane {
            data: &data,
            row_stride: 40,
            pixel_stride: 1,
        };
        assert_eq!(d.on_plane(plane), FrameOutcome::Detected(OutputKind::Points));
        // Flat frame: no corners, marker target cleared without a draw.
        assert_eq!(d.on_draw(), DrawOutcome::Drawn(DrawStats::default()));
    }

    struct Flat {
        data: Vec<u8>,
        ready: bool,
    }

    impl FrameSource for Flat {
        fn dimensions(&self) -> (usize, usize) {
            (32, 24)
        }

        fn next_plane(&mut self) -> Option<LumaPlane<'_>> {
            if !std::mem::replace(&mut self.ready, false) {
                return None;
            }
            Some(LumaPlane::packed(&self.data, 32))
        }
    }

    #[test]
    fn test_pull_from_source() {
        let mut d = driver();
        let mut src = Flat {
            data: vec![1; 32 * 24],
            ready: true,
        };
        assert_eq!(d.pull(&mut src), Some(FrameOutcome::Detected(OutputKind::Image)));
        assert_eq!(d.pull(&mut src), None);
    }

    #[test]
    fn test_select_counts_only_real_switches() {
        let mut d = driver();
        d.select(0).unwrap();
        assert_eq!(d.stats().switches, 0);
        d.select(3).unwrap();
        assert_eq!(d.stats().switches, 1);
        assert!(d.select(99).is_err());
    }

    #[test]
    fn test_pipeline_across_threads() {
        use std::sync::Arc;

        let p = Arc::new(PreviewPipeline::new(&PreviewConfig::default(), CommandRecorder::new()).unwrap());
        p.configure_camera(16, 16);
        let trigger = {
            let p = Arc::clone(&p);
            std::thread::spawn(move || {
                for _ in 0..8 {
                    p.request_next();
                }
            })
        };
        let data = vec![3u8; 256];
        for _ in 0..20 {
            let frame = Frame::new(&data, 16, 16).unwrap();
            p.on_frame(&frame);
            p.on_draw();
        }
        trigger.join().unwrap();
        p.on_draw();
        let d = p.lock();
        assert_eq!(d.current_index(), 0);
        assert!(!d.pending_switch());
        assert_eq!(d.stats().switches, 8);
    }
}
