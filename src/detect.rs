// detect.rs - The seven detector behaviours.
//
// A Detector turns one borrowed luma Frame into a DetectionResult:
//
//   EdgeWhite       Canny ─► blend(src, edges)            ─► RGB
//   EdgeRed/G/B     Canny ─► dilate(small) ─► one channel  ─► RGB
//   EdgeGrayscale   Canny ─► dilate(20×20) ─► src & mask   ─► RGB
//   EdgeBackground  Canny ─► blend(edges, src)            ─► RGB
//   Keypoint        FAST-9 ─► 3×3 NMS                      ─► points
//
// The set of behaviours is closed, so dispatch is a `match` on
// `DetectorKind`. Scratch buffers exist only while the detector is
// active: `activate` builds them, `deactivate` drops them, and `detect`
// on an inactive detector is an error rather than a silent allocation.

use std::fmt;

use log::debug;

use crate::canny::Canny;
use crate::compose::{self, Channel};
use crate::config::{EdgeParams, KeypointParams, PreviewConfig};
use crate::error::DetectError;
use crate::fast::{FastDetector, Keypoint};
use crate::frame::Frame;
use crate::image::Image;
use crate::morphology::Dilation;
use crate::nms::ScoreNms;

/// Which detector behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    EdgeWhite,
    EdgeRed,
    EdgeGreen,
    EdgeBlue,
    EdgeGrayscale,
    EdgeBackground,
    Keypoint,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 7] = [
        DetectorKind::EdgeWhite,
        DetectorKind::EdgeRed,
        DetectorKind::EdgeGreen,
        DetectorKind::EdgeBlue,
        DetectorKind::EdgeGrayscale,
        DetectorKind::EdgeBackground,
        DetectorKind::Keypoint,
    ];

    /// Position in [`ALL`](Self::ALL).
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn output(self) -> OutputKind {
        match self {
            DetectorKind::Keypoint => OutputKind::Points,
            _ => OutputKind::Image,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::EdgeWhite => "edge-white",
            DetectorKind::EdgeRed => "edge-red",
            DetectorKind::EdgeGreen => "edge-green",
            DetectorKind::EdgeBlue => "edge-blue",
            DetectorKind::EdgeGrayscale => "edge-grayscale",
            DetectorKind::EdgeBackground => "edge-background",
            DetectorKind::Keypoint => "keypoint",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a detector produces, and what a renderer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Image,
    Points,
}

/// Channel layout of a [`ProcessedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Gray8,
    Rgb8,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb8 => 3,
        }
    }
}

/// Owned, tightly packed pixel data at the frame's size.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub width: usize,
    pub height: usize,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl ProcessedImage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Channel values of the pixel at (x, y).
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let c = self.layout.channels();
        let i = (y * self.width + x) * c;
        &self.data[i..i + c]
    }
}

/// Corners in image pixel coordinates, plus the size of the frame they
/// were found in (needed to map them to NDC).
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointSet {
    pub width: usize,
    pub height: usize,
    pub points: Vec<Keypoint>,
}

/// Output of one `detect` call. Exactly one variant per call.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    ProcessedImage(ProcessedImage),
    KeypointSet(KeypointSet),
}

impl DetectionResult {
    pub fn kind(&self) -> OutputKind {
        match self {
            DetectionResult::ProcessedImage(_) => OutputKind::Image,
            DetectionResult::KeypointSet(_) => OutputKind::Points,
        }
    }
}

struct EdgeScratch {
    luma: Image<u8>,
    canny: Canny,
    edges: Image<u8>,
    dilation: Option<Dilation>,
    mask: Image<u8>,
}

struct KeypointScratch {
    luma: Image<u8>,
    fast: FastDetector,
    nms: Option<ScoreNms>,
    corners: Vec<Keypoint>,
}

enum Scratch {
    Edge(EdgeScratch),
    Keypoint(KeypointScratch),
}

/// One detector instance. Lives for the whole session; only its scratch
/// comes and goes with activation.
pub struct Detector {
    kind: DetectorKind,
    edges: EdgeParams,
    keypoints: KeypointParams,
    scratch: Option<Scratch>,
}

impl Detector {
    pub fn new(kind: DetectorKind, config: &PreviewConfig) -> Self {
        Detector {
            kind,
            edges: config.edges.clone(),
            keypoints: config.keypoints.clone(),
            scratch: None,
        }
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.scratch.is_some()
    }

    /// Build scratch resources. A no-op if already active.
    pub fn activate(&mut self) {
        if self.scratch.is_some() {
            return;
        }
        let e = &self.edges;
        let dilation = match self.kind {
            DetectorKind::EdgeRed | DetectorKind::EdgeGreen | DetectorKind::EdgeBlue => {
                Some(Dilation::square(e.color_dilation))
            }
            DetectorKind::EdgeGrayscale => Some(Dilation::square(e.band_dilation)),
            _ => None,
        };
        self.scratch = Some(match self.kind {
            DetectorKind::Keypoint => Scratch::Keypoint(KeypointScratch {
                luma: Image::default(),
                fast: FastDetector::new(self.keypoints.threshold, self.keypoints.arc_length),
                nms: self.keypoints.nonmax_suppression.then(ScoreNms::new),
                corners: Vec::new(),
            }),
            _ => Scratch::Edge(EdgeScratch {
                luma: Image::default(),
                canny: Canny::new(e.low_threshold, e.high_threshold),
                edges: Image::default(),
                dilation,
                mask: Image::default(),
            }),
        });
        debug!("detector {} activated", self.kind);
    }

    /// Drop scratch resources.
    pub fn deactivate(&mut self) {
        if self.scratch.take().is_some() {
            debug!("detector {} deactivated", self.kind);
        }
    }

    /// Run this detector on one frame. The frame is not retained.
    pub fn detect(&mut self, frame: &Frame<'_>) -> Result<DetectionResult, DetectError> {
        let kind = self.kind;
        let weight = self.edges.blend_weight;
        match self.scratch.as_mut() {
            None => Err(DetectError::Inactive(kind)),
            Some(Scratch::Edge(s)) => Ok(DetectionResult::ProcessedImage(detect_edges(kind, weight, s, frame))),
            Some(Scratch::Keypoint(s)) => Ok(DetectionResult::KeypointSet(KeypointSet {
                width: frame.width(),
                height: frame.height(),
                points: detect_keypoints(s, frame),
            })),
        }
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

fn detect_edges(kind: DetectorKind, weight: f32, s: &mut EdgeScratch, frame: &Frame<'_>) -> ProcessedImage {
    frame.copy_into(&mut s.luma);
    s.canny.detect(&s.luma, &mut s.edges);

    let mut data = Vec::new();
    match kind {
        DetectorKind::EdgeWhite => {
            compose::blend_to_rgb(&s.luma, 1.0 - weight, &s.edges, weight, &mut data);
        }
        DetectorKind::EdgeBackground => {
            compose::blend_to_rgb(&s.edges, weight, &s.luma, 1.0 - weight, &mut data);
        }
        DetectorKind::EdgeRed | DetectorKind::EdgeGreen | DetectorKind::EdgeBlue => {
            let channel = match kind {
                DetectorKind::EdgeRed => Channel::Red,
                DetectorKind::EdgeGreen => Channel::Green,
                _ => Channel::Blue,
            };
            dilate_edges(s);
            compose::channel_to_rgb(&s.mask, channel, &mut data);
        }
        DetectorKind::EdgeGrayscale => {
            dilate_edges(s);
            compose::masked_copy_rgb(&s.luma, &s.mask, &mut data);
        }
        DetectorKind::Keypoint => unreachable!("keypoint detector holds keypoint scratch"),
    }

    ProcessedImage {
        width: frame.width(),
        height: frame.height(),
        layout: PixelLayout::Rgb8,
        data,
    }
}

fn dilate_edges(s: &mut EdgeScratch) {
    match s.dilation.as_mut() {
        Some(d) => d.apply(&s.edges, &mut s.mask),
        None => std::mem::swap(&mut s.mask, &mut s.edges),
    }
}

fn detect_keypoints(s: &mut KeypointScratch, frame: &Frame<'_>) -> Vec<Keypoint> {
    frame.copy_into(&mut s.luma);
    let mut out = Vec::new();
    match s.nms.as_mut() {
        Some(nms) => {
            s.fast.detect_into(&s.luma, &mut s.corners);
            nms.suppress_into(&s.corners, frame.width(), frame.height(), &mut out);
        }
        None => s.fast.detect_into(&s.luma, &mut out),
    }
    debug!("keypoint detector: {} points", out.len());
    out
}
