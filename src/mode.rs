// mode.rs - Preview mode registry and the mode selector state machine.
//
// REGISTRY (fixed order, index = what the user cycles through):
//
//   0 EdgeWhite       + Texture        4 EdgeGrayscale   + Texture
//   1 EdgeRed         + Texture        5 EdgeBackground  + Texture
//   2 EdgeGreen       + Texture        6 Keypoint        + Squares
//   3 EdgeBlue        + Texture        7 Keypoint        + Lines
//
// STATE MACHINE:
//
//        request_next / select(to)
//   Idle(i) ───────────────────────────► SwitchRequested { from: i, to }
//      ▲                                          │
//      └──────────── complete_switch ─────────────┘
//                   (bind program of `to`)
//
// Resource hand-over happens synchronously inside the request: the old
// renderer and detector are deactivated, then the new detector and
// renderer are activated. Only the program rebind is deferred to the next
// render tick. Instances are shared between modes (one per behaviour), and
// a switch between two modes sharing an instance still cycles it.

use log::{error, info};

use crate::config::PreviewConfig;
use crate::detect::{Detector, DetectorKind};
use crate::error::PipelineError;
use crate::gpu::GpuSubmit;
use crate::render::{ProgramSet, Renderer, RendererKind};

/// An immutable (detector, renderer) pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewMode {
    pub detector: DetectorKind,
    pub renderer: RendererKind,
}

impl PreviewMode {
    pub const fn new(detector: DetectorKind, renderer: RendererKind) -> Self {
        PreviewMode { detector, renderer }
    }
}

const REGISTRY: [PreviewMode; 8] = [
    PreviewMode::new(DetectorKind::EdgeWhite, RendererKind::Texture),
    PreviewMode::new(DetectorKind::EdgeRed, RendererKind::Texture),
    PreviewMode::new(DetectorKind::EdgeGreen, RendererKind::Texture),
    PreviewMode::new(DetectorKind::EdgeBlue, RendererKind::Texture),
    PreviewMode::new(DetectorKind::EdgeGrayscale, RendererKind::Texture),
    PreviewMode::new(DetectorKind::EdgeBackground, RendererKind::Texture),
    PreviewMode::new(DetectorKind::Keypoint, RendererKind::Squares),
    PreviewMode::new(DetectorKind::Keypoint, RendererKind::Lines),
];

/// The built-in mode table.
pub fn registry() -> &'static [PreviewMode] {
    &REGISTRY
}

/// Check that every mode's detector output matches its renderer input.
pub fn validate_registry(modes: &[PreviewMode]) -> Result<(), PipelineError> {
    if modes.is_empty() {
        return Err(PipelineError::EmptyRegistry);
    }
    for (index, m) in modes.iter().enumerate() {
        let produces = m.detector.output();
        let expects = m.renderer.input();
        if produces != expects {
            return Err(PipelineError::IncompatiblePairing {
                index,
                detector: m.detector,
                renderer: m.renderer,
                produces,
                expects,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Idle(usize),
    /// Resources already handed over to `to`; the program of `to` still
    /// needs binding. `from` is the mode whose program is bound.
    SwitchRequested { from: usize, to: usize },
}

#[derive(Debug)]
pub struct ModeSelector {
    modes: Vec<PreviewMode>,
    detectors: Vec<Detector>,
    renderers: Vec<Renderer>,
    programs: ProgramSet,
    state: SelectorState,
}

impl ModeSelector {
    /// Build the selector over the built-in registry, compile programs,
    /// activate mode 0 and bind its program.
    pub fn new<G: GpuSubmit + ?Sized>(config: &PreviewConfig, gpu: &mut G) -> Result<Self, PipelineError> {
        Self::with_modes(config, registry().to_vec(), gpu)
    }

    /// Same as [`new`](Self::new) over a custom mode table.
    pub fn with_modes<G: GpuSubmit + ?Sized>(
        config: &PreviewConfig,
        modes: Vec<PreviewMode>,
        gpu: &mut G,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        validate_registry(&modes)?;

        let detectors = DetectorKind::ALL.iter().map(|&k| Detector::new(k, config)).collect();
        let renderers = RendererKind::ALL
            .iter()
            .map(|&k| Renderer::new(k, &config.markers))
            .collect();
        let programs = ProgramSet::compile(gpu);

        let mut selector = ModeSelector {
            modes,
            detectors,
            renderers,
            programs,
            state: SelectorState::Idle(0),
        };
        selector.activate_mode(0, gpu);
        selector.bind_program(0, gpu);
        info!("preview started in mode 0 ({})", selector.describe(0));
        Ok(selector)
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    pub fn modes(&self) -> &[PreviewMode] {
        &self.modes
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        match self.state {
            SelectorState::Idle(i) => i,
            SelectorState::SwitchRequested { to, .. } => to,
        }
    }

    pub fn current_mode(&self) -> PreviewMode {
        self.modes[self.current_index()]
    }

    pub fn pending_switch(&self) -> bool {
        matches!(self.state, SelectorState::SwitchRequested { .. })
    }

    pub fn programs(&self) -> &ProgramSet {
        &self.programs
    }

    /// Advance to the next mode, wrapping. Returns the new index.
    pub fn request_next<G: GpuSubmit + ?Sized>(&mut self, gpu: &mut G) -> usize {
        let to = (self.current_index() + 1) % self.modes.len();
        self.switch_to(to, gpu);
        to
    }

    /// Jump straight to mode `index`.
    pub fn select<G: GpuSubmit + ?Sized>(&mut self, index: usize, gpu: &mut G) -> Result<(), PipelineError> {
        if index >= self.modes.len() {
            return Err(PipelineError::ModeOutOfRange {
                index,
                count: self.modes.len(),
            });
        }
        if index != self.current_index() {
            self.switch_to(index, gpu);
        }
        Ok(())
    }

    /// Bind the pending mode's program. Returns false when nothing was
    /// pending.
    pub fn complete_switch<G: GpuSubmit + ?Sized>(&mut self, gpu: &mut G) -> bool {
        match self.state {
            SelectorState::Idle(_) => false,
            SelectorState::SwitchRequested { to, .. } => {
                self.bind_program(to, gpu);
                self.state = SelectorState::Idle(to);
                true
            }
        }
    }

    /// The current mode's detector and renderer.
    pub fn current_pair_mut(&mut self) -> (&mut Detector, &mut Renderer) {
        let m = self.current_mode();
        (
            &mut self.detectors[m.detector.index()],
            &mut self.renderers[m.renderer.index()],
        )
    }

    pub fn detector(&self, kind: DetectorKind) -> &Detector {
        &self.detectors[kind.index()]
    }

    pub fn renderer(&self, kind: RendererKind) -> &Renderer {
        &self.renderers[kind.index()]
    }

    /// Deactivate everything and delete the programs.
    pub fn shutdown<G: GpuSubmit + ?Sized>(&mut self, gpu: &mut G) {
        for r in &mut self.renderers {
            r.deactivate(gpu);
        }
        for d in &mut self.detectors {
            d.deactivate();
        }
        self.programs.release(gpu);
    }

    fn switch_to<G: GpuSubmit + ?Sized>(&mut self, to: usize, gpu: &mut G) {
        let current = self.current_index();
        let bound = match self.state {
            SelectorState::Idle(i) => i,
            SelectorState::SwitchRequested { from, .. } => from,
        };

        let old = self.modes[current];
        self.renderers[old.renderer.index()].deactivate(gpu);
        self.detectors[old.detector.index()].deactivate();
        self.activate_mode(to, gpu);

        self.state = SelectorState::SwitchRequested { from: bound, to };
        info!("mode {current} -> {to} ({})", self.describe(to));
    }

    fn activate_mode<G: GpuSubmit + ?Sized>(&mut self, index: usize, gpu: &mut G) {
        let m = self.modes[index];
        self.detectors[m.detector.index()].activate();
        self.renderers[m.renderer.index()].activate(gpu, &self.programs);
    }

    fn bind_program<G: GpuSubmit + ?Sized>(&mut self, index: usize, gpu: &mut G) {
        let program = self.programs.for_renderer(self.modes[index].renderer);
        if program.is_valid() {
            gpu.use_program(program);
        } else {
            error!("mode {index}: no valid program to bind");
        }
    }

    fn describe(&self, index: usize) -> String {
        let m = self.modes[index];
        format!("{} + {}", m.detector, m.renderer)
    }
}
