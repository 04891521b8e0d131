// demos/live_preview.rs
//
// Live preview window: a synthetic (or still-image) camera feeds the
// FrameDriver, which renders through the wgpu canvas; the canvas is read
// back into a minifb window every tick.
//
// Usage:
//   cargo run --example live_preview --release
//   cargo run --example live_preview --release -- photo.png
//   cargo run --example live_preview --release -- photo.png preview.toml
//
// Controls:
//   Space  - next mode
//   1..8   - jump to a mode
//   Q/Esc  - quit
//
// Set RUST_LOG=info to see adapter selection and mode switches.

use edge_preview::gpu::canvas::GpuCanvas;
use edge_preview::gpu::device::GpuDevice;
use edge_preview::{FrameDriver, FrameOutcome, FrameSource, LumaPlane, PreviewConfig};

use log::{info, warn};
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use std::env;
use std::path::Path;

const SYNTH_W: usize = 640;
const SYNTH_H: usize = 480;

/// Camera stand-in: either a still image or drifting bright rectangles.
struct DemoCamera {
    width: usize,
    height: usize,
    still: Option<Vec<u8>>,
    buffer: Vec<u8>,
    tick: usize,
}

impl DemoCamera {
    fn synthetic() -> Self {
        DemoCamera {
            width: SYNTH_W,
            height: SYNTH_H,
            still: None,
            buffer: vec![0; SYNTH_W * SYNTH_H],
            tick: 0,
        }
    }

    fn from_image(path: &Path) -> Self {
        let img = image::open(path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e));
        let gray = img.to_luma8();
        let (w, h) = gray.dimensions();
        DemoCamera {
            width: w as usize,
            height: h as usize,
            still: Some(gray.into_raw()),
            buffer: Vec::new(),
            tick: 0,
        }
    }

    fn render_synthetic(&mut self) {
        let (w, h) = (self.width, self.height);
        for y in 0..h {
            for x in 0..w {
                self.buffer[y * w + x] = ((x * 120 / w) + (y * 60 / h)) as u8;
            }
        }
        for r in 0..5 {
            let rx = (40 + r * 120 + self.tick * (r + 1)) % w;
            let ry = (60 + (r % 3) * 130 + self.tick / 2) % h;
            for y in ry..(ry + 70).min(h) {
                for x in rx..(rx + 90).min(w) {
                    self.buffer[y * w + x] = 230;
                }
            }
        }
    }
}

impl FrameSource for DemoCamera {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn next_plane(&mut self) -> Option<LumaPlane<'_>> {
        self.tick += 1;
        if self.still.is_none() {
            self.render_synthetic();
        }
        let data = self.still.as_deref().unwrap_or(&self.buffer);
        Some(LumaPlane::packed(data, self.width))
    }
}

const MODE_KEYS: [Key; 8] = [
    Key::Key1,
    Key::Key2,
    Key::Key3,
    Key::Key4,
    Key::Key5,
    Key::Key6,
    Key::Key7,
    Key::Key8,
];

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut camera = match args.get(1) {
        Some(p) => DemoCamera::from_image(Path::new(p)),
        None => DemoCamera::synthetic(),
    };
    let config = match args.get(2) {
        Some(p) => PreviewConfig::load(p).unwrap_or_else(|e| panic!("bad config {p}: {e}")),
        None => PreviewConfig::default(),
    };

    let (cam_w, cam_h) = camera.dimensions();
    // Sensor rows run along the display's horizontal axis.
    let (win_w, win_h) = (cam_h, cam_w);
    println!("Camera: {}×{}, window {}×{}", cam_w, cam_h, win_w, win_h);

    let gpu = GpuDevice::new().expect("failed to initialise a GPU device");
    println!("GPU: {}", gpu);
    let canvas = GpuCanvas::new(gpu, win_w as u32, win_h as u32).expect("failed to create canvas");

    let mut driver = FrameDriver::new(&config, canvas).expect("failed to build preview pipeline");
    driver.configure_camera(cam_w, cam_h);

    let mut window = Window::new(
        "edge-preview",
        win_w,
        win_h,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    )
    .expect("failed to create window");
    window.set_target_fps(30);

    let mut fb = vec![0u32; win_w * win_h];

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        if window.is_key_pressed(Key::Space, KeyRepeat::No) {
            let next = driver.request_next();
            info!("mode {next}: {:?}", driver.current_mode());
        }
        for (i, key) in MODE_KEYS.iter().enumerate() {
            if window.is_key_pressed(*key, KeyRepeat::No) {
                if let Err(e) = driver.select(i) {
                    warn!("{e}");
                }
            }
        }

        if let Some(FrameOutcome::Dropped(e)) = driver.pull(&mut camera) {
            warn!("camera frame dropped: {e}");
        }
        driver.on_draw();

        match driver.gpu().readback() {
            Ok(rgba) => {
                for (dst, px) in fb.iter_mut().zip(rgba.chunks_exact(4)) {
                    *dst = (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32;
                }
            }
            Err(e) => warn!("readback failed: {e}"),
        }

        let mode = driver.current_mode();
        window.set_title(&format!(
            "edge-preview - mode {} ({} + {})",
            driver.current_index() + 1,
            mode.detector,
            mode.renderer
        ));
        window.update_with_buffer(&fb, win_w, win_h).expect("failed to update window");
    }

    let stats = driver.stats();
    println!(
        "frames detected {}, deferred {}, dropped {}; draws {}; switches {}",
        stats.detected, stats.deferred, stats.dropped, stats.drawn, stats.switches
    );
    driver.shutdown();
}
