// gpu/device.rs - wgpu adapter and device selection.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` power heuristics can pick llvmpipe on
// machines that also expose a real GPU. We enumerate explicitly and take
// the first adapter in this order:
//
//   DiscreteGpu / IntegratedGpu   real hardware          <- preferred
//   VirtualGpu / Other            VM pass-through, dzn   <- acceptable
//   Cpu                           software rasteriser    <- last resort
//
// Falling back to a software adapter keeps the preview usable in CI and
// headless containers; the chosen adapter is logged at info.
//
// DEVICE LIMITS:
// `DeviceProfile::Embedded` requests the texture limits of the phone and
// SBC class hardware the preview targets (4096² textures), so a camera
// size the target could not upload is rejected on the development machine
// too.

use std::fmt;

use log::info;
use thiserror::Error;

/// Hardware profile controlling requested device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// The adapter's default limits.
    Native,
    /// Cap texture size to what embedded GPUs guarantee.
    Embedded,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::Embedded => write!(f, "Embedded (capped limits)"),
        }
    }
}

/// Adapter information kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device and queue. Create once per process.
///
/// # Field drop order
/// Fields drop top to bottom; `_instance` is last so the instance outlives
/// the device and queue.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub limits: wgpu::Limits,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags,
            ..Default::default()
        });

        let mut adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        if adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &adapters {
            let info = a.get_info();
            info!("adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        adapters.sort_by_key(|a| adapter_rank(a.get_info().device_type));
        let adapter = adapters.into_iter().next().ok_or(GpuError::NoSuitableAdapter)?;

        let raw = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw.name,
            device_type: raw.device_type,
            backend: raw.backend,
        };

        let limits = limits_for_profile(profile);

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("edge-preview"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        info!("selected {adapter_info}, profile {profile}");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            limits,
            _instance: instance,
        })
    }

    /// True if a `width × height` texture fits the requested limits.
    pub fn supports_texture(&self, width: u32, height: u32) -> bool {
        texture_fits(&self.limits, width, height)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuDevice {{ adapter: {}, profile: {} }}", self.adapter_info, self.profile)
    }
}

/// Lower is better.
fn adapter_rank(ty: wgpu::DeviceType) -> u8 {
    match ty {
        wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu => 0,
        wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 1,
        wgpu::DeviceType::Cpu => 2,
    }
}

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::Embedded => wgpu::Limits {
            max_texture_dimension_1d: 4096,
            max_texture_dimension_2d: 4096,
            ..wgpu::Limits::downlevel_defaults()
        },
    }
}

fn texture_fits(limits: &wgpu::Limits, width: u32, height: u32) -> bool {
    width > 0 && height > 0 && width <= limits.max_texture_dimension_2d && height <= limits.max_texture_dimension_2d
}

/// Device creation, offscreen-target and readback failures.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no GPU adapter found for the primary backends")]
    NoSuitableAdapter,
    #[error("device request failed")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("render target {width}×{height} exceeds the device limit of {max}")]
    TargetTooLarge { width: u32, height: u32, max: u32 },
    #[error("readback buffer map failed")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("readback map callback was dropped")]
    ReadbackLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_rank_prefers_hardware() {
        assert!(adapter_rank(wgpu::DeviceType::DiscreteGpu) < adapter_rank(wgpu::DeviceType::Other));
        assert!(adapter_rank(wgpu::DeviceType::Other) < adapter_rank(wgpu::DeviceType::Cpu));
        assert_eq!(
            adapter_rank(wgpu::DeviceType::IntegratedGpu),
            adapter_rank(wgpu::DeviceType::DiscreteGpu)
        );
    }

    #[test]
    fn test_embedded_limits_cap_textures() {
        let limits = limits_for_profile(DeviceProfile::Embedded);
        assert_eq!(limits.max_texture_dimension_2d, 4096);
        assert!(texture_fits(&limits, 1920, 1080));
        assert!(!texture_fits(&limits, 8192, 16));
        assert!(!texture_fits(&limits, 0, 16));
    }

    #[test]
    fn test_native_limits_are_default() {
        assert_eq!(limits_for_profile(DeviceProfile::Native), wgpu::Limits::default());
    }

    // ---- GPU integration tests (subprocess isolation) ----------------------
    //
    // Some Vulkan layers (dzn on WSL2) crash during process exit once a
    // device has been created. Each real-GPU test therefore runs in a child
    // `cargo test` process that prints "GPU_TEST_OK" before returning; the
    // parent only checks for that token, not the exit code.

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_device_init() {
        let gpu = GpuDevice::new().expect("should initialise a GPU device");
        println!("{gpu}");
        assert!(gpu.supports_texture(640, 480));
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_device_init_embedded() {
        let gpu = GpuDevice::new_with_profile(DeviceProfile::Embedded)
            .expect("embedded profile should work on any adapter");
        assert_eq!(gpu.profile, DeviceProfile::Embedded);
        assert!(!gpu.supports_texture(4097, 10));
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_gpu_device_init() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_gpu_device_init");
        assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_gpu_device_init_embedded() {
        let out = run_gpu_test_in_subprocess("gpu::device::tests::inner_gpu_device_init_embedded");
        assert!(out.contains("GPU_TEST_OK"), "inner test did not print GPU_TEST_OK:\n{out}");
    }
}
