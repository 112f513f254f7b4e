// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{bail, Context, Result};
use clap::Parser;
use conform_api::{
    AcquireInfo, GraphicsBinding, InstanceCreateInfo, MetalBinding, OpenGlBinding, ReleaseInfo,
    Runtime, SessionCreateInfo, Swapchain, SwapchainCreateFlags, SwapchainCreateInfo,
    SwapchainUsageFlags, VulkanBinding, WaitInfo, WaitStatus,
};
use conform_core::{init_tracing, DiagnosticLog, Severity};
use conform_layer::ConformanceLayer;
use conform_sim::{SimConfig, SimRuntime};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; defaults are used when it does not exist
    #[arg(long, default_value = "conform.toml")]
    config: PathBuf,
    /// Graphics API the session binds: opengl | vulkan | metal
    #[arg(long)]
    backend: Option<BackendCfg>,
    /// Number of acquire/wait/release cycles
    #[arg(long)]
    frames: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
enum BackendCfg {
    #[value(name = "opengl")]
    OpenGl,
    #[default]
    Vulkan,
    Metal,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum DestroyVia {
    #[default]
    Swapchain,
    Session,
    Instance,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct ScenarioCfg {
    backend: BackendCfg,
    frames: u32,
    /// Images held acquired before the oldest is waited and released.
    in_flight: u32,
    static_image: bool,
    wait_timeout_ms: Option<u64>,
    destroy_via: DestroyVia,
}

impl Default for ScenarioCfg {
    fn default() -> Self {
        ScenarioCfg {
            backend: BackendCfg::Vulkan,
            frames: 8,
            in_flight: 1,
            static_image: false,
            wait_timeout_ms: None,
            destroy_via: DestroyVia::Swapchain,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(default)]
struct ReportCfg {
    fail_on_warning: bool,
}

#[derive(Debug, Deserialize, Default)]
struct AppCfg {
    #[serde(default)]
    scenario: ScenarioCfg,
    #[serde(default)]
    runtime: SimConfig,
    #[serde(default)]
    report: ReportCfg,
}

fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(s) => toml::from_str::<AppCfg>(&s).with_context(|| format!("parsing {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn binding_for(backend: BackendCfg) -> GraphicsBinding {
    match backend {
        BackendCfg::OpenGl => GraphicsBinding::OpenGl(OpenGlBinding {
            display: 0x1,
            context: 0x2,
        }),
        BackendCfg::Vulkan => GraphicsBinding::Vulkan(VulkanBinding {
            instance: 0x1,
            physical_device: 0x2,
            device: 0x3,
            queue_family_index: 0,
            queue_index: 0,
        }),
        BackendCfg::Metal => GraphicsBinding::Metal(MetalBinding { command_queue: 0x1 }),
    }
}

fn wait_then_release(rt: &impl Runtime, swapchain: Swapchain, wait: &WaitInfo) -> Result<()> {
    let status = rt
        .wait_swapchain_image(swapchain, wait)
        .context("wait_swapchain_image")?;
    if status == WaitStatus::TimeoutExpired {
        warn!("wait timed out, retrying without timeout");
        rt.wait_swapchain_image(swapchain, &WaitInfo::INFINITE)
            .context("wait_swapchain_image")?;
    }
    rt.release_swapchain_image(swapchain, &ReleaseInfo)
        .context("release_swapchain_image")?;
    Ok(())
}

/// Drives one instance/session/swapchain lifetime through the runtime.
fn run_scenario(rt: &impl Runtime, cfg: &ScenarioCfg) -> Result<()> {
    let instance = rt
        .create_instance(&InstanceCreateInfo {
            application_name: "conform".into(),
            enabled_extensions: Vec::new(),
        })
        .context("create_instance")?;

    let binding = binding_for(cfg.backend);
    let session = rt
        .create_session(
            instance,
            &SessionCreateInfo {
                system_id: 1,
                graphics_binding: binding,
            },
        )
        .context("create_session")?;

    let format_count = rt
        .enumerate_swapchain_formats(session, None)
        .context("enumerate_swapchain_formats")?;
    let mut formats = vec![0; format_count as usize];
    rt.enumerate_swapchain_formats(session, Some(formats.as_mut_slice()))
        .context("enumerate_swapchain_formats")?;
    let Some(&format) = formats.first() else {
        bail!("runtime offers no swapchain formats");
    };

    let create_flags = if cfg.static_image {
        SwapchainCreateFlags::STATIC_IMAGE
    } else {
        SwapchainCreateFlags::empty()
    };
    let swapchain = rt
        .create_swapchain(
            session,
            &SwapchainCreateInfo {
                create_flags,
                usage_flags: SwapchainUsageFlags::COLOR_ATTACHMENT | SwapchainUsageFlags::SAMPLED,
                format,
                ..Default::default()
            },
        )
        .context("create_swapchain")?;

    let image_count = rt
        .enumerate_swapchain_images(swapchain, None)
        .context("enumerate_swapchain_images")?;
    let mut images = vec![binding.empty_image(); image_count as usize];
    rt.enumerate_swapchain_images(swapchain, Some(images.as_mut_slice()))
        .context("enumerate_swapchain_images")?;
    info!(backend = %binding.api(), format, image_count, "swapchain ready");

    let wait = cfg
        .wait_timeout_ms
        .map(|ms| WaitInfo::with_timeout(Duration::from_millis(ms)))
        .unwrap_or(WaitInfo::INFINITE);
    let frames = if cfg.static_image { 1 } else { cfg.frames };
    let in_flight = cfg.in_flight.max(1);

    let mut pending = 0;
    for _ in 0..frames {
        rt.acquire_swapchain_image(swapchain, &AcquireInfo)
            .context("acquire_swapchain_image")?;
        pending += 1;
        if pending == in_flight {
            wait_then_release(rt, swapchain, &wait)?;
            pending -= 1;
        }
    }
    while pending > 0 {
        wait_then_release(rt, swapchain, &wait)?;
        pending -= 1;
    }

    match cfg.destroy_via {
        DestroyVia::Swapchain => {
            rt.destroy_swapchain(swapchain).context("destroy_swapchain")?;
            rt.destroy_session(session).context("destroy_session")?;
            rt.destroy_instance(instance).context("destroy_instance")?;
        }
        DestroyVia::Session => {
            rt.destroy_session(session).context("destroy_session")?;
            rt.destroy_instance(instance).context("destroy_instance")?;
        }
        DestroyVia::Instance => {
            rt.destroy_instance(instance).context("destroy_instance")?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_cfg(&args.config)?;
    if let Some(backend) = args.backend {
        cfg.scenario.backend = backend;
    }
    if let Some(frames) = args.frames {
        cfg.scenario.frames = frames;
    }

    let log = Arc::new(DiagnosticLog::new());
    let layer = ConformanceLayer::new(SimRuntime::new(cfg.runtime.clone()), log.clone());

    if let Err(e) = run_scenario(&layer, &cfg.scenario) {
        warn!("scenario stopped early: {e:#}");
    }
    if !layer.registry().is_empty() {
        warn!("{} handles still tracked after teardown", layer.registry().len());
    }

    let diagnostics = log.entries();
    for d in &diagnostics {
        println!("{d}");
    }
    let failures = log.count(Severity::Error);
    let warnings = log.count(Severity::Warning);
    println!("{failures} failure(s), {warnings} warning(s)");

    if failures > 0 || (cfg.report.fail_on_warning && warnings > 0) {
        bail!("runtime is not conformant");
    }
    Ok(())
}
