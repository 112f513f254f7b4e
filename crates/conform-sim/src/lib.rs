// SPDX-License-Identifier: CEPL-1.0
//! In-memory runtime that follows the swapchain contract, with switches to
//! break it in specific ways.

use conform_api::{
    AcquireInfo, GraphicsApi, GraphicsBinding, Instance, InstanceCreateInfo, ObjectHandle,
    ReleaseInfo, ResultCode, Runtime, Session, SessionCreateInfo, Swapchain, SwapchainCreateInfo,
    SwapchainImage, WaitInfo, WaitStatus, XrResult,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Contract breaks the simulated runtime can be told to commit.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimFaults {
    /// Timed-out waits return immediately instead of blocking.
    pub wait_returns_early: bool,
    /// Every acquire hands out image 0, busy or not.
    pub repeat_acquired_index: bool,
    /// Each enumeration after the first reports one more image.
    pub image_count_drift: bool,
    /// Wait and release succeed even with nothing acquired or waited.
    pub ignore_call_order: bool,
    /// Format enumeration leaves out the last format creation accepts.
    pub omit_last_format: bool,
    /// Filling an image buffer reports one image more than was written.
    pub overreport_image_count: bool,
    /// Image enumeration always fails with a runtime failure.
    pub fail_image_enumeration: bool,
    /// Every created object gets the same raw handle value.
    pub reuse_handles: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimConfig {
    /// Images per dynamic swapchain. Static swapchains always get one.
    pub image_count: u32,
    /// Overrides the per-API default format list.
    pub formats: Option<Vec<i64>>,
    /// How long an acquired image takes to become ready.
    pub wait_latency_ms: u64,
    pub faults: SimFaults,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            image_count: 3,
            formats: None,
            wait_latency_ms: 0,
            faults: SimFaults::default(),
        }
    }
}

impl SimConfig {
    pub fn formats_for(&self, api: GraphicsApi) -> Vec<i64> {
        if let Some(formats) = &self.formats {
            return formats.clone();
        }
        match api {
            // VK_FORMAT_R8G8B8A8_SRGB, VK_FORMAT_B8G8R8A8_SRGB, VK_FORMAT_D32_SFLOAT
            GraphicsApi::Vulkan => vec![43, 50, 126],
            // GL_SRGB8_ALPHA8, GL_RGBA8, GL_DEPTH_COMPONENT32F
            GraphicsApi::OpenGl => vec![0x8C43, 0x8058, 0x8CAC],
            // MTLPixelFormatRGBA8Unorm_sRGB, MTLPixelFormatBGRA8Unorm_sRGB, MTLPixelFormatDepth32Float
            GraphicsApi::Metal => vec![71, 81, 252],
        }
    }
}

#[derive(Debug)]
struct SimSession {
    instance: u64,
    binding: GraphicsBinding,
}

#[derive(Debug)]
struct SimSwapchain {
    session: u64,
    binding: GraphicsBinding,
    is_static: bool,
    image_count: u32,
    enumerations: u32,
    next_index: u32,
    acquired: VecDeque<u32>,
    front_waited: bool,
    static_used: bool,
}

impl SimSwapchain {
    fn image(&self, handle: u64, index: u32) -> SwapchainImage {
        let raw = (handle << 8) + u64::from(index) + 1;
        match self.binding {
            GraphicsBinding::OpenGl(_) => SwapchainImage::OpenGl { image: raw as u32 },
            GraphicsBinding::Vulkan(_) => SwapchainImage::Vulkan { image: raw },
            GraphicsBinding::Metal(_) => SwapchainImage::Metal { texture: raw },
        }
    }
}

#[derive(Debug, Default)]
struct SimObjects {
    instances: HashSet<u64>,
    sessions: HashMap<u64, SimSession>,
    swapchains: HashMap<u64, SimSwapchain>,
}

#[derive(Debug)]
pub struct SimRuntime {
    config: SimConfig,
    next_handle: AtomicU64,
    objects: Mutex<SimObjects>,
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimRuntime {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            next_handle: AtomicU64::new(1),
            objects: Mutex::new(SimObjects::default()),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn allocate(&self) -> u64 {
        if self.config.faults.reuse_handles {
            return 1;
        }
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn formats(&self, objects: &SimObjects, session: Session) -> XrResult<Vec<i64>> {
        let session = objects
            .sessions
            .get(&session.as_raw())
            .ok_or(ResultCode::ErrorHandleInvalid)?;
        Ok(self.config.formats_for(session.binding.api()))
    }
}

fn write_two_call<T: Copy>(items: &[T], out: Option<&mut [T]>) -> XrResult<u32> {
    let count = items.len() as u32;
    match out {
        Some(out) if !out.is_empty() => {
            if out.len() < items.len() {
                return Err(ResultCode::ErrorSizeInsufficient);
            }
            out[..items.len()].copy_from_slice(items);
            Ok(count)
        }
        _ => Ok(count),
    }
}

impl Runtime for SimRuntime {
    fn create_instance(&self, _info: &InstanceCreateInfo) -> XrResult<Instance> {
        let raw = self.allocate();
        self.objects.lock().instances.insert(raw);
        Ok(Instance::from_raw(raw))
    }

    fn destroy_instance(&self, instance: Instance) -> XrResult<()> {
        let mut objects = self.objects.lock();
        if !objects.instances.remove(&instance.as_raw()) {
            return Err(ResultCode::ErrorHandleInvalid);
        }
        let sessions: HashSet<u64> = objects
            .sessions
            .iter()
            .filter(|(_, s)| s.instance == instance.as_raw())
            .map(|(h, _)| *h)
            .collect();
        objects.sessions.retain(|h, _| !sessions.contains(h));
        objects.swapchains.retain(|_, sc| !sessions.contains(&sc.session));
        Ok(())
    }

    fn create_session(&self, instance: Instance, info: &SessionCreateInfo) -> XrResult<Session> {
        let mut objects = self.objects.lock();
        if !objects.instances.contains(&instance.as_raw()) {
            return Err(ResultCode::ErrorHandleInvalid);
        }
        let raw = self.allocate();
        objects.sessions.insert(
            raw,
            SimSession {
                instance: instance.as_raw(),
                binding: info.graphics_binding,
            },
        );
        Ok(Session::from_raw(raw))
    }

    fn destroy_session(&self, session: Session) -> XrResult<()> {
        let mut objects = self.objects.lock();
        objects
            .sessions
            .remove(&session.as_raw())
            .ok_or(ResultCode::ErrorHandleInvalid)?;
        objects
            .swapchains
            .retain(|_, sc| sc.session != session.as_raw());
        Ok(())
    }

    fn enumerate_swapchain_formats(
        &self,
        session: Session,
        formats: Option<&mut [i64]>,
    ) -> XrResult<u32> {
        let objects = self.objects.lock();
        let mut available = self.formats(&objects, session)?;
        if self.config.faults.omit_last_format {
            available.pop();
        }
        write_two_call(&available, formats)
    }

    fn create_swapchain(
        &self,
        session: Session,
        info: &SwapchainCreateInfo,
    ) -> XrResult<Swapchain> {
        let mut objects = self.objects.lock();
        if !self.formats(&objects, session)?.contains(&info.format) {
            return Err(ResultCode::ErrorSwapchainFormatUnsupported);
        }
        let binding = objects.sessions[&session.as_raw()].binding;
        let raw = self.allocate();
        objects.swapchains.insert(
            raw,
            SimSwapchain {
                session: session.as_raw(),
                binding,
                is_static: info.is_static(),
                image_count: if info.is_static() { 1 } else { self.config.image_count },
                enumerations: 0,
                next_index: 0,
                acquired: VecDeque::new(),
                front_waited: false,
                static_used: false,
            },
        );
        Ok(Swapchain::from_raw(raw))
    }

    fn destroy_swapchain(&self, swapchain: Swapchain) -> XrResult<()> {
        self.objects
            .lock()
            .swapchains
            .remove(&swapchain.as_raw())
            .map(|_| ())
            .ok_or(ResultCode::ErrorHandleInvalid)
    }

    fn enumerate_swapchain_images(
        &self,
        swapchain: Swapchain,
        images: Option<&mut [SwapchainImage]>,
    ) -> XrResult<u32> {
        let mut objects = self.objects.lock();
        let sc = objects
            .swapchains
            .get_mut(&swapchain.as_raw())
            .ok_or(ResultCode::ErrorHandleInvalid)?;
        if self.config.faults.fail_image_enumeration {
            return Err(ResultCode::ErrorRuntimeFailure);
        }

        let mut count = sc.image_count;
        if self.config.faults.image_count_drift {
            count += sc.enumerations;
        }
        sc.enumerations += 1;

        let written: Vec<SwapchainImage> = (0..count)
            .map(|i| sc.image(swapchain.as_raw(), i))
            .collect();
        let filling = images.as_deref().is_some_and(|out| !out.is_empty());
        let count = write_two_call(&written, images)?;
        if filling && self.config.faults.overreport_image_count {
            return Ok(count + 1);
        }
        Ok(count)
    }

    fn acquire_swapchain_image(&self, swapchain: Swapchain, _info: &AcquireInfo) -> XrResult<u32> {
        let mut objects = self.objects.lock();
        let sc = objects
            .swapchains
            .get_mut(&swapchain.as_raw())
            .ok_or(ResultCode::ErrorHandleInvalid)?;

        if self.config.faults.repeat_acquired_index {
            sc.acquired.push_back(0);
            return Ok(0);
        }
        if sc.acquired.len() as u32 >= sc.image_count || (sc.is_static && sc.static_used) {
            return Err(ResultCode::ErrorCallOrderInvalid);
        }

        let index = sc.next_index;
        sc.next_index = (sc.next_index + 1) % sc.image_count;
        sc.acquired.push_back(index);
        sc.static_used |= sc.is_static;
        debug!(?swapchain, index, "sim acquire");
        Ok(index)
    }

    fn wait_swapchain_image(&self, swapchain: Swapchain, info: &WaitInfo) -> XrResult<WaitStatus> {
        let latency = Duration::from_millis(self.config.wait_latency_ms);
        {
            let mut objects = self.objects.lock();
            let sc = objects
                .swapchains
                .get_mut(&swapchain.as_raw())
                .ok_or(ResultCode::ErrorHandleInvalid)?;

            if sc.acquired.is_empty() || sc.front_waited {
                if self.config.faults.ignore_call_order {
                    return Ok(WaitStatus::Ready);
                }
                return Err(ResultCode::ErrorCallOrderInvalid);
            }
            if latency <= info.timeout {
                sc.front_waited = true;
            }
        }

        if latency > info.timeout {
            if !self.config.faults.wait_returns_early {
                thread::sleep(info.timeout);
            }
            return Ok(WaitStatus::TimeoutExpired);
        }
        thread::sleep(latency);
        Ok(WaitStatus::Ready)
    }

    fn release_swapchain_image(&self, swapchain: Swapchain, _info: &ReleaseInfo) -> XrResult<()> {
        let mut objects = self.objects.lock();
        let sc = objects
            .swapchains
            .get_mut(&swapchain.as_raw())
            .ok_or(ResultCode::ErrorHandleInvalid)?;

        if !sc.front_waited {
            if self.config.faults.ignore_call_order {
                return Ok(());
            }
            return Err(ResultCode::ErrorCallOrderInvalid);
        }
        sc.acquired.pop_front();
        sc.front_waited = false;
        Ok(())
    }
}
