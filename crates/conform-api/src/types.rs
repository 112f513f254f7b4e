// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use std::fmt;
use std::time::Duration;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SwapchainUsageFlags: u64 {
        const COLOR_ATTACHMENT = 0x0000_0001;
        const DEPTH_STENCIL_ATTACHMENT = 0x0000_0002;
        const UNORDERED_ACCESS = 0x0000_0004;
        const TRANSFER_SRC = 0x0000_0008;
        const TRANSFER_DST = 0x0000_0010;
        const SAMPLED = 0x0000_0020;
        const MUTABLE_FORMAT = 0x0000_0040;
        const INPUT_ATTACHMENT = 0x0000_0080;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SwapchainCreateFlags: u64 {
        const PROTECTED_CONTENT = 0x0000_0001;
        /// The swapchain holds a single image that is acquired at most once.
        const STATIC_IMAGE = 0x0000_0002;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceCreateInfo {
    pub application_name: String,
    pub enabled_extensions: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    OpenGl,
    Vulkan,
    Metal,
}

impl fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GraphicsApi::OpenGl => "opengl",
            GraphicsApi::Vulkan => "vulkan",
            GraphicsApi::Metal => "metal",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenGlBinding {
    pub display: u64,
    pub context: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VulkanBinding {
    pub instance: u64,
    pub physical_device: u64,
    pub device: u64,
    pub queue_family_index: u32,
    pub queue_index: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetalBinding {
    pub command_queue: u64,
}

/// Graphics API objects a session renders with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphicsBinding {
    OpenGl(OpenGlBinding),
    Vulkan(VulkanBinding),
    Metal(MetalBinding),
}

impl GraphicsBinding {
    pub fn api(&self) -> GraphicsApi {
        match self {
            GraphicsBinding::OpenGl(_) => GraphicsApi::OpenGl,
            GraphicsBinding::Vulkan(_) => GraphicsApi::Vulkan,
            GraphicsBinding::Metal(_) => GraphicsApi::Metal,
        }
    }

    /// Zeroed image struct of the type this binding enumerates into.
    pub fn empty_image(&self) -> SwapchainImage {
        match self {
            GraphicsBinding::OpenGl(_) => SwapchainImage::OpenGl { image: 0 },
            GraphicsBinding::Vulkan(_) => SwapchainImage::Vulkan { image: 0 },
            GraphicsBinding::Metal(_) => SwapchainImage::Metal { texture: 0 },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCreateInfo {
    pub system_id: u64,
    pub graphics_binding: GraphicsBinding,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainCreateInfo {
    pub create_flags: SwapchainCreateFlags,
    pub usage_flags: SwapchainUsageFlags,
    /// Graphics-API specific format value.
    pub format: i64,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub face_count: u32,
    pub array_size: u32,
    pub mip_count: u32,
}

impl SwapchainCreateInfo {
    pub fn is_static(&self) -> bool {
        self.create_flags
            .contains(SwapchainCreateFlags::STATIC_IMAGE)
    }
}

impl Default for SwapchainCreateInfo {
    fn default() -> Self {
        Self {
            create_flags: SwapchainCreateFlags::empty(),
            usage_flags: SwapchainUsageFlags::COLOR_ATTACHMENT | SwapchainUsageFlags::SAMPLED,
            format: 0,
            sample_count: 1,
            width: 1024,
            height: 1024,
            face_count: 1,
            array_size: 1,
            mip_count: 1,
        }
    }
}

/// One element of a swapchain image enumeration, tagged by graphics API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapchainImage {
    /// GL texture name.
    OpenGl { image: u32 },
    /// `VkImage` handle.
    Vulkan { image: u64 },
    /// `MTLTexture` pointer.
    Metal { texture: u64 },
}

impl SwapchainImage {
    pub fn api(&self) -> GraphicsApi {
        match self {
            SwapchainImage::OpenGl { .. } => GraphicsApi::OpenGl,
            SwapchainImage::Vulkan { .. } => GraphicsApi::Vulkan,
            SwapchainImage::Metal { .. } => GraphicsApi::Metal,
        }
    }

    pub fn raw(&self) -> u64 {
        match *self {
            SwapchainImage::OpenGl { image } => image as u64,
            SwapchainImage::Vulkan { image } => image,
            SwapchainImage::Metal { texture } => texture,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquireInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitInfo {
    pub timeout: Duration,
}

impl WaitInfo {
    pub const INFINITE: WaitInfo = WaitInfo {
        timeout: Duration::MAX,
    };

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReleaseInfo;

/// Successful outcomes of a swapchain image wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Ready,
    /// The timeout elapsed before the image became available.
    TimeoutExpired,
}
