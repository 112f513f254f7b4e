// SPDX-License-Identifier: CEPL-1.0
use ash::vk::{self, Handle};
use conform_api::{
  validate_attachment_usage, FormatClass, GraphicsApi, GraphicsValidator, SwapchainImage,
  SwapchainUsageFlags, VulkanBinding,
};
use conform_core::{nonconformant, nonconformant_if, DiagnosticSink, Severity};
use std::collections::HashSet;
use tracing::debug;

const FUNCTION: &str = "enumerate_swapchain_images";

// Last format in the core (non-extension) range.
const LAST_CORE_FORMAT: vk::Format = vk::Format::ASTC_12X12_SRGB_BLOCK;

const DEPTH_FORMATS: &[vk::Format] = &[
  vk::Format::D16_UNORM,
  vk::Format::X8_D24_UNORM_PACK32,
  vk::Format::D32_SFLOAT,
  vk::Format::S8_UINT,
  vk::Format::D16_UNORM_S8_UINT,
  vk::Format::D24_UNORM_S8_UINT,
  vk::Format::D32_SFLOAT_S8_UINT,
];

pub fn to_vk_format(format: i64) -> vk::Format {
  i32::try_from(format).map(vk::Format::from_raw).unwrap_or(vk::Format::UNDEFINED)
}

pub fn classify_format(format: vk::Format) -> FormatClass {
  if DEPTH_FORMATS.contains(&format) {
    FormatClass::DepthStencil
  } else if format.as_raw() > 0 && format.as_raw() <= LAST_CORE_FORMAT.as_raw() {
    FormatClass::Color
  } else {
    FormatClass::Unknown
  }
}

/// Vulkan image usage a swapchain image must carry for the requested usage.
/// `MUTABLE_FORMAT` is a creation flag in Vulkan and maps to nothing here.
pub fn to_vk_usage(usage: SwapchainUsageFlags) -> vk::ImageUsageFlags {
  let pairs = [
    (SwapchainUsageFlags::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
    (SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
    (SwapchainUsageFlags::UNORDERED_ACCESS, vk::ImageUsageFlags::STORAGE),
    (SwapchainUsageFlags::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
    (SwapchainUsageFlags::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
    (SwapchainUsageFlags::SAMPLED, vk::ImageUsageFlags::SAMPLED),
    (SwapchainUsageFlags::INPUT_ATTACHMENT, vk::ImageUsageFlags::INPUT_ATTACHMENT),
  ];
  pairs
    .into_iter()
    .filter(|(ours, _)| usage.contains(*ours))
    .fold(vk::ImageUsageFlags::empty(), |acc, (_, theirs)| acc | theirs)
}

/// Checks swapchain images handed out to a Vulkan session.
#[derive(Clone, Copy, Debug)]
pub struct VkValidator {
  device: vk::Device,
}

impl VkValidator {
  pub fn new(binding: &VulkanBinding) -> Self {
    Self { device: vk::Device::from_raw(binding.device) }
  }
}

impl GraphicsValidator for VkValidator {
  fn validate_swapchain_image_structs(
    &self,
    sink: &dyn DiagnosticSink,
    format: i64,
    images: &[SwapchainImage],
  ) {
    debug!(device = ?self.device, count = images.len(), format, "validating Vulkan swapchain images");
    let mut seen = HashSet::new();
    for (i, image) in images.iter().enumerate() {
      match *image {
        SwapchainImage::Vulkan { image } => {
          let image = vk::Image::from_raw(image);
          nonconformant_if!(sink, FUNCTION, image.is_null(), "Image {i} is VK_NULL_HANDLE.");
          nonconformant_if!(
            sink,
            FUNCTION,
            !image.is_null() && !seen.insert(image),
            "Image {i} repeats VkImage {image:?}."
          );
        }
        other => nonconformant!(
          sink,
          FUNCTION,
          "Image {i} was written as a {} struct, expected {}.",
          other.api(),
          GraphicsApi::Vulkan
        ),
      }
    }

    let vk_format = to_vk_format(format);
    if vk_format == vk::Format::UNDEFINED {
      nonconformant!(sink, FUNCTION, "Swapchain format {format} is VK_FORMAT_UNDEFINED or out of range.");
    } else if classify_format(vk_format) == FormatClass::Unknown {
      sink.report(
        Severity::Warning,
        FUNCTION,
        format_args!("Swapchain format {vk_format:?} is outside the Vulkan 1.0 format range."),
      );
    }
  }

  fn validate_usage_flags(
    &self,
    sink: &dyn DiagnosticSink,
    usage: SwapchainUsageFlags,
    format: i64,
    _images: &[SwapchainImage],
  ) {
    let vk_usage = to_vk_usage(usage);
    debug!(?vk_usage, "derived Vulkan image usage");
    nonconformant_if!(
      sink,
      FUNCTION,
      vk_usage.is_empty(),
      "Swapchain usage {usage:?} maps to no Vulkan image usage."
    );
    validate_attachment_usage(sink, FUNCTION, usage, format, classify_format(to_vk_format(format)));
  }
}
