// SPDX-License-Identifier: CEPL-1.0
//! The runtime entry-point surface the conformance layer sits on, plus the
//! plugin traits graphics backends implement.

mod handle;
mod result;
mod types;

pub use handle::{Instance, ObjectHandle, ObjectType, Session, Swapchain};
pub use result::{ResultCode, XrResult};
pub use types::*;

use conform_core::DiagnosticSink;

/// Entry points of a runtime. The conformance layer consumes one of these
/// and exposes the same surface.
///
/// Enumeration follows the two-call idiom: `None` probes the count, a slice
/// supplies capacity (`len()`) and receives the elements.
pub trait Runtime: Send + Sync {
    fn create_instance(&self, info: &InstanceCreateInfo) -> XrResult<Instance>;
    fn destroy_instance(&self, instance: Instance) -> XrResult<()>;

    fn create_session(&self, instance: Instance, info: &SessionCreateInfo) -> XrResult<Session>;
    fn destroy_session(&self, session: Session) -> XrResult<()>;
    fn enumerate_swapchain_formats(
        &self,
        session: Session,
        formats: Option<&mut [i64]>,
    ) -> XrResult<u32>;

    fn create_swapchain(&self, session: Session, info: &SwapchainCreateInfo)
        -> XrResult<Swapchain>;
    fn destroy_swapchain(&self, swapchain: Swapchain) -> XrResult<()>;
    fn enumerate_swapchain_images(
        &self,
        swapchain: Swapchain,
        images: Option<&mut [SwapchainImage]>,
    ) -> XrResult<u32>;
    fn acquire_swapchain_image(&self, swapchain: Swapchain, info: &AcquireInfo) -> XrResult<u32>;
    fn wait_swapchain_image(&self, swapchain: Swapchain, info: &WaitInfo) -> XrResult<WaitStatus>;
    fn release_swapchain_image(&self, swapchain: Swapchain, info: &ReleaseInfo) -> XrResult<()>;
}

/// Backend specific checks on enumerated swapchain images.
pub trait GraphicsValidator {
    fn validate_swapchain_image_structs(
        &self,
        sink: &dyn DiagnosticSink,
        format: i64,
        images: &[SwapchainImage],
    );

    fn validate_usage_flags(
        &self,
        sink: &dyn DiagnosticSink,
        usage: SwapchainUsageFlags,
        format: i64,
        images: &[SwapchainImage],
    );
}

/// Produces the validator for a graphics binding. `None` means the backend
/// has no checks and validation is skipped.
pub trait ValidatorProvider: Send + Sync {
    fn validator_for(&self, binding: &GraphicsBinding) -> Option<Box<dyn GraphicsValidator>>;
}

/// Provider that never validates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoValidators;

impl ValidatorProvider for NoValidators {
    fn validator_for(&self, _binding: &GraphicsBinding) -> Option<Box<dyn GraphicsValidator>> {
        None
    }
}

/// Coarse format classification a backend validator derives from its
/// API-specific format value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatClass {
    Color,
    DepthStencil,
    Unknown,
}

/// Attachment usage must agree with the format class. Unknown formats are
/// not judged here.
pub fn validate_attachment_usage(
    sink: &dyn DiagnosticSink,
    function: &str,
    usage: SwapchainUsageFlags,
    format: i64,
    class: FormatClass,
) {
    conform_core::nonconformant_if!(
        sink,
        function,
        usage.contains(SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT) && class == FormatClass::Color,
        "Swapchain with depth-stencil usage was created with color format 0x{format:x}."
    );
    conform_core::nonconformant_if!(
        sink,
        function,
        usage.contains(SwapchainUsageFlags::COLOR_ATTACHMENT) && class == FormatClass::DepthStencil,
        "Swapchain with color attachment usage was created with depth format 0x{format:x}."
    );
}
