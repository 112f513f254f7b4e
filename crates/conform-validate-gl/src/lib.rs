// SPDX-License-Identifier: CEPL-1.0
use conform_api::{
    validate_attachment_usage, FormatClass, GraphicsApi, GraphicsValidator, SwapchainImage,
    SwapchainUsageFlags,
};
use conform_core::{nonconformant, nonconformant_if, DiagnosticSink, Severity};
use std::collections::HashSet;
use tracing::debug;

const FUNCTION: &str = "enumerate_swapchain_images";

const COLOR_FORMATS: &[u32] = &[
    glow::RGBA8,
    glow::SRGB8_ALPHA8,
    glow::RGB8,
    glow::SRGB8,
    glow::RGBA16,
    glow::RGBA16F,
    glow::RGB16F,
    glow::RGBA32F,
    glow::RGB10_A2,
    glow::R11F_G11F_B10F,
    glow::RG16F,
    glow::R8,
];

const DEPTH_FORMATS: &[u32] = &[
    glow::DEPTH_COMPONENT16,
    glow::DEPTH_COMPONENT24,
    glow::DEPTH_COMPONENT32F,
    glow::DEPTH24_STENCIL8,
    glow::DEPTH32F_STENCIL8,
];

pub fn classify_format(format: i64) -> FormatClass {
    match u32::try_from(format) {
        Ok(f) if COLOR_FORMATS.contains(&f) => FormatClass::Color,
        Ok(f) if DEPTH_FORMATS.contains(&f) => FormatClass::DepthStencil,
        _ => FormatClass::Unknown,
    }
}

/// Checks swapchain images handed out to an OpenGL session.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlValidator;

impl GraphicsValidator for GlValidator {
    fn validate_swapchain_image_structs(
        &self,
        sink: &dyn DiagnosticSink,
        format: i64,
        images: &[SwapchainImage],
    ) {
        debug!(count = images.len(), format, "validating GL swapchain images");
        let mut seen = HashSet::new();
        for (i, image) in images.iter().enumerate() {
            match *image {
                SwapchainImage::OpenGl { image } => {
                    nonconformant_if!(sink, FUNCTION, image == 0, "Image {i} has texture name 0.");
                    nonconformant_if!(
                        sink,
                        FUNCTION,
                        image != 0 && !seen.insert(image),
                        "Image {i} repeats texture name {image}."
                    );
                }
                other => nonconformant!(
                    sink,
                    FUNCTION,
                    "Image {i} was written as a {} struct, expected {}.",
                    other.api(),
                    GraphicsApi::OpenGl
                ),
            }
        }

        if classify_format(format) == FormatClass::Unknown {
            sink.report(
                Severity::Warning,
                FUNCTION,
                format_args!("Format 0x{format:x} is not a known sized OpenGL internal format."),
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
        validate_attachment_usage(sink, FUNCTION, usage, format, classify_format(format));
    }
}
