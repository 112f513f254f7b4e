// SPDX-License-Identifier: CEPL-1.0
use conform_api::{GraphicsBinding, GraphicsValidator, ValidatorProvider};
use conform_validate_gl::GlValidator;
use conform_validate_vk::VkValidator;

/// Picks the built-in validator for a session's graphics API. Metal has no
/// validator and is skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct BackendValidators;

impl ValidatorProvider for BackendValidators {
    fn validator_for(&self, binding: &GraphicsBinding) -> Option<Box<dyn GraphicsValidator>> {
        match binding {
            GraphicsBinding::OpenGl(_) => Some(Box::new(GlValidator)),
            GraphicsBinding::Vulkan(vk) => Some(Box::new(VkValidator::new(vk))),
            GraphicsBinding::Metal(_) => None,
        }
    }
}
