// SPDX-License-Identifier: CEPL-1.0
use conform_api::GraphicsBinding;
use parking_lot::Mutex;

/// Custom state attached to a session handle.
#[derive(Debug)]
pub struct SessionState {
    graphics_binding: GraphicsBinding,
    formats: Mutex<Option<Vec<i64>>>,
}

impl SessionState {
    pub fn new(graphics_binding: GraphicsBinding) -> Self {
        Self {
            graphics_binding,
            formats: Mutex::new(None),
        }
    }

    pub fn graphics_binding(&self) -> &GraphicsBinding {
        &self.graphics_binding
    }

    /// Remembers the formats the runtime reported for this session.
    pub fn record_formats(&self, formats: &[i64]) {
        *self.formats.lock() = Some(formats.to_vec());
    }

    /// `None` until formats have been enumerated into a buffer.
    pub fn supports_format(&self, format: i64) -> Option<bool> {
        self.formats
            .lock()
            .as_ref()
            .map(|formats| formats.contains(&format))
    }
}
