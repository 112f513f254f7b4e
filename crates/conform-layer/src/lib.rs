// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Observe-only conformance layer.
//!
//! [`ConformanceLayer`] wraps a [`conform_api::Runtime`], forwards every
//! call unchanged and checks the results against tracked per-object state.
//! Problems are reported through a [`conform_core::DiagnosticSink`]; the
//! caller always sees the wrapped runtime's result.

mod layer;
mod registry;
mod session;
mod swapchain;
mod validators;

pub use layer::ConformanceLayer;
pub use registry::{CustomState, HandleKey, HandleRecord, HandleRegistry, RegistryError};
pub use session::SessionState;
pub use swapchain::{check_wait_timeout, ImageState, ImageTracker, SwapchainState, Violation};
pub use validators::BackendValidators;
