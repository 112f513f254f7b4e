// SPDX-License-Identifier: CEPL-1.0
use conform_api::{
    AcquireInfo, Instance, InstanceCreateInfo, ObjectHandle, ReleaseInfo, Runtime, Session,
    SessionCreateInfo, Swapchain, SwapchainCreateInfo, SwapchainImage, ValidatorProvider,
    WaitInfo, WaitStatus, XrResult,
};
use conform_core::{nonconformant, nonconformant_if, DiagnosticSink, Severity};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::registry::{CustomState, HandleKey, HandleRecord, HandleRegistry, RegistryError};
use crate::session::SessionState;
use crate::swapchain::{check_wait_timeout, ImageState, ImageTracker, SwapchainState, Violation};
use crate::validators::BackendValidators;

/// Wraps the next runtime in the chain. Every entry point calls through
/// first, validates only on the results it understands, and returns the
/// runtime's result untouched.
pub struct ConformanceLayer<R> {
    next: R,
    registry: Arc<HandleRegistry>,
    sink: Arc<dyn DiagnosticSink>,
    validators: Box<dyn ValidatorProvider>,
}

impl<R: Runtime> ConformanceLayer<R> {
    pub fn new(next: R, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            next,
            registry: Arc::new(HandleRegistry::new()),
            sink,
            validators: Box::new(BackendValidators),
        }
    }

    /// Tracks handles in a caller-owned registry instead of a private one.
    pub fn with_registry(mut self, registry: Arc<HandleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_validators(mut self, validators: impl ValidatorProvider + 'static) -> Self {
        self.validators = Box::new(validators);
        self
    }

    pub fn next(&self) -> &R {
        &self.next
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Snapshot of the tracked image states, if the swapchain is known.
    pub fn image_states(&self, swapchain: Swapchain) -> Option<Vec<ImageState>> {
        self.registry
            .lookup(HandleKey::of(swapchain))
            .ok()?
            .swapchain_state()
            .map(SwapchainState::image_states)
    }

    fn report(&self, function: &str, violation: &Violation) {
        nonconformant!(self.sink, function, "{violation}");
    }

    fn layer_fault(&self, function: &str, err: &RegistryError) {
        self.sink.report(
            Severity::Error,
            function,
            format_args!("Handle tracking failed: {err}."),
        );
    }

    fn register<H: ObjectHandle>(
        &self,
        function: &str,
        handle: H,
        parent: Option<HandleKey>,
        state: Option<CustomState>,
    ) {
        let record = match self.registry.register(HandleKey::of(handle), parent) {
            Ok(record) => record,
            Err(err) => return self.layer_fault(function, &err),
        };
        if let Some(state) = state {
            if let Err(err) = record.attach(state) {
                self.layer_fault(function, &err);
            }
        }
    }

    fn unregister<H: ObjectHandle>(&self, function: &str, handle: H) {
        match self.registry.unregister(HandleKey::of(handle)) {
            Ok(removed) => debug!(?handle, removed = removed.len(), "handle destroyed"),
            Err(err) => self.layer_fault(function, &err),
        }
    }

    fn lookup(&self, function: &str, key: HandleKey) -> Option<Arc<HandleRecord>> {
        self.registry
            .lookup(key)
            .map_err(|err| self.layer_fault(function, &err))
            .ok()
    }

    fn with_session<T>(
        &self,
        function: &str,
        session: Session,
        f: impl FnOnce(&SessionState) -> T,
    ) -> Option<T> {
        let key = HandleKey::of(session);
        let record = self.lookup(function, key)?;
        match record.session_state() {
            Some(state) => Some(f(state)),
            None => {
                nonconformant!(self.sink, function, "{key} has no session state attached.");
                None
            }
        }
    }

    fn with_swapchain<T>(
        &self,
        function: &str,
        swapchain: Swapchain,
        f: impl FnOnce(&SwapchainState) -> T,
    ) -> Option<T> {
        let key = HandleKey::of(swapchain);
        let record = self.lookup(function, key)?;
        match record.swapchain_state() {
            Some(state) => Some(f(state)),
            None => {
                nonconformant!(self.sink, function, "{key} has no swapchain state attached.");
                None
            }
        }
    }

    fn record_image_count(&self, function: &str, tracker: &mut ImageTracker, count: u32) {
        for violation in tracker.record_enumeration(count) {
            self.report(function, &violation);
        }
    }
}

impl<R: Runtime> Runtime for ConformanceLayer<R> {
    fn create_instance(&self, info: &InstanceCreateInfo) -> XrResult<Instance> {
        const FUNCTION: &str = "create_instance";
        let result = self.next.create_instance(info);
        if let Ok(instance) = result {
            info!(?instance, application = %info.application_name, "instance created");
            self.register(FUNCTION, instance, None, None);
        }
        result
    }

    fn destroy_instance(&self, instance: Instance) -> XrResult<()> {
        let result = self.next.destroy_instance(instance);
        if result.is_ok() {
            self.unregister("destroy_instance", instance);
        }
        result
    }

    fn create_session(&self, instance: Instance, info: &SessionCreateInfo) -> XrResult<Session> {
        const FUNCTION: &str = "create_session";
        let result = self.next.create_session(instance, info);
        if let Ok(session) = result {
            info!(?session, api = %info.graphics_binding.api(), "session created");
            self.register(
                FUNCTION,
                session,
                Some(HandleKey::of(instance)),
                Some(CustomState::Session(SessionState::new(info.graphics_binding))),
            );
        }
        result
    }

    fn destroy_session(&self, session: Session) -> XrResult<()> {
        let result = self.next.destroy_session(session);
        if result.is_ok() {
            self.unregister("destroy_session", session);
        }
        result
    }

    fn enumerate_swapchain_formats(
        &self,
        session: Session,
        mut formats: Option<&mut [i64]>,
    ) -> XrResult<u32> {
        const FUNCTION: &str = "enumerate_swapchain_formats";
        let capacity = formats.as_deref().map_or(0, <[i64]>::len);
        let result = self
            .next
            .enumerate_swapchain_formats(session, formats.as_deref_mut());

        if let Ok(count) = result {
            nonconformant_if!(self.sink, FUNCTION, count == 0, "Invalid empty format count.");
            nonconformant_if!(
                self.sink,
                FUNCTION,
                capacity > 0 && count as usize > capacity,
                "Format count output {count} exceeds capacity input {capacity}."
            );
            let written = formats
                .as_deref()
                .filter(|_| capacity > 0)
                .map(|formats| &formats[..(count as usize).min(capacity)]);
            self.with_session(FUNCTION, session, |state| {
                if let Some(written) = written {
                    state.record_formats(written);
                }
            });
        }
        result
    }

    fn create_swapchain(
        &self,
        session: Session,
        info: &SwapchainCreateInfo,
    ) -> XrResult<Swapchain> {
        const FUNCTION: &str = "create_swapchain";
        let result = self.next.create_swapchain(session, info);
        if let Ok(swapchain) = result {
            let binding = self.with_session(FUNCTION, session, |state| {
                nonconformant_if!(
                    self.sink,
                    FUNCTION,
                    state.supports_format(info.format) == Some(false),
                    "Swapchain created with format {} that was not enumerated for the session.",
                    info.format
                );
                *state.graphics_binding()
            });

            if let Some(binding) = binding {
                debug!(?swapchain, format = info.format, is_static = info.is_static(), "swapchain created");
                self.register(
                    FUNCTION,
                    swapchain,
                    Some(HandleKey::of(session)),
                    Some(CustomState::Swapchain(SwapchainState::new(*info, binding))),
                );
            }
        }
        result
    }

    fn destroy_swapchain(&self, swapchain: Swapchain) -> XrResult<()> {
        let result = self.next.destroy_swapchain(swapchain);
        if result.is_ok() {
            self.unregister("destroy_swapchain", swapchain);
        }
        result
    }

    fn enumerate_swapchain_images(
        &self,
        swapchain: Swapchain,
        mut images: Option<&mut [SwapchainImage]>,
    ) -> XrResult<u32> {
        const FUNCTION: &str = "enumerate_swapchain_images";
        let capacity = images.as_deref().map_or(0, <[SwapchainImage]>::len);
        let result = self
            .next
            .enumerate_swapchain_images(swapchain, images.as_deref_mut());

        let Ok(count) = result else {
            return result;
        };

        let created_with = self.with_swapchain(FUNCTION, swapchain, |state| {
            self.record_image_count(FUNCTION, &mut state.lock(), count);
            (*state.create_info(), *state.graphics_binding())
        });

        if capacity > 0 && count as usize > capacity {
            self.report(FUNCTION, &Violation::CountExceedsCapacity { count, capacity });
        }

        if let (Some((create_info, binding)), Some(images)) = (created_with, images) {
            if capacity > 0 {
                if let Some(validator) = self.validators.validator_for(&binding) {
                    let written = &images[..(count as usize).min(capacity)];
                    validator.validate_swapchain_image_structs(
                        &*self.sink,
                        create_info.format,
                        written,
                    );
                    validator.validate_usage_flags(
                        &*self.sink,
                        create_info.usage_flags,
                        create_info.format,
                        written,
                    );
                }
            }
        }
        result
    }

    fn acquire_swapchain_image(&self, swapchain: Swapchain, info: &AcquireInfo) -> XrResult<u32> {
        const FUNCTION: &str = "acquire_swapchain_image";
        let result = self.next.acquire_swapchain_image(swapchain, info);
        if let Ok(index) = result {
            self.with_swapchain(FUNCTION, swapchain, |state| {
                let mut tracker = state.lock();
                if !tracker.is_enumerated() {
                    // Acquired before any enumeration: probe the count on the
                    // held guard so sizing and the acquire stay one event.
                    match self.next.enumerate_swapchain_images(swapchain, None) {
                        Ok(count) => self.record_image_count(FUNCTION, &mut tracker, count),
                        Err(code) => nonconformant!(
                            self.sink,
                            FUNCTION,
                            "Unable to enumerate swapchain images due to error {code}."
                        ),
                    }
                    if !tracker.is_enumerated() {
                        return;
                    }
                }

                if let Err(violation) = tracker.acquire(index) {
                    self.report(FUNCTION, &violation);
                }
            });
        }
        result
    }

    fn wait_swapchain_image(&self, swapchain: Swapchain, info: &WaitInfo) -> XrResult<WaitStatus> {
        const FUNCTION: &str = "wait_swapchain_image";
        let started = Instant::now();
        let result = self.next.wait_swapchain_image(swapchain, info);

        match result {
            Ok(WaitStatus::TimeoutExpired) => {
                if let Err(violation) = check_wait_timeout(started.elapsed(), info.timeout) {
                    self.report(FUNCTION, &violation);
                }
            }
            Ok(WaitStatus::Ready) => {
                self.with_swapchain(FUNCTION, swapchain, |state| {
                    if let Some(violation) = state.lock().wait_succeeded() {
                        self.report(FUNCTION, &violation);
                    }
                });
            }
            Err(_) => {}
        }
        result
    }

    fn release_swapchain_image(&self, swapchain: Swapchain, info: &ReleaseInfo) -> XrResult<()> {
        const FUNCTION: &str = "release_swapchain_image";
        let result = self.next.release_swapchain_image(swapchain, info);
        if result.is_ok() {
            self.with_swapchain(FUNCTION, swapchain, |state| {
                if let Some(violation) = state.lock().release_succeeded() {
                    self.report(FUNCTION, &violation);
                }
            });
        }
        result
    }
}
