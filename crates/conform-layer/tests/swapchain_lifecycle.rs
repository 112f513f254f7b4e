// SPDX-License-Identifier: CEPL-1.0
use conform_api::{
    AcquireInfo, GraphicsBinding, GraphicsValidator, Instance, InstanceCreateInfo, MetalBinding,
    OpenGlBinding, ReleaseInfo, ResultCode, Runtime, Session, SessionCreateInfo,
    Swapchain, SwapchainCreateFlags, SwapchainCreateInfo, SwapchainImage, SwapchainUsageFlags,
    NoValidators, ValidatorProvider, VulkanBinding, WaitInfo, WaitStatus,
};
use conform_core::{DiagnosticLog, DiagnosticSink, Severity};
use conform_layer::{ConformanceLayer, HandleKey, HandleRegistry, ImageState};
use conform_sim::{SimConfig, SimFaults, SimRuntime};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ImageState::{Acquired, Created, Released, Waited};

struct Harness {
    layer: ConformanceLayer<SimRuntime>,
    log: Arc<DiagnosticLog>,
    instance: Instance,
    session: Session,
    binding: GraphicsBinding,
}

fn vulkan() -> GraphicsBinding {
    GraphicsBinding::Vulkan(VulkanBinding {
        device: 0xde,
        ..Default::default()
    })
}

fn harness_with(config: SimConfig, binding: GraphicsBinding) -> Harness {
    let log = Arc::new(DiagnosticLog::new());
    let layer = ConformanceLayer::new(SimRuntime::new(config), log.clone());
    let instance = layer
        .create_instance(&InstanceCreateInfo::default())
        .unwrap();
    let session = layer
        .create_session(
            instance,
            &SessionCreateInfo {
                system_id: 1,
                graphics_binding: binding,
            },
        )
        .unwrap();
    Harness {
        layer,
        log,
        instance,
        session,
        binding,
    }
}

fn harness(faults: SimFaults) -> Harness {
    harness_with(
        SimConfig {
            faults,
            ..Default::default()
        },
        vulkan(),
    )
}

impl Harness {
    fn formats(&self) -> Vec<i64> {
        let count = self
            .layer
            .enumerate_swapchain_formats(self.session, None)
            .unwrap();
        let mut formats = vec![0; count as usize];
        self.layer
            .enumerate_swapchain_formats(self.session, Some(&mut formats[..]))
            .unwrap();
        formats
    }

    fn swapchain(&self, create_flags: SwapchainCreateFlags) -> Swapchain {
        let format = self.formats()[0];
        self.layer
            .create_swapchain(
                self.session,
                &SwapchainCreateInfo {
                    create_flags,
                    format,
                    ..Default::default()
                },
            )
            .unwrap()
    }

    fn enumerate_into(&self, swapchain: Swapchain) -> Vec<SwapchainImage> {
        let count = self
            .layer
            .enumerate_swapchain_images(swapchain, None)
            .unwrap();
        let mut images = vec![self.binding.empty_image(); count as usize];
        self.layer
            .enumerate_swapchain_images(swapchain, Some(&mut images[..]))
            .unwrap();
        images
    }

    fn states(&self, swapchain: Swapchain) -> Vec<ImageState> {
        self.layer.image_states(swapchain).unwrap()
    }

    fn acquire(&self, swapchain: Swapchain) -> u32 {
        self.layer
            .acquire_swapchain_image(swapchain, &AcquireInfo)
            .unwrap()
    }

    fn wait(&self, swapchain: Swapchain) {
        assert_eq!(
            self.layer
                .wait_swapchain_image(swapchain, &WaitInfo::INFINITE),
            Ok(WaitStatus::Ready)
        );
    }

    fn release(&self, swapchain: Swapchain) {
        self.layer
            .release_swapchain_image(swapchain, &ReleaseInfo)
            .unwrap();
    }

    fn assert_clean(&self) {
        assert!(self.log.is_empty(), "unexpected diagnostics: {:?}", self.log.entries());
    }
}

#[test]
fn acquire_wait_release_then_stray_release() {
    let h = harness(SimFaults {
        ignore_call_order: true,
        ..Default::default()
    });
    let sc = h.swapchain(SwapchainCreateFlags::empty());

    assert_eq!(h.layer.enumerate_swapchain_images(sc, None), Ok(3));
    assert_eq!(h.states(sc), vec![Created, Created, Created]);

    assert_eq!(h.acquire(sc), 0);
    assert_eq!(h.states(sc)[0], Acquired);
    h.wait(sc);
    assert_eq!(h.states(sc)[0], Waited);
    h.release(sc);
    assert_eq!(h.states(sc)[0], Released);
    h.assert_clean();

    // The runtime accepts a release with nothing acquired.
    h.release(sc);
    assert!(h.log.contains("Release succeeded with no acquired image."));
    assert_eq!(h.states(sc), vec![Released, Created, Created]);
}

#[test]
fn dynamic_swapchain_rotates_through_images() {
    let h = harness(SimFaults::default());
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    h.enumerate_into(sc);

    for round in 0..2 {
        for index in 0..3 {
            assert_eq!(h.acquire(sc), index);
            h.wait(sc);
            h.release(sc);
            assert_eq!(h.states(sc)[index as usize], Released, "round {round}");
        }
    }
    h.assert_clean();
}

#[test]
fn images_held_in_flight_are_correlated_in_order() {
    let h = harness(SimFaults::default());
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    h.enumerate_into(sc);

    h.acquire(sc);
    h.acquire(sc);
    assert_eq!(h.states(sc), vec![Acquired, Acquired, Created]);
    h.wait(sc);
    assert_eq!(h.states(sc), vec![Waited, Acquired, Created]);
    h.release(sc);
    h.wait(sc);
    assert_eq!(h.states(sc), vec![Released, Waited, Created]);
    h.release(sc);
    h.assert_clean();
}

#[test]
fn static_image_cannot_be_reacquired() {
    let h = harness(SimFaults {
        repeat_acquired_index: true,
        ..Default::default()
    });
    let sc = h.swapchain(SwapchainCreateFlags::STATIC_IMAGE);
    assert_eq!(h.enumerate_into(sc).len(), 1);

    h.acquire(sc);
    h.wait(sc);
    h.release(sc);
    h.assert_clean();

    assert_eq!(h.acquire(sc), 0);
    assert!(h.log.contains("Static image cannot be acquired again."));
    assert_eq!(h.states(sc), vec![Released]);
}

#[test]
fn double_acquire_of_busy_image_is_flagged() {
    let h = harness(SimFaults {
        repeat_acquired_index: true,
        ..Default::default()
    });
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    h.enumerate_into(sc);

    h.acquire(sc);
    h.acquire(sc);
    assert!(h.log.contains("Acquired image already in Acquired state."));
    assert_eq!(h.states(sc)[0], Acquired);
}

#[test]
fn changing_image_count_is_flagged_and_size_is_kept() {
    let h = harness(SimFaults {
        image_count_drift: true,
        ..Default::default()
    });
    let sc = h.swapchain(SwapchainCreateFlags::empty());

    assert_eq!(h.layer.enumerate_swapchain_images(sc, None), Ok(3));
    h.assert_clean();
    assert_eq!(h.layer.enumerate_swapchain_images(sc, None), Ok(4));

    assert_eq!(h.log.count(Severity::Error), 1);
    assert!(h.log.contains("Image count 4 differs from previous count 3."));
    assert_eq!(h.states(sc).len(), 3);
}

#[test]
fn repeated_count_queries_are_idempotent() {
    let h = harness(SimFaults::default());
    let sc = h.swapchain(SwapchainCreateFlags::empty());

    for _ in 0..4 {
        assert_eq!(h.layer.enumerate_swapchain_images(sc, None), Ok(3));
    }
    assert_eq!(h.states(sc), vec![Created; 3]);
    h.assert_clean();
}

#[test]
fn acquire_before_enumeration_sizes_implicitly() {
    let h = harness(SimFaults::default());
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    assert_eq!(h.states(sc), Vec::<ImageState>::new());

    assert_eq!(h.acquire(sc), 0);
    assert_eq!(h.states(sc), vec![Acquired, Created, Created]);
    h.assert_clean();
}

#[test]
fn early_timeout_is_flagged() {
    let h = harness_with(
        SimConfig {
            wait_latency_ms: 500,
            faults: SimFaults {
                wait_returns_early: true,
                ..Default::default()
            },
            ..Default::default()
        },
        vulkan(),
    );
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    h.acquire(sc);

    let wait = WaitInfo::with_timeout(Duration::from_millis(50));
    assert_eq!(
        h.layer.wait_swapchain_image(sc, &wait),
        Ok(WaitStatus::TimeoutExpired)
    );
    assert!(h.log.contains("Wait returned before timeout"));
    assert_eq!(h.states(sc)[0], Acquired);
}

#[test]
fn honoured_timeout_is_clean() {
    let h = harness_with(
        SimConfig {
            wait_latency_ms: 500,
            ..Default::default()
        },
        vulkan(),
    );
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    h.acquire(sc);

    let wait = WaitInfo::with_timeout(Duration::from_millis(10));
    assert_eq!(
        h.layer.wait_swapchain_image(sc, &wait),
        Ok(WaitStatus::TimeoutExpired)
    );
    h.assert_clean();
    assert_eq!(h.states(sc)[0], Acquired);
}

#[test]
fn runtime_errors_pass_through_without_diagnostics() {
    let h = harness(SimFaults::default());
    let sc = h.swapchain(SwapchainCreateFlags::empty());

    assert_eq!(
        h.layer.wait_swapchain_image(sc, &WaitInfo::INFINITE),
        Err(ResultCode::ErrorCallOrderInvalid)
    );
    assert_eq!(
        h.layer.release_swapchain_image(sc, &ReleaseInfo),
        Err(ResultCode::ErrorCallOrderInvalid)
    );
    let mut too_small = [h.binding.empty_image(); 1];
    assert_eq!(
        h.layer.enumerate_swapchain_images(sc, Some(&mut too_small[..])),
        Err(ResultCode::ErrorSizeInsufficient)
    );
    assert_eq!(
        h.layer.create_swapchain(
            h.session,
            &SwapchainCreateInfo {
                format: 12345,
                ..Default::default()
            }
        ),
        Err(ResultCode::ErrorSwapchainFormatUnsupported)
    );
    h.assert_clean();
}

#[test]
fn destroying_instance_cascades() {
    let h = harness(SimFaults::default());
    let a = h.swapchain(SwapchainCreateFlags::empty());
    let b = h.swapchain(SwapchainCreateFlags::empty());
    assert_eq!(h.layer.registry().len(), 4);

    h.layer.destroy_instance(h.instance).unwrap();
    assert!(h.layer.registry().is_empty());
    assert!(h.layer.image_states(a).is_none());
    assert!(h.layer.image_states(b).is_none());
    h.assert_clean();
}

#[test]
fn destroying_session_keeps_instance() {
    let h = harness(SimFaults::default());
    let sc = h.swapchain(SwapchainCreateFlags::empty());

    h.layer.destroy_session(h.session).unwrap();
    assert!(h.layer.registry().contains(HandleKey::of(h.instance)));
    assert!(!h.layer.registry().contains(HandleKey::of(sc)));
    h.assert_clean();
}

#[test]
fn caller_owned_registry_is_used() {
    let registry = Arc::new(HandleRegistry::new());
    let log = Arc::new(DiagnosticLog::new());
    let layer = ConformanceLayer::new(SimRuntime::default(), log.clone())
        .with_registry(Arc::clone(&registry));

    let instance = layer
        .create_instance(&InstanceCreateInfo::default())
        .unwrap();
    assert!(registry.contains(HandleKey::of(instance)));
    layer.destroy_instance(instance).unwrap();
    assert!(registry.is_empty());
    assert!(log.is_empty());
}

#[test]
fn unregistered_swapchain_success_is_reported() {
    let h = harness(SimFaults::default());
    let format = h.formats()[0];
    // Created behind the layer's back.
    let sc = h
        .layer
        .next()
        .create_swapchain(
            h.session,
            &SwapchainCreateInfo {
                format,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(h.acquire(sc), 0);
    assert_eq!(h.log.count(Severity::Error), 1);
    assert!(h.log.contains("is not registered"));
}

#[test]
fn format_missing_from_enumeration_is_flagged() {
    let h = harness(SimFaults {
        omit_last_format: true,
        ..Default::default()
    });
    let formats = h.formats();
    assert_eq!(formats.len(), 2);

    // D32_SFLOAT is accepted by creation but was not enumerated.
    h.layer
        .create_swapchain(
            h.session,
            &SwapchainCreateInfo {
                format: 126,
                usage_flags: SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(h.log.contains("was not enumerated for the session"));
}

#[test]
fn empty_format_list_is_flagged() {
    let h = harness_with(
        SimConfig {
            formats: Some(Vec::new()),
            ..Default::default()
        },
        vulkan(),
    );
    assert_eq!(h.layer.enumerate_swapchain_formats(h.session, None), Ok(0));
    assert_eq!(h.log.count(Severity::Error), 1);
    assert!(h.log.contains("Invalid empty format count."));
}

#[test]
fn vulkan_images_validate_cleanly() {
    let h = harness(SimFaults::default());
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    let images = h.enumerate_into(sc);
    assert!(images
        .iter()
        .all(|i| matches!(i, SwapchainImage::Vulkan { image } if *image != 0)));
    h.assert_clean();
}

#[test]
fn opengl_images_validate_cleanly() {
    let h = harness_with(
        SimConfig::default(),
        GraphicsBinding::OpenGl(OpenGlBinding::default()),
    );
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    h.enumerate_into(sc);
    h.assert_clean();
}

#[derive(Clone, Default)]
struct CountingProvider {
    structs: Arc<AtomicUsize>,
    usages: Arc<AtomicUsize>,
}

struct CountingValidator(CountingProvider);

impl GraphicsValidator for CountingValidator {
    fn validate_swapchain_image_structs(
        &self,
        _sink: &dyn DiagnosticSink,
        _format: i64,
        images: &[SwapchainImage],
    ) {
        assert_eq!(images.len(), 3);
        self.0.structs.fetch_add(1, Ordering::SeqCst);
    }

    fn validate_usage_flags(
        &self,
        _sink: &dyn DiagnosticSink,
        usage: SwapchainUsageFlags,
        _format: i64,
        _images: &[SwapchainImage],
    ) {
        assert!(usage.contains(SwapchainUsageFlags::COLOR_ATTACHMENT));
        self.0.usages.fetch_add(1, Ordering::SeqCst);
    }
}

impl ValidatorProvider for CountingProvider {
    fn validator_for(&self, binding: &GraphicsBinding) -> Option<Box<dyn GraphicsValidator>> {
        match binding {
            GraphicsBinding::Metal(_) => None,
            _ => Some(Box::new(CountingValidator(self.clone()))),
        }
    }
}

#[test]
fn validators_run_only_when_images_are_written() {
    let provider = CountingProvider::default();
    let log = Arc::new(DiagnosticLog::new());
    let layer = ConformanceLayer::new(SimRuntime::default(), log.clone())
        .with_validators(provider.clone());
    let instance = layer
        .create_instance(&InstanceCreateInfo::default())
        .unwrap();

    for (binding, expected) in [
        (vulkan(), 1),
        (GraphicsBinding::Metal(MetalBinding::default()), 0),
    ] {
        provider.structs.store(0, Ordering::SeqCst);
        provider.usages.store(0, Ordering::SeqCst);

        let session = layer
            .create_session(
                instance,
                &SessionCreateInfo {
                    system_id: 1,
                    graphics_binding: binding,
                },
            )
            .unwrap();
        let format = SimConfig::default().formats_for(binding.api())[0];
        let sc = layer
            .create_swapchain(
                session,
                &SwapchainCreateInfo {
                    format,
                    ..Default::default()
                },
            )
            .unwrap();

        layer.enumerate_swapchain_images(sc, None).unwrap();
        assert_eq!(provider.structs.load(Ordering::SeqCst), 0);

        let mut images = vec![binding.empty_image(); 3];
        layer
            .enumerate_swapchain_images(sc, Some(&mut images[..]))
            .unwrap();
        assert_eq!(provider.structs.load(Ordering::SeqCst), expected);
        assert_eq!(provider.usages.load(Ordering::SeqCst), expected);
    }
    assert!(log.is_empty());
}

#[test]
fn concurrent_swapchains_stay_consistent() {
    let h = Arc::new(harness(SimFaults::default()));
    let swapchains: Vec<_> = (0..4)
        .map(|_| h.swapchain(SwapchainCreateFlags::empty()))
        .collect();

    let threads: Vec<_> = swapchains
        .iter()
        .map(|&sc| {
            let h = Arc::clone(&h);
            std::thread::spawn(move || {
                for _ in 0..30 {
                    h.acquire(sc);
                    h.wait(sc);
                    h.release(sc);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    for sc in swapchains {
        assert_eq!(h.states(sc), vec![Released; 3]);
    }
    h.assert_clean();
}

#[test]
fn image_count_beyond_capacity_is_flagged() {
    let h = harness(SimFaults {
        overreport_image_count: true,
        ..Default::default()
    });
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    let mut images = vec![h.binding.empty_image(); 3];
    assert_eq!(
        h.layer.enumerate_swapchain_images(sc, Some(&mut images[..])),
        Ok(4)
    );
    assert!(h.log.contains("Image count output 4 exceeds capacity input 3."));
    assert_eq!(h.states(sc), vec![Created; 4]);
}

#[test]
fn unwaited_release_is_flagged_and_tracking_recovers() {
    let h = harness(SimFaults {
        ignore_call_order: true,
        ..Default::default()
    });
    let sc = h.swapchain(SwapchainCreateFlags::empty());
    h.enumerate_into(sc);

    assert_eq!(h.acquire(sc), 0);
    h.release(sc);
    assert_eq!(h.log.count(Severity::Error), 1);
    assert!(h.log.contains("Release succeeded for image in wrong state Acquired."));
    assert_eq!(h.states(sc), vec![Released, Created, Created]);

    for _ in 0..3 {
        h.acquire(sc);
        h.wait(sc);
        h.release(sc);
    }
    assert_eq!(h.log.count(Severity::Error), 1);
    assert_eq!(h.states(sc), vec![Released; 3]);
}

#[test]
fn failed_implicit_enumeration_skips_acquire_tracking() {
    let h = harness(SimFaults {
        fail_image_enumeration: true,
        ..Default::default()
    });
    let sc = h.swapchain(SwapchainCreateFlags::empty());

    assert_eq!(h.acquire(sc), 0);
    assert_eq!(h.log.count(Severity::Error), 1);
    assert!(h
        .log
        .contains("Unable to enumerate swapchain images due to error XR_ERROR_RUNTIME_FAILURE."));
    assert!(h.states(sc).is_empty());

    assert_eq!(
        h.layer.enumerate_swapchain_images(sc, None),
        Err(ResultCode::ErrorRuntimeFailure)
    );
    assert_eq!(h.log.count(Severity::Error), 1);
}

#[test]
fn duplicate_handle_from_runtime_is_reported() {
    let h = harness(SimFaults {
        reuse_handles: true,
        ..Default::default()
    });
    h.assert_clean();
    assert_eq!(h.layer.registry().len(), 2);

    let again = h
        .layer
        .create_instance(&InstanceCreateInfo::default())
        .unwrap();
    assert_eq!(again, h.instance);
    assert!(h
        .log
        .contains("Handle tracking failed: instance 0x1 is already registered."));
    assert_eq!(h.layer.registry().len(), 2);
}

#[test]
fn format_count_for_untracked_session_is_reported() {
    let h = harness(SimFaults::default());
    let untracked = h
        .layer
        .next()
        .create_session(
            h.instance,
            &SessionCreateInfo {
                system_id: 1,
                graphics_binding: h.binding,
            },
        )
        .unwrap();

    assert_eq!(h.layer.enumerate_swapchain_formats(untracked, None), Ok(3));
    assert_eq!(h.log.count(Severity::Error), 1);
    assert!(h.log.contains("is not registered"));
}

#[test]
fn usage_checks_follow_the_validator_provider() {
    let depth_usage_on_color = SwapchainCreateInfo {
        format: 43,
        usage_flags: SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        ..Default::default()
    };

    let h = harness(SimFaults::default());
    let sc = h
        .layer
        .create_swapchain(h.session, &depth_usage_on_color)
        .unwrap();
    h.enumerate_into(sc);
    assert!(h
        .log
        .contains("Swapchain with depth-stencil usage was created with color format 0x2b."));

    let log = Arc::new(DiagnosticLog::new());
    let layer =
        ConformanceLayer::new(SimRuntime::default(), log.clone()).with_validators(NoValidators);
    let instance = layer
        .create_instance(&InstanceCreateInfo::default())
        .unwrap();
    let session = layer
        .create_session(
            instance,
            &SessionCreateInfo {
                system_id: 1,
                graphics_binding: vulkan(),
            },
        )
        .unwrap();
    let sc = layer
        .create_swapchain(session, &depth_usage_on_color)
        .unwrap();
    let mut images = vec![vulkan().empty_image(); 3];
    assert_eq!(layer.enumerate_swapchain_images(sc, Some(&mut images[..])), Ok(3));
    assert!(log.is_empty(), "unexpected diagnostics: {:?}", log.entries());
}
