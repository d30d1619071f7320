mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use disflow_core::config::{DisConfig, Preset, VariationalConfig};
use disflow_core::error::FlowError;
use disflow_core::flow::DisOpticalFlow;
use disflow_core::frame::FlowField;
use disflow_core::refine::FlowRefiner;

use common::{brighten, max_abs_component, rms_error, textured, textured_shifted};

fn no_variational(mut config: DisConfig) -> DisConfig {
    config.variational.iterations = 0;
    config
}

// ---------------------------------------------------------------------------
// Accuracy
// ---------------------------------------------------------------------------

#[test]
fn test_identical_frames_give_zero_flow() {
    let img = textured(64, 64);
    let mut dis = DisOpticalFlow::from_preset(Preset::Balanced);
    let flow = dis.compute(img.view(), img.view()).unwrap();

    assert_eq!(flow.data.dim(), (64, 64, 2));
    let max = max_abs_component(&flow);
    assert!(max < 1e-4, "identity flow should be zero, max component {max}");
}

#[test]
fn test_balanced_recovers_translation_64() {
    let i0 = textured(64, 64);
    let i1 = textured_shifted(64, 64, 3.0, 1.0);
    let mut dis = DisOpticalFlow::from_preset(Preset::Balanced);
    let flow = dis.compute(i0.view(), i1.view()).unwrap();

    let rms = rms_error(&flow, 3.0, 1.0, 8);
    assert!(rms <= 0.5, "RMS error {rms} exceeds 0.5 px");
}

#[test]
fn test_recovers_translation_without_refinement() {
    let i0 = textured(96, 128);
    let i1 = textured_shifted(96, 128, -2.0, 1.5);
    let mut config = no_variational(DisConfig::from_preset(Preset::HigherQuality));
    config.finest_scale = 0;
    let mut dis = DisOpticalFlow::new(config);
    let flow = dis.compute(i0.view(), i1.view()).unwrap();

    let rms = rms_error(&flow, -2.0, 1.5, 8);
    assert!(rms <= 0.5, "RMS error {rms} exceeds 0.5 px");
}

#[test]
fn test_recovers_translation_without_propagation() {
    let i0 = textured(64, 64);
    let i1 = textured_shifted(64, 64, 2.0, -1.0);
    let config = DisConfig {
        use_spatial_propagation: false,
        ..DisConfig::default()
    };
    let mut dis = DisOpticalFlow::new(config);
    let flow = dis.compute(i0.view(), i1.view()).unwrap();

    let rms = rms_error(&flow, 2.0, -1.0, 8);
    assert!(rms <= 0.5, "RMS error {rms} exceeds 0.5 px");
}

#[test]
fn test_mean_normalization_tolerates_brightness_offset() {
    let i0 = textured(64, 64);
    let i1 = brighten(&textured_shifted(64, 64, 3.0, 1.0), 20);
    let mut dis = DisOpticalFlow::new(no_variational(DisConfig::default()));
    let flow = dis.compute(i0.view(), i1.view()).unwrap();

    let rms = rms_error(&flow, 3.0, 1.0, 8);
    assert!(rms <= 0.5, "mean-normalised flow drifted under offset: RMS {rms}");
}

#[test]
fn test_plain_ssd_sees_brightness_offset() {
    let i0 = textured(64, 64);
    let i1 = textured_shifted(64, 64, 3.0, 1.0);
    let brighter = brighten(&i1, 20);
    let config = DisConfig {
        use_mean_normalization: false,
        ..no_variational(DisConfig::default())
    };
    let mut dis = DisOpticalFlow::new(config);

    let plain = dis.compute(i0.view(), i1.view()).unwrap();
    let offset = dis.compute(i0.view(), brighter.view()).unwrap();
    assert_ne!(plain, offset);
}

#[test]
fn test_more_descent_iterations_do_not_hurt() {
    let i0 = textured(96, 128);
    let i1 = textured_shifted(96, 128, -2.3, 1.6);
    let rms_with = |iterations: usize| {
        let config = DisConfig {
            finest_scale: 0,
            grad_descent_iterations: iterations,
            ..no_variational(DisConfig::default())
        };
        let flow = DisOpticalFlow::new(config).compute(i0.view(), i1.view()).unwrap();
        rms_error(&flow, -2.3, 1.6, 8)
    };

    let few = rms_with(4);
    let many = rms_with(25);
    assert!(many <= few + 1e-3, "25 iterations RMS {many} worse than 4 iterations RMS {few}");
    assert!(many <= 0.5, "RMS error {many} exceeds 0.5 px");
}

// ---------------------------------------------------------------------------
// Determinism and buffer reuse
// ---------------------------------------------------------------------------

#[test]
fn test_repeated_calls_are_bit_identical() {
    let i0 = textured(80, 100);
    let i1 = textured_shifted(80, 100, 1.5, -2.0);
    let mut dis = DisOpticalFlow::default();

    let first = dis.compute(i0.view(), i1.view()).unwrap();
    let second = dis.compute(i0.view(), i1.view()).unwrap();
    assert_eq!(first, second);

    let mut fresh = DisOpticalFlow::default();
    let third = fresh.compute(i0.view(), i1.view()).unwrap();
    assert_eq!(first, third);
}

#[test]
fn test_results_independent_of_thread_count() {
    let i0 = textured(120, 150);
    let i1 = textured_shifted(120, 150, 2.5, -1.5);

    for propagation in [true, false] {
        let config = DisConfig {
            use_spatial_propagation: propagation,
            ..DisConfig::default()
        };
        let run = |threads: usize| {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            pool.install(|| {
                DisOpticalFlow::new(config.clone())
                    .compute(i0.view(), i1.view())
                    .unwrap()
            })
        };

        let single = run(1);
        for threads in [3, 8] {
            assert_eq!(
                run(threads),
                single,
                "propagation={propagation}: {threads} threads differ from 1"
            );
        }
    }
}

#[test]
fn test_collect_garbage_then_reuse() {
    let i0 = textured(64, 64);
    let i1 = textured_shifted(64, 64, 1.0, 1.0);
    let mut dis = DisOpticalFlow::default();

    let before = dis.compute(i0.view(), i1.view()).unwrap();
    dis.collect_garbage();
    let after = dis.compute(i0.view(), i1.view()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_size_change_between_calls() {
    let mut dis = DisOpticalFlow::default();
    let small = textured(48, 40);
    let large = textured(120, 160);

    let a = dis.compute(small.view(), small.view()).unwrap();
    let b = dis.compute(large.view(), large.view()).unwrap();
    assert_eq!(a.data.dim(), (48, 40, 2));
    assert_eq!(b.data.dim(), (120, 160, 2));
}

// ---------------------------------------------------------------------------
// Size limits and input validation
// ---------------------------------------------------------------------------

#[test]
fn test_smallest_accepted_image() {
    let img = textured(12, 12);
    let mut dis = DisOpticalFlow::default();
    let flow = dis.compute(img.view(), img.view()).unwrap();
    assert_eq!(flow.data.dim(), (12, 12, 2));
}

#[test]
fn test_too_small_image_rejected() {
    let img = textured(11, 11);
    let mut dis = DisOpticalFlow::default();
    let err = dis.compute(img.view(), img.view()).unwrap_err();
    assert!(
        matches!(err, FlowError::ImageTooSmall { width: 11, height: 11 }),
        "unexpected error {err:?}"
    );
    assert!(err.to_string().contains(">= 12"));
}

#[test]
fn test_short_side_below_twelve_accepted_when_long_side_is_large() {
    for (h, w) in [(11, 100), (100, 11)] {
        let img = textured(h, w);
        let mut dis = DisOpticalFlow::default();
        let flow = dis.compute(img.view(), img.view()).unwrap();
        assert_eq!(flow.data.dim(), (h, w, 2));
        assert_eq!(dis.last_plan().map(|p| p.patch_size), Some(8));
    }
}

#[test]
fn test_short_side_below_patch_rejected() {
    let img = textured(7, 100);
    let mut dis = DisOpticalFlow::default();
    let err = dis.compute(img.view(), img.view()).unwrap_err();
    assert!(
        matches!(err, FlowError::ImageTooSmall { width: 100, height: 7 }),
        "unexpected error {err:?}"
    );
}

#[test]
fn test_very_wide_frames_at_full_resolution() {
    let (h, w) = (16, 40_000);
    let i0 = textured(h, w);
    let i1 = textured_shifted(h, w, 1.5, 0.0);
    let config = DisConfig {
        finest_scale: 0,
        ..no_variational(DisConfig::default())
    };
    let mut dis = DisOpticalFlow::new(config);
    let flow = dis.compute(i0.view(), i1.view()).unwrap();

    assert_eq!(flow.data.dim(), (h, w, 2));
    assert!(flow.data.iter().all(|v| v.is_finite()));
}

#[test]
fn test_empty_image_rejected() {
    let empty = Array2::<u8>::zeros((0, 0));
    let mut dis = DisOpticalFlow::default();
    let err = dis.compute(empty.view(), empty.view()).unwrap_err();
    assert!(matches!(err, FlowError::EmptyImage));
}

#[test]
fn test_size_mismatch_rejected() {
    let a = textured(32, 32);
    let b = textured(32, 40);
    let mut dis = DisOpticalFlow::default();
    let err = dis.compute(a.view(), b.view()).unwrap_err();
    assert!(matches!(
        err,
        FlowError::SizeMismatch {
            first_width: 32,
            second_width: 40,
            ..
        }
    ));
}

#[test]
fn test_non_contiguous_rejected() {
    let a = textured(32, 32);
    let b = textured_shifted(32, 32, 1.0, 0.0);
    let mut dis = DisOpticalFlow::default();
    let err = dis.compute(a.t(), b.t()).unwrap_err();
    assert!(matches!(err, FlowError::NonContiguous));
}

#[test]
fn test_invalid_config_rejected_before_output_changes() {
    let img = textured(32, 32);
    let config = DisConfig {
        patch_stride: 0,
        ..DisConfig::default()
    };
    let mut dis = DisOpticalFlow::new(config);
    let mut flow = FlowField::constant(32, 32, 7.0, 7.0);
    let err = dis.calc(img.view(), img.view(), &mut flow).unwrap_err();

    assert!(matches!(err, FlowError::InvalidConfig(_)));
    assert_eq!(flow, FlowField::constant(32, 32, 7.0, 7.0));
}

// ---------------------------------------------------------------------------
// Initial flow
// ---------------------------------------------------------------------------

/// With no descent steps and no propagation the only way to move away from
/// zero is the supplied initial flow.
fn seed_only_config() -> DisConfig {
    DisConfig {
        grad_descent_iterations: 0,
        use_spatial_propagation: false,
        variational: VariationalConfig {
            iterations: 0,
            ..VariationalConfig::default()
        },
        ..DisConfig::default()
    }
}

#[test]
fn test_matching_initial_flow_is_used() {
    let i0 = textured(64, 64);
    let i1 = textured_shifted(64, 64, 3.0, 1.0);
    let mut dis = DisOpticalFlow::new(seed_only_config());

    let mut flow = FlowField::constant(64, 64, 3.0, 1.0);
    dis.calc(i0.view(), i1.view(), &mut flow).unwrap();

    // Patches near the right and bottom edges sample the replicated border.
    for r in 8..56 {
        for c in 8..56 {
            let (dx, dy) = flow.at(r, c);
            assert!(
                (dx - 3.0).abs() < 1e-3 && (dy - 1.0).abs() < 1e-3,
                "seeded flow at ({r}, {c}) = ({dx}, {dy})"
            );
        }
    }
}

#[test]
fn test_mismatched_initial_flow_is_ignored() {
    let i0 = textured(64, 64);
    let i1 = textured_shifted(64, 64, 3.0, 1.0);
    let mut dis = DisOpticalFlow::new(seed_only_config());

    let mut flow = FlowField::constant(20, 20, 3.0, 1.0);
    dis.calc(i0.view(), i1.view(), &mut flow).unwrap();

    assert_eq!(flow.data.dim(), (64, 64, 2));
    assert!(max_abs_component(&flow) < 1e-6);
}

// ---------------------------------------------------------------------------
// Scale plan, progress and refiner pool
// ---------------------------------------------------------------------------

#[test]
fn test_last_plan_reports_auto_selection() {
    let img = textured(64, 64);
    let mut dis = DisOpticalFlow::default();
    assert!(dis.last_plan().is_none());
    dis.compute(img.view(), img.view()).unwrap();

    let plan = dis.last_plan().unwrap();
    assert!(plan.auto_selected);
    assert_eq!((plan.finest_scale, plan.coarsest_scale), (0, 1));
    // Auto-selection does not change the stored configuration.
    assert_eq!(dis.config().finest_scale, 2);
}

#[test]
fn test_progress_reaches_one() {
    let img = textured(256, 320);
    let mut dis = DisOpticalFlow::default();
    let mut flow = FlowField::default();
    let mut seen = Vec::new();
    dis.calc_with_progress(img.view(), img.view(), &mut flow, |p| seen.push(p))
        .unwrap();

    let plan = dis.last_plan().unwrap();
    assert_eq!(plan.num_levels(), 2);
    assert_eq!(seen.len(), plan.num_levels());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!((seen[seen.len() - 1] - 1.0).abs() < 1e-6);
}

#[derive(Clone, Default)]
struct Counters {
    configured: Arc<AtomicUsize>,
    refined: Arc<AtomicUsize>,
    reset: Arc<AtomicUsize>,
}

struct CountingRefiner(Counters);

impl FlowRefiner for CountingRefiner {
    fn name(&self) -> &str {
        "counting"
    }

    fn configure(&mut self, _config: &VariationalConfig) {
        self.0.configured.fetch_add(1, Ordering::SeqCst);
    }

    fn refine(&mut self, _i0: ArrayView2<'_, u8>, _i1: ArrayView2<'_, u8>, _ux: &mut Array2<f32>, _uy: &mut Array2<f32>) {
        self.0.refined.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&mut self) {
        self.0.reset.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_refiner_pool_runs_once_per_scale() {
    let counters = Counters::default();
    let make = {
        let counters = counters.clone();
        move || Box::new(CountingRefiner(counters.clone())) as Box<dyn FlowRefiner>
    };
    let mut dis = DisOpticalFlow::with_refiners(DisConfig::default(), make);
    let img = textured(64, 64);
    dis.compute(img.view(), img.view()).unwrap();

    let levels = dis.last_plan().unwrap().num_levels();
    assert_eq!(counters.configured.load(Ordering::SeqCst), levels);
    assert_eq!(counters.refined.load(Ordering::SeqCst), levels);

    dis.collect_garbage();
    assert_eq!(
        counters.reset.load(Ordering::SeqCst),
        disflow_core::consts::MAX_PYRAMID_LEVELS
    );
}

#[test]
fn test_refiner_skipped_when_disabled() {
    let counters = Counters::default();
    let make = {
        let counters = counters.clone();
        move || Box::new(CountingRefiner(counters.clone())) as Box<dyn FlowRefiner>
    };
    let config = DisConfig::from_preset(Preset::Fastest);
    let mut dis = DisOpticalFlow::with_refiners(config, make);
    let img = textured(64, 64);
    dis.compute(img.view(), img.view()).unwrap();

    assert_eq!(counters.refined.load(Ordering::SeqCst), 0);
}
