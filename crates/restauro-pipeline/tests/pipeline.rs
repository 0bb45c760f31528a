//! Integration tests: end-to-end pipeline behavior through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use restauro_pipeline::filters::frequency::{HomomorphicParams, NotchParams};
use restauro_pipeline::filters::noise::{GaussianNoiseParams, SaltAndPepperParams};
use restauro_pipeline::filters::pde::DiffusionParams;
use restauro_pipeline::filters::spatial::{self, GaussianParams};
use restauro_pipeline::{
    CancellationToken, Filter, FilterChain, FilterParams, FilterSpec, GrayImage, Image,
    PipelineError, PipelineSupervisor, RgbImage, RunOutcome, StageError, config, execute,
    execute_filters, metrics,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic textured RGB test image.
fn photo(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let r = ((x * 7 + y * 3) % 200 + 20) as u8;
        #[allow(clippy::cast_possible_truncation)]
        let g = ((x * y + 11) % 180 + 40) as u8;
        #[allow(clippy::cast_possible_truncation)]
        let b = ((x ^ y) * 5 % 230 + 10) as u8;
        image::Rgb([r, g, b])
    })
}

fn spec(value: serde_json::Value) -> FilterSpec {
    serde_json::from_value(value).unwrap()
}

fn run(base: &Image, specs: &[FilterSpec]) -> restauro_pipeline::ExecutionResult {
    execute(base, specs, &CancellationToken::new())
        .unwrap()
        .completed()
        .expect("run should complete")
}

#[test]
fn median_is_idempotent_on_constant_images() {
    init_logging();
    for k in [1, 3, 5, 7, 9] {
        let constant = Image::Gray(GrayImage::from_pixel(11, 9, image::Luma([77])));
        let result = run(&constant, &[spec(serde_json::json!(["Filtro Mediano", k]))]);
        assert_eq!(result.image, constant, "k = {k}");
    }
}

#[test]
fn mean_filter_interior_matches_hand_computed_window() {
    init_logging();
    let img = GrayImage::from_raw(
        4,
        4,
        vec![
            10, 20, 30, 40, //
            50, 60, 70, 80, //
            90, 100, 110, 120, //
            130, 140, 150, 160,
        ],
    )
    .unwrap();
    let result = run(
        &Image::Gray(img),
        &[spec(serde_json::json!(["Filtro Media Aritmetica", 3]))],
    );
    let Image::Gray(out) = result.image else {
        panic!("expected gray output");
    };
    // Window around (1, 1): rows 0-2, columns 0-2.
    let window = [10, 20, 30, 50, 60, 70, 90, 100, 110];
    let mean = window.iter().sum::<u32>() / 9;
    assert_eq!(u32::from(out.get_pixel(1, 1).0[0]), mean);
    // Window around (2, 2): rows 1-3, columns 1-3.
    let window = [60, 70, 80, 100, 110, 120, 140, 150, 160];
    let mean = window.iter().sum::<u32>() / 9;
    assert_eq!(u32::from(out.get_pixel(2, 2).0[0]), mean);
}

#[test]
fn notch_without_notches_is_identity_on_color() {
    init_logging();
    let base = Image::Rgb(photo(20, 14));
    let filter = Filter::Notch(NotchParams {
        d0: 8.0,
        u_k: vec![],
        v_k: vec![],
    });
    let result = execute_filters(&base, &[filter], &CancellationToken::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(result.image, base);
}

#[test]
fn homomorphic_with_equal_gains_is_a_power_law() {
    init_logging();
    let gray = GrayImage::from_fn(16, 16, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let v = ((x * 13 + y * 29) % 256) as u8;
        image::Luma([v])
    });
    let g = 1.3;
    let filter = Filter::Homomorphic(HomomorphicParams {
        low: g,
        high: g,
        cutoff: 12.0,
    });
    let result = execute_filters(&Image::Gray(gray.clone()), &[filter], &CancellationToken::new())
        .unwrap()
        .completed()
        .unwrap();
    let Image::Gray(out) = result.image else {
        panic!("expected gray output");
    };
    for (src, dst) in gray.pixels().zip(out.pixels()) {
        let v = f64::from(src.0[0]) / 255.0;
        let expected = (((1.0 + v).powf(g) - 1.0).clamp(0.0, 1.0) * 255.0).round();
        assert!(
            (f64::from(dst.0[0]) - expected).abs() <= 1.0,
            "{} -> {} (expected {expected})",
            src.0[0],
            dst.0[0],
        );
    }
}

#[test]
fn diffusion_with_zero_iterations_is_noop() {
    init_logging();
    let base = Image::Rgb(photo(12, 12));
    let filter = Filter::AnisotropicDiffusion(DiffusionParams {
        iterations: 0,
        ..DiffusionParams::default()
    });
    let result = execute_filters(&base, &[filter], &CancellationToken::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(result.image, base);
}

#[test]
fn unknown_filter_is_skipped_and_median_still_applies() {
    init_logging();
    let rgb = photo(15, 11);
    let base = Image::Rgb(rgb.clone());
    let result = run(
        &base,
        &[
            FilterSpec::new("Unknown Filter", FilterParams::None),
            spec(serde_json::json!(["Filtro Mediano", 3])),
        ],
    );
    let planes = restauro_pipeline::channel::split(&rgb);
    let expected =
        restauro_pipeline::channel::merge(&planes.map(|p| spatial::median_filter(&p, 3).unwrap()));
    assert_eq!(result.image, Image::Rgb(expected));
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].index, 0);
    assert_eq!(result.failures[0].name, "Unknown Filter");
    assert_eq!(
        result.failures[0].error,
        StageError::UnknownFilter("Unknown Filter".to_string()),
    );
}

#[test]
fn second_submission_supersedes_the_first() {
    init_logging();
    let (mut supervisor, rx) = PipelineSupervisor::new();
    let base = Arc::new(Image::Rgb(photo(48, 48)));

    let slow: Vec<FilterSpec> = (0..50)
        .map(|_| {
            spec(serde_json::json!([
                "Diffusione Anisotropa",
                {"iterations": 2_000, "kappa": 15, "gamma": 0.1, "option": 2}
            ]))
        })
        .collect();
    let first = supervisor.submit(Arc::clone(&base), slow).unwrap();
    assert!(supervisor.is_running());

    let fast = vec![spec(serde_json::json!(["Filtro Mediano", 3]))];
    let second = supervisor.submit(Arc::clone(&base), fast).unwrap();
    assert!(second > first);

    let delivery = rx
        .recv_timeout(Duration::from_secs(60))
        .expect("second run should deliver");
    assert_eq!(delivery.generation, second);
    assert!(delivery.outcome.unwrap().is_clean());

    // The first run observed its cancellation and never delivers.
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}

#[test]
fn cancellation_discards_partial_results() {
    init_logging();
    let token = CancellationToken::new();
    let canceller = token.clone();
    let base = Image::Gray(GrayImage::from_pixel(64, 64, image::Luma([128])));
    let filters = vec![Filter::Shock { iterations: u32::MAX }];
    let handle = std::thread::spawn(move || execute_filters(&base, &filters, &token));
    std::thread::sleep(Duration::from_millis(50));
    canceller.cancel();
    let outcome = handle.join().unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
}

#[test]
fn saved_pipeline_reproduces_identical_output() {
    init_logging();
    let base = Image::Rgb(photo(24, 18));
    let filters = vec![
        Filter::GaussianNoise(GaussianNoiseParams {
            mean: 0.0,
            std: 12.5,
            seed: Some(2024),
        }),
        Filter::SaltAndPepper(SaltAndPepperParams {
            prob: 0.03,
            seed: Some(7),
        }),
        Filter::Median { ksize: 3 },
        Filter::Homomorphic(HomomorphicParams::default()),
        Filter::AnisotropicDiffusion(DiffusionParams::default()),
        Filter::Notch(NotchParams {
            d0: 2.0,
            u_k: vec![3, 0],
            v_k: vec![0, 5],
        }),
    ];
    let in_memory = execute_filters(&base, &filters, &CancellationToken::new())
        .unwrap()
        .completed()
        .unwrap();

    let text = config::filters_to_json(&filters).unwrap();
    let reloaded = config::from_json(&text).unwrap();
    let from_disk = run(&base, &reloaded);

    assert_eq!(from_disk.image, in_memory.image);
    assert!(from_disk.failures.is_empty());
}

#[test]
fn filter_chain_replays_after_undo() {
    init_logging();
    let base = Image::Rgb(photo(16, 16));
    let mut chain = FilterChain::new();
    chain.push(spec(serde_json::json!(["Filtro Mediano", 3])));
    chain.push(spec(serde_json::json!(["Filtro Media Aritmetica", 5])));

    let both = run(&base, chain.specs()).image;
    assert!(chain.undo());
    let median_only = run(&base, chain.specs()).image;
    assert_ne!(both, median_only);
    assert!(chain.redo());
    assert_eq!(run(&base, chain.specs()).image, both);
}

#[test]
fn restoration_improves_psnr_over_noisy_input() {
    init_logging();
    let clean = Image::Gray(GrayImage::from_fn(32, 32, |x, _| {
        image::Luma([if x < 16 { 60 } else { 190 }])
    }));
    let noisy = run(
        &clean,
        &[spec(serde_json::json!(["Rumore Sale e Pepe", {"prob": 0.05, "seed": 99}]))],
    )
    .image;
    let restored = run(&noisy, &[spec(serde_json::json!(["Filtro Mediano", 3]))]).image;

    let before = metrics::psnr(&clean, &noisy).unwrap();
    let after = metrics::psnr(&clean, &restored).unwrap();
    assert!(after > before, "psnr {before:.2} -> {after:.2}");
    let ssim = metrics::ssim(&clean, &restored).unwrap().unwrap();
    assert!(ssim > 0.5);
}

#[test]
fn cancelled_before_start_returns_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    let outcome = execute(
        &Image::Gray(GrayImage::new(4, 4)),
        &[spec(serde_json::json!(["Filtro Shock", 5]))],
        &token,
    )
    .unwrap();
    assert!(outcome.completed().is_none());
}

#[test]
fn oversized_kernel_from_config_is_rejected_before_any_stage() {
    init_logging();
    let base = Image::Gray(GrayImage::from_pixel(4, 4, image::Luma([50])));
    for ksize in [4_294_967_295u64, 20_001] {
        let specs = [
            spec(serde_json::json!(["Filtro Mediano", 3])),
            spec(serde_json::json!(["Filtro Mediano", ksize])),
        ];
        let err = execute(&base, &specs, &CancellationToken::new()).unwrap_err();
        assert!(
            matches!(err, PipelineError::InvalidConfig(_)),
            "ksize {ksize}: {err}"
        );
    }
}

#[test]
fn oversized_typed_kernel_is_rejected() {
    init_logging();
    let base = Image::Rgb(photo(6, 5));
    let filters = [Filter::Gaussian(GaussianParams {
        ksize: u32::MAX,
        sigma: 0.0,
    })];
    let err = execute_filters(&base, &filters, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}

#[test]
fn largest_accepted_kernel_still_runs() {
    init_logging();
    // Radius equal to the longer side is the largest accepted window.
    let base = Image::Gray(GrayImage::from_pixel(4, 3, image::Luma([90])));
    let result = run(&base, &[spec(serde_json::json!(["Filtro Mediano", 9]))]);
    assert_eq!(result.image, base);
}

#[test]
fn oversized_kernel_through_supervisor_delivers_config_error() {
    init_logging();
    let (mut supervisor, rx) = PipelineSupervisor::new();
    let base = Arc::new(Image::Gray(GrayImage::from_pixel(4, 4, image::Luma([50]))));
    let generation = supervisor
        .submit(
            base,
            vec![spec(serde_json::json!(["Filtro Mediano", 4_294_967_295u64]))],
        )
        .unwrap();
    let delivery = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("the run should deliver a failure");
    assert_eq!(delivery.generation, generation);
    assert!(matches!(
        delivery.outcome,
        Err(PipelineError::InvalidConfig(_))
    ));
}

#[test]
fn huge_iteration_count_is_accepted_and_cancellable() {
    init_logging();
    let (mut supervisor, rx) = PipelineSupervisor::new();
    let base = Arc::new(Image::Gray(GrayImage::from_pixel(32, 32, image::Luma([128]))));
    supervisor
        .submit(
            base,
            vec![spec(serde_json::json!([
                "Diffusione Anisotropa",
                {"iterations": 4_294_967_295u64, "kappa": 15, "gamma": 0.1, "option": 1}
            ]))],
        )
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(supervisor.is_running());
    supervisor.cancel();
    assert!(!supervisor.is_running());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}
