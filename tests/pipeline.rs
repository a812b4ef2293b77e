use ndarray::{Array2, Array3, Axis, s};
use seathru::{Diagnostic, PipelineParams, run_pipeline};

const BETA: [f64; 3] = [0.25, 0.12, 0.10];
const B_INF: [f64; 3] = [0.15, 0.35, 0.45];

/// A checkerboard of two grey-ish surfaces seen through water, with depth
/// increasing from 2 to 8 down the rows.
fn underwater_scene(rows: usize, cols: usize) -> (Array3<f64>, Array2<f64>, Array3<f64>) {
    let depths = Array2::from_shape_fn((rows, cols), |(r, _)| 2.0 + 6.0 * r as f64 / (rows - 1) as f64);
    let scene = Array3::from_shape_fn((rows, cols, 3), |(r, c, ch)| {
        let bright = (r / 6 + c / 6) % 2 == 0;
        let base = if bright { 0.8 } else { 0.1 };
        base - 0.05 * ch as f64
    });
    let image = Array3::from_shape_fn((rows, cols, 3), |(r, c, ch)| {
        let t = (-BETA[ch] * depths[[r, c]]).exp();
        scene[[r, c, ch]] * t + B_INF[ch] * (1.0 - t)
    });
    (image, depths, scene)
}

fn channel_mean(image: &Array3<f64>, ch: usize) -> f64 {
    image.index_axis(Axis(2), ch).mean().unwrap_or(0.0)
}

#[test]
fn restores_synthetic_scene_within_unit_range() {
    let (image, depths, _) = underwater_scene(48, 48);
    let restoration = run_pipeline(&image, &depths, &PipelineParams::default()).unwrap();

    assert_eq!(restoration.image.dim(), (48, 48, 3));
    assert!(restoration.image.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
    assert!(restoration.neighborhood_count >= 1);
    assert!(!restoration.diagnostics.contains(&Diagnostic::EmptyForeground));
    for (report, ch) in restoration.channels.iter().zip(seathru::Channel::ALL) {
        assert_eq!(report.channel, ch);
        assert!(report.backscatter_points > 0);
    }
}

/// Mean absolute error between the restored image and the true scene.
fn mean_abs_error(a: &Array3<f64>, b: &Array3<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
}

#[test]
fn recovers_black_and_white_scene_radiance() {
    // Black and white squares average to 0.5, which `f = 2` maps to unit
    // illumination. The output is min-max scaled, so the scene spans [0, 1].
    let (rows, cols) = (48, 48);
    let depths = Array2::from_shape_fn((rows, cols), |(r, _)| 2.0 + 6.0 * r as f64 / (rows - 1) as f64);
    let scene = Array3::from_shape_fn((rows, cols, 3), |(r, c, _)| {
        if (r / 6 + c / 6) % 2 == 0 { 1.0 } else { 0.0 }
    });
    let image = Array3::from_shape_fn((rows, cols, 3), |(r, c, ch)| {
        let t = (-BETA[ch] * depths[[r, c]]).exp();
        scene[[r, c, ch]] * t + B_INF[ch] * (1.0 - t)
    });

    let mut params = PipelineParams::default();
    params.illumination.f = 2.0;
    params.illumination.max_iters = 4000;
    params.illumination.tol = 1e-10;
    let restoration = run_pipeline(&image, &depths, &params).unwrap();

    let before = mean_abs_error(&image, &scene);
    let after = mean_abs_error(&restoration.image, &scene);
    assert!(before > 0.2, "input error {before}");
    assert!(after < 0.05, "restored error {after} (input {before})");
    for report in &restoration.channels {
        assert!(!report.backscatter.is_fallback());
        assert!(!report.attenuation.is_fallback());
    }
}

#[test]
fn restoration_lifts_red_relative_to_blue() {
    let (image, depths, _) = underwater_scene(48, 48);
    let restoration = run_pipeline(&image, &depths, &PipelineParams::default()).unwrap();

    let before = channel_mean(&image, 0) / channel_mean(&image, 2);
    let after = channel_mean(&restoration.image, 0) / channel_mean(&restoration.image, 2);
    assert!(after > before, "red/blue ratio {after} should exceed {before}");
}

#[test]
fn restoration_preserves_checkerboard_contrast() {
    let (image, depths, scene) = underwater_scene(48, 48);
    let restoration = run_pipeline(&image, &depths, &PipelineParams::default()).unwrap();

    // Compare the deepest band: bright squares must stay brighter than dark ones.
    let rows = 36..48;
    let (mut bright, mut dark) = (Vec::new(), Vec::new());
    for r in rows {
        for c in 0..48 {
            let v = restoration.image.slice(s![r, c, ..]).sum();
            if scene[[r, c, 0]] > 0.5 {
                bright.push(v);
            } else {
                dark.push(v);
            }
        }
    }
    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
    assert!(mean(&bright) > mean(&dark));
}

#[test]
fn same_seed_gives_identical_output() {
    let (image, depths, _) = underwater_scene(32, 32);
    let params = PipelineParams {
        seed: 42,
        ..PipelineParams::default()
    };
    let a = run_pipeline(&image, &depths, &params).unwrap();
    let b = run_pipeline(&image, &depths, &params).unwrap();
    assert_eq!(a.image, b.image);
    assert_eq!(a.channels, b.channels);
    assert_eq!(a.diagnostics, b.diagnostics);
}

#[test]
fn zero_depth_image_is_left_unchanged() {
    let image = Array3::from_shape_fn((12, 12, 3), |(r, c, ch)| ((r + c + ch) % 7) as f64 / 7.0);
    let depths = Array2::<f64>::zeros((12, 12));
    let restoration = run_pipeline(&image, &depths, &PipelineParams::default()).unwrap();

    assert_eq!(restoration.neighborhood_count, 0);
    assert!(restoration.diagnostics.contains(&Diagnostic::EmptyForeground));
    assert_eq!(restoration.image, image);
}

#[test]
fn mismatched_depth_is_rejected() {
    let (image, _, _) = underwater_scene(16, 16);
    let depths = Array2::<f64>::ones((16, 15));
    assert!(matches!(
        run_pipeline(&image, &depths, &PipelineParams::default()),
        Err(seathru::Error::ShapeMismatch { .. })
    ));
}
