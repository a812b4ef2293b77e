use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage};
use seathru::{
    BitDepth, OutputFormat, RestoreParams, iterate_images, read_depth_map, read_rgb_image,
    restore_directory_to_path, restore_to_buffer, restore_to_path,
};
use tempfile::tempdir;

const SIDE: u32 = 40;

/// Bluish checkerboard that fades toward the bottom, with a disparity map
/// that is large (near) at the top.
fn write_pair(dir: &Path, stem: &str) {
    let image = RgbImage::from_fn(SIDE, SIDE, |x, y| {
        let fade = 1.0 - 0.6 * y as f32 / SIDE as f32;
        let bright = (x / 5 + y / 5) % 2 == 0;
        let base = if bright { 200.0 } else { 40.0 };
        Rgb([
            (base * 0.4 * fade + 10.0) as u8,
            (base * 0.8 * fade + 40.0) as u8,
            (base * fade * 0.9 + 50.0).min(255.0) as u8,
        ])
    });
    image.save(dir.join(format!("{stem}.png"))).unwrap();

    let disparity = GrayImage::from_fn(SIDE, SIDE, |_, y| Luma([255 - (y * 5) as u8]));
    disparity.save(dir.join(format!("{stem}_depth.png"))).unwrap();
}

fn fast_params() -> RestoreParams {
    let mut params = RestoreParams::default();
    params.pipeline.backscatter.restarts = 4;
    params.pipeline.attenuation.restarts = 4;
    params.pipeline.illumination.max_iters = 20;
    params
}

#[test]
fn readers_return_expected_shapes() {
    let dir = tempdir().unwrap();
    write_pair(dir.path(), "scene");

    let image = read_rgb_image(&dir.path().join("scene.png")).unwrap();
    assert_eq!(image.dim(), (SIDE as usize, SIDE as usize, 3));
    assert!(image.iter().all(|v| (0.0..=1.0).contains(v)));

    let depth = read_depth_map(&dir.path().join("scene_depth.png")).unwrap();
    assert_eq!(depth.dim(), (SIDE as usize, SIDE as usize));
    assert_eq!(depth[[0, 0]], 255.0);
    assert_eq!(depth[[1, 0]], 250.0);
}

#[test]
fn restore_to_path_writes_image_and_sidecar() {
    let dir = tempdir().unwrap();
    write_pair(dir.path(), "scene");
    let output = dir.path().join("out").join("scene.png");

    let params = RestoreParams {
        sidecar: true,
        bit_depth: BitDepth::U16,
        ..fast_params()
    };
    let restoration = restore_to_path(
        &dir.path().join("scene.png"),
        &dir.path().join("scene_depth.png"),
        &output,
        &params,
    )
    .unwrap();
    assert!(restoration.neighborhood_count >= 1);

    let written = image::open(&output).unwrap();
    assert_eq!((written.width(), written.height()), (SIDE, SIDE));
    assert!(matches!(written, image::DynamicImage::ImageRgb16(_)));

    let sidecar = std::fs::read_to_string(output.with_extension("json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
    assert_eq!(json["software"], "seathru");
    assert_eq!(json["width"], SIDE as u64);
    assert_eq!(json["channels"].as_array().map(|c| c.len()), Some(3));
    assert_eq!(json["params"]["pipeline"]["backscatter"]["restarts"], 4);
    assert!(json["diagnostics"].is_array());
}

#[test]
fn size_limit_downscales_output() {
    let dir = tempdir().unwrap();
    write_pair(dir.path(), "scene");
    let params = RestoreParams {
        size: Some(20),
        format: OutputFormat::TIFF,
        ..fast_params()
    };
    let restored = restore_to_buffer(
        &dir.path().join("scene.png"),
        &dir.path().join("scene_depth.png"),
        &params,
    )
    .unwrap();
    assert_eq!((restored.width, restored.height), (20, 20));
    assert_eq!(restored.rgb.as_ref().map(Vec::len), Some(20 * 20 * 3));

    let bytes = restored.encode().unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (20, 20));
}

#[test]
fn jpeg_buffer_is_always_eight_bit() {
    let dir = tempdir().unwrap();
    write_pair(dir.path(), "scene");
    let params = RestoreParams {
        format: OutputFormat::JPEG,
        bit_depth: BitDepth::U16,
        denoise: false,
        ..fast_params()
    };
    let restored = restore_to_buffer(
        &dir.path().join("scene.png"),
        &dir.path().join("scene_depth.png"),
        &params,
    )
    .unwrap();
    assert_eq!(restored.bit_depth, BitDepth::U8);
    assert!(restored.rgb16.is_none());

    let bytes = restored.encode().unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn mismatched_depth_is_resized_to_image() {
    let dir = tempdir().unwrap();
    write_pair(dir.path(), "scene");
    let small = GrayImage::from_fn(SIDE / 2, SIDE / 2, |_, y| Luma([255 - (y * 10) as u8]));
    small.save(dir.path().join("small_depth.png")).unwrap();

    let restored = restore_to_buffer(
        &dir.path().join("scene.png"),
        &dir.path().join("small_depth.png"),
        &fast_params(),
    )
    .unwrap();
    assert_eq!((restored.width, restored.height), (SIDE as usize, SIDE as usize));
}

#[test]
fn batch_processes_pairs_and_skips_orphans() {
    let inputs = tempdir().unwrap();
    let depths = tempdir().unwrap();
    let outputs = tempdir().unwrap();

    for stem in ["a", "b"] {
        write_pair(inputs.path(), stem);
        std::fs::rename(
            inputs.path().join(format!("{stem}_depth.png")),
            depths.path().join(format!("{stem}.png")),
        )
        .unwrap();
    }
    write_pair(inputs.path(), "orphan");
    std::fs::remove_file(inputs.path().join("orphan_depth.png")).unwrap();
    std::fs::write(inputs.path().join("notes.txt"), "not an image").unwrap();

    let listed: Vec<_> = iterate_images(inputs.path()).unwrap().collect();
    assert_eq!(listed.len(), 3);

    let report = restore_directory_to_path(
        inputs.path(),
        depths.path(),
        outputs.path(),
        &fast_params(),
        true,
    )
    .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors, 0);
    assert!(outputs.path().join("a.png").exists());
    assert!(outputs.path().join("b.png").exists());
    assert!(!outputs.path().join("orphan.png").exists());
}

#[test]
fn batch_stops_on_first_error_unless_continuing() {
    let inputs = tempdir().unwrap();
    let depths = tempdir().unwrap();
    let outputs = tempdir().unwrap();

    write_pair(inputs.path(), "good");
    std::fs::rename(inputs.path().join("good_depth.png"), depths.path().join("good.png")).unwrap();
    std::fs::write(inputs.path().join("bad.png"), b"definitely not a png").unwrap();
    std::fs::write(depths.path().join("bad.png"), b"nor this").unwrap();

    let report = restore_directory_to_path(
        inputs.path(),
        depths.path(),
        outputs.path(),
        &fast_params(),
        true,
    )
    .unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.errors, 1);

    assert!(
        restore_directory_to_path(inputs.path(), depths.path(), outputs.path(), &fast_params(), false)
            .is_err()
    );
}
