#![doc = r#"
seathru: physics-based color restoration for underwater photographs.

Given an RGB photograph and a per-pixel depth map, the crate inverts the
underwater image formation model: it estimates and subtracts backscatter,
segments the scene into depth-coherent neighborhoods, estimates the local
illuminant, fits wideband attenuation coefficients against depth and finally
reconstructs and white-balances the scene. It powers the `seathru` CLI and can
be embedded in your own Rust applications.

Stability
---------
The public library API is experimental in initial releases and may evolve as
the crate stabilizes. Breaking changes can occur.

Add dependency
--------------
```toml
[dependencies]
seathru = "0.1"
```

Quick start: restore an image to a file
---------------------------------------
```rust,no_run
use std::path::Path;
use seathru::{restore_to_path, RestoreParams, OutputFormat, BitDepth};

fn main() -> seathru::Result<()> {
    let params = RestoreParams {
        format: OutputFormat::PNG,
        bit_depth: BitDepth::U16,
        size: Some(1024),
        sidecar: true,
        ..RestoreParams::default()
    };

    let restoration = restore_to_path(
        Path::new("/data/reef.jpg"),
        Path::new("/data/reef_depth.png"),
        Path::new("/out/reef.png"),
        &params,
    )?;
    for d in &restoration.diagnostics {
        eprintln!("{d}");
    }
    Ok(())
}
```

Restore in-memory to `RestoredImage`
------------------------------------
```rust,no_run
use std::path::Path;
use seathru::{restore_to_buffer, RestoreParams};

fn main() -> seathru::Result<()> {
    let img = restore_to_buffer(
        Path::new("/data/reef.jpg"),
        Path::new("/data/reef_depth.png"),
        &RestoreParams::default(),
    )?;
    let png_bytes = img.encode()?;
    println!("{}x{} -> {} bytes", img.width, img.height, png_bytes.len());
    Ok(())
}
```

Working with arrays
-------------------
```rust
use ndarray::{Array2, Array3};
use seathru::{run_pipeline, PipelineParams};

fn restore(image: &Array3<f64>, depths: &Array2<f64>) -> seathru::Result<Array3<f64>> {
    // `image` is (rows, cols, 3) in [0, 1]; `depths` is scene depth per pixel.
    let restoration = run_pipeline(image, depths, &PipelineParams::default())?;
    Ok(restoration.image)
}
```

Batch helpers
-------------
```rust,no_run
use std::path::Path;
use seathru::{restore_directory_to_path, RestoreParams};

fn main() -> seathru::Result<()> {
    let report = restore_directory_to_path(
        Path::new("/data/images"),
        Path::new("/data/depths"),
        Path::new("/out"),
        &RestoreParams::default(),
        true, // continue_on_error
    )?;

    println!("processed={} skipped={} errors={}", report.processed, report.skipped, report.errors);
    Ok(())
}
```

Error handling
--------------
All public functions return `seathru::Result<T>`; match on `seathru::Error` to
handle specific cases. Poor curve fits are not errors: they fall back to a
linear model and are reported as `Diagnostic`s on the `Restoration`.

```rust,no_run
use std::path::Path;
use seathru::{restore_to_path, Error, RestoreParams};

fn main() {
    let params = RestoreParams::default();
    match restore_to_path(Path::new("/a.png"), Path::new("/a_depth.png"), Path::new("/out.png"), &params) {
        Ok(_) => {}
        Err(Error::ShapeMismatch { image, depth }) => eprintln!("sizes differ: {image:?} vs {depth:?}"),
        Err(Error::Image(e)) => eprintln!("decode error: {e}"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`] - high-level, ergonomic entry points.
- [`core::processing`] - the individual restoration stages.
- [`types`] - enums and core types (e.g. `Channel`, `OutputFormat`, `DepthEncoding`).
- [`io`] - image/depth readers and PNG/JPEG/TIFF/JSON writers.
- [`error`] - crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use crate::core::params::{
    AttenuationParams, BackscatterParams, IlluminationParams, NeighborhoodParams, PipelineParams,
    RestoreParams,
};
pub use crate::core::processing::pipeline::{ChannelReport, Diagnostic, Restoration, run_pipeline};
pub use error::{Error, Result};
pub use types::{BitDepth, Channel, DepthEncoding, OutputFormat};

// Readers
pub use io::readers::{read_depth_map, read_rgb_image};

// Selected writer helpers
pub use io::writers::metadata::{RestorationMetadata, create_metadata_sidecar};
pub use io::writers::save_rgb_image;

// High-level API re-exports
pub use api::{
    BatchReport, RestoredImage, iterate_images, load_inputs, restore_arrays,
    restore_directory_to_path, restore_to_buffer, restore_to_path, save_restored,
};
