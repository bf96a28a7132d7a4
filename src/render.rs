//! Rasterizing and Encoding - Composited SVG to Deflate TIFF

use std::fs::{self, File};
use std::io;
use std::path::Path;

use image::{imageops, Rgb, RgbImage, RgbaImage};
use resvg::{tiny_skia, usvg};
use serde::{Deserialize, Serialize};
use tiff::encoder::{colortype, compression::Deflate, TiffEncoder};
use tracing::{debug, info, warn};

use crate::pipeline::{PipelineError, PipelineResult};

/// Pixel rectangle `[x, y, width, height]`.
pub type PixelRect = [u32; 4];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSummary {
    pub canvas: [u32; 2],
    pub crop: PixelRect,
    pub size: [u32; 2],
}

/// Render `svg` at 1:1, crop away transparent borders and write `destination`.
///
/// The intermediate PNG and the input SVG are transient: both are removed
/// whether or not rendering succeeds.
pub fn render_to_tiff(
    svg: &Path,
    resources_dir: Option<&Path>,
    intermediate: &Path,
    destination: &Path,
) -> PipelineResult<RenderSummary> {
    let result = render_and_encode(svg, resources_dir, intermediate, destination);
    remove_transient(intermediate);
    remove_transient(svg);

    let summary = result?;
    info!(
        output = %destination.display(),
        width = summary.size[0],
        height = summary.size[1],
        "Rendered print artifact"
    );
    Ok(summary)
}

fn render_and_encode(
    svg: &Path,
    resources_dir: Option<&Path>,
    intermediate: &Path,
    destination: &Path,
) -> PipelineResult<RenderSummary> {
    let canvas = render_intermediate(svg, resources_dir, intermediate)?;

    let rgba = image::open(intermediate)
        .map_err(|e| PipelineError::EncodingFailed {
            path: intermediate.to_path_buf(),
            message: e.to_string(),
        })?
        .to_rgba8();

    let crop = opaque_bounds(&rgba).ok_or_else(|| PipelineError::EmptyRender { path: svg.to_path_buf() })?;
    let [x, y, w, h] = crop;
    let cropped = imageops::crop_imm(&rgba, x, y, w, h).to_image();
    debug!(?crop, ?canvas, "Cropped transparent border");

    encode_tiff(destination, &flatten_on_white(&cropped))?;

    Ok(RenderSummary {
        canvas,
        crop,
        size: [w, h],
    })
}

/// Render the SVG into a PNG at its intrinsic size.
fn render_intermediate(svg: &Path, resources_dir: Option<&Path>, intermediate: &Path) -> PipelineResult<[u32; 2]> {
    let data = fs::read(svg).map_err(|e| PipelineError::io(svg, e))?;

    let mut options = usvg::Options::default();
    options.resources_dir = resources_dir.map(Path::to_path_buf);
    options.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_data(&data, &options).map_err(|e| PipelineError::VectorParse {
        path: svg.to_path_buf(),
        message: e.to_string(),
    })?;

    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| PipelineError::EmptyRender { path: svg.to_path_buf() })?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    pixmap.save_png(intermediate).map_err(|e| PipelineError::EncodingFailed {
        path: intermediate.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!(width = size.width(), height = size.height(), "Rendered intermediate raster");

    Ok([size.width(), size.height()])
}

/// Bounding box of all pixels with non-zero alpha, `None` if there are none.
pub fn opaque_bounds(image: &RgbaImage) -> Option<PixelRect> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut any = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        any = true;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    any.then(|| [min_x, min_y, max_x - min_x + 1, max_y - min_y + 1])
}

/// Composite over white, dropping the alpha channel.
pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let alpha = u32::from(p[3]);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}

/// Write an RGB TIFF with Deflate compression. A partial file is removed on failure.
pub fn encode_tiff(path: &Path, image: &RgbImage) -> PipelineResult<()> {
    let write = || -> Result<(), tiff::TiffError> {
        let file = File::create(path)?;
        let mut encoder = TiffEncoder::new(file)?;
        encoder.write_image_with_compression::<colortype::RGB8, _>(
            image.width(),
            image.height(),
            Deflate::default(),
            image.as_raw(),
        )?;
        Ok(())
    };

    write().map_err(|e| {
        remove_transient(path);
        PipelineError::EncodingFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })
}

/// Remove a file that may already be gone.
pub(crate) fn remove_transient(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed transient file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove transient file"),
    }
}
