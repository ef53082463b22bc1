use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};

use crate::error::{GenerationError, Result};

/// Output format implied by the path's extension; PNG unless it says JPEG.
pub fn format_for_path(path: &Path) -> ImageFormat {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
        _ => ImageFormat::Png,
    }
}

/// Writes `image` to `path`, replacing any existing file.
pub fn save_image(image: &DynamicImage, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let format = format_for_path(path);
    let save_err = |message: String| GenerationError::Save {
        path: path.to_path_buf(),
        message,
    };

    let file = File::create(path).map_err(|e| save_err(e.to_string()))?;
    let mut writer = BufWriter::new(file);

    let written = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut writer, ImageFormat::Jpeg),
        _ => image.write_to(&mut writer, ImageFormat::Png),
    };
    written.map_err(|e| save_err(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| save_err(e.to_string()))?;

    log::info!("Saved image to {} as {:?}", path.display(), format);
    Ok(path.to_path_buf())
}
