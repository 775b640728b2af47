//! PNG/JPEG encoding with atomic file replacement.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};

use crate::rgb::RgbImage;

/// Output codec, chosen from the destination file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg { quality: u8 },
}

impl OutputFormat {
    /// `.jpg` and `.jpeg` (case-sensitive) select JPEG, everything else PNG.
    pub fn from_path(path: &Path, quality: u8) -> Self {
        let name = path.to_string_lossy();
        if name.ends_with(".jpg") || name.ends_with(".jpeg") {
            Self::Jpeg { quality }
        } else {
            Self::Png
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpeg",
        }
    }
}

/// Hidden temp file next to the destination, removed unless persisted.
struct TempOutput {
    temp: PathBuf,
    dest: PathBuf,
    persisted: bool,
}

impl TempOutput {
    fn create(dest: &Path) -> KmsgrabResult<(Self, File)> {
        let file_name = dest
            .file_name()
            .ok_or_else(|| KmsgrabError::encode(dest, "output path has no file name"))?;
        let temp_name = format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            std::process::id()
        );
        let temp = match dest.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(temp_name),
            _ => PathBuf::from(temp_name),
        };

        let file = File::create(&temp).map_err(|e| {
            KmsgrabError::encode(dest, format!("cannot create {}: {e}", temp.display()))
        })?;

        Ok((
            Self {
                temp,
                dest: dest.to_path_buf(),
                persisted: false,
            },
            file,
        ))
    }

    fn persist(mut self) -> KmsgrabResult<()> {
        std::fs::rename(&self.temp, &self.dest)
            .map_err(|e| KmsgrabError::encode(&self.dest, format!("rename failed: {e}")))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        if !self.persisted {
            if let Err(e) = std::fs::remove_file(&self.temp) {
                tracing::debug!(path = %self.temp.display(), error = %e, "Temp output not removed");
            }
        }
    }
}

/// Encode `image` and atomically place it at `path`.
pub fn encode(image: &RgbImage, path: &Path, format: OutputFormat) -> KmsgrabResult<()> {
    let (guard, file) = TempOutput::create(path)?;
    let mut writer = BufWriter::new(file);

    let (width, height) = image.dimensions();
    let written = match format {
        OutputFormat::Png => PngEncoder::new(&mut writer).write_image(
            image.as_bytes(),
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
        OutputFormat::Jpeg { quality } => JpegEncoder::new_with_quality(&mut writer, quality)
            .write_image(image.as_bytes(), width, height, ExtendedColorType::Rgb8),
    };
    written.map_err(|e| KmsgrabError::encode(path, e.to_string()))?;

    let file = writer
        .into_inner()
        .map_err(|e| KmsgrabError::encode(path, format!("flush failed: {}", e.error())))?;
    file.sync_all()
        .map_err(|e| KmsgrabError::encode(path, format!("sync failed: {e}")))?;
    drop(file);

    guard.persist()?;

    tracing::debug!(
        path = %path.display(),
        format = format.name(),
        width,
        height,
        "Encoded image"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> RgbImage {
        let mut image = RgbImage::try_new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                image.put_pixel(x, y, [v, v / 2, 255 - v]);
            }
        }
        image
    }

    #[test]
    fn test_format_from_suffix() {
        assert_eq!(
            OutputFormat::from_path(Path::new("shot.jpg"), 80),
            OutputFormat::Jpeg { quality: 80 }
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("/tmp/a.jpeg"), 90),
            OutputFormat::Jpeg { quality: 90 }
        );
        assert_eq!(OutputFormat::from_path(Path::new("shot.png"), 90), OutputFormat::Png);
        assert_eq!(OutputFormat::from_path(Path::new("shot.JPG"), 90), OutputFormat::Png);
        assert_eq!(OutputFormat::from_path(Path::new("shot"), 90), OutputFormat::Png);
        assert_eq!(
            OutputFormat::from_path(Path::new("shot.jpg.png"), 90),
            OutputFormat::Png
        );
    }

    #[test]
    fn test_png_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let image = checkerboard(6, 4);

        encode(&image, &path, OutputFormat::Png).unwrap();

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (6, 4));
        assert_eq!(decoded.as_raw().as_slice(), image.as_bytes());
    }

    #[test]
    fn test_jpeg_decodes_to_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");

        encode(&checkerboard(17, 9), &path, OutputFormat::Jpeg { quality: 75 }).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (17, 9));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        encode(&checkerboard(2, 2), &path, OutputFormat::Png).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.png")]);
    }

    #[test]
    fn test_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"stale").unwrap();

        encode(&checkerboard(3, 3), &path, OutputFormat::Png).unwrap();

        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn test_missing_directory_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.png");

        let err = encode(&checkerboard(2, 2), &path, OutputFormat::Png).unwrap_err();
        assert!(matches!(err, KmsgrabError::Encode { .. }));
        assert!(!path.exists());
    }
}
