use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;

const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// A decoded, opaque result image and the file it was written to.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: DynamicImage,
    pub path: PathBuf,
}

/// Decodes remote bytes and persists them under unique names in the output directory.
#[derive(Debug, Clone)]
pub struct Materializer {
    output_dir: PathBuf,
}

impl Materializer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn ensure_output_dir(&self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.output_dir).map_err(|err| EngineError::io(&self.output_dir, err))
    }

    pub fn materialize(
        &self,
        bytes: &[u8],
        stem: &str,
        format: OutputFormat,
    ) -> Result<GeneratedImage, EngineError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|err| EngineError::Decode(err.to_string()))?;
        let image = flatten(decoded);
        let path = self.persist(&image, stem, format)?;
        info!(path = %path.display(), width = image.width(), height = image.height(), "image saved");
        Ok(GeneratedImage { image, path })
    }

    /// Re-encodes a caller's source image as an opaque JPEG ready for upload.
    pub fn stage_for_upload(&self, source: &Path) -> Result<PathBuf, EngineError> {
        if !source.is_file() {
            return Err(EngineError::Validation(format!(
                "Source image not found: {}",
                source.display()
            )));
        }
        let decoded = image::open(source).map_err(|err| {
            EngineError::Decode(format!("{}: {err}", source.display()))
        })?;
        self.persist(&flatten(decoded), "input", OutputFormat::Jpeg)
    }

    fn persist(
        &self,
        image: &DynamicImage,
        stem: &str,
        format: OutputFormat,
    ) -> Result<PathBuf, EngineError> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join(unique_name(stem, format));

        let mut buffer = Cursor::new(Vec::new());
        let encoded = match format {
            OutputFormat::Jpeg => image
                .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)),
            OutputFormat::Png => image.write_to(&mut buffer, ImageFormat::Png),
        };
        encoded.map_err(|err| EngineError::io(&path, std::io::Error::other(err)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| EngineError::io(&path, err))?;
        file.write_all(buffer.get_ref())
            .map_err(|err| EngineError::io(&path, err))?;
        Ok(path)
    }
}

/// Short hex digest used as the file stem for prompt-driven results.
pub fn prompt_stem(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..8])
}

fn unique_name(stem: &str, format: OutputFormat) -> String {
    let stem: String = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        if stem.is_empty() { "image" } else { stem.as_str() },
        Utc::now().timestamp_millis(),
        &token[..8],
        format.extension()
    )
}

fn flatten(image: DynamicImage) -> DynamicImage {
    if matches!(image, DynamicImage::ImageRgb8(_)) {
        image
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}
