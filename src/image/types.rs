//! Core types for image intake and transformation.

use crate::error::{PlushyError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Prefix of every transformation result data URI.
pub const RESULT_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// File name offered when downloading a result.
pub const DEFAULT_DOWNLOAD_NAME: &str = "plushy-world.png";

/// Content type assumed for files whose extension is not an image type.
const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// Image formats recognised when inspecting payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
    /// GIF format.
    Gif,
    /// BMP format.
    Bmp,
    /// TIFF format.
    Tiff,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        if data.starts_with(b"BM") {
            return Some(Self::Bmp);
        }

        if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
            return Some(Self::Tiff);
        }

        None
    }
}

/// Maps a file extension to an image MIME type, decodable or not.
fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    if let Some(format) = ImageFormat::from_extension(ext) {
        return Some(format.mime_type());
    }

    match ext.to_ascii_lowercase().as_str() {
        "svg" => Some("image/svg+xml"),
        "avif" => Some("image/avif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "ico" => Some("image/x-icon"),
        "jxl" => Some("image/jxl"),
        _ => None,
    }
}

/// Where the bytes of a [`SourceFile`] live.
#[derive(Debug, Clone)]
enum FileContents {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A user-supplied file, before any decoding.
///
/// The declared content type is what intake checks; it is not sniffed from
/// the contents.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    content_type: String,
    contents: FileContents,
}

impl SourceFile {
    /// Creates a file backed by a path, declaring its type from the extension.
    ///
    /// Any image extension declares an `image/*` type, including formats such
    /// as SVG or HEIC that cannot be decoded. Those pass the type check and
    /// fail intake with [`PlushyError::LoadImage`].
    /// Unknown extensions are declared `application/octet-stream`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(content_type_for_extension)
            .unwrap_or(UNKNOWN_CONTENT_TYPE)
            .to_string();

        Self {
            name,
            content_type,
            contents: FileContents::Path(path),
        }
    }

    /// Creates a file from bytes already in memory (e.g. a drop or stdin).
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            contents: FileContents::Bytes(bytes),
        }
    }

    /// Returns the file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared content type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns true if the declared content type is an image type.
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Reads the file contents.
    pub(crate) async fn read(&self) -> Result<Cow<'_, [u8]>> {
        match &self.contents {
            FileContents::Path(path) => tokio::fs::read(path)
                .await
                .map(Cow::Owned)
                .map_err(PlushyError::ReadFile),
            FileContents::Bytes(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
        }
    }
}

/// A selected image after normalization, ready for display and upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Name of the file the image was selected from.
    pub name: String,
    /// Content type the file was declared with.
    pub content_type: String,
    /// Normalized encoded payload, base64 without a data URI prefix.
    pub base64: String,
    /// MIME type of the normalized payload.
    pub mime_type: String,
    /// Data URI of the normalized payload, for previews.
    pub preview_url: String,
    /// Normalized width in pixels.
    pub width: u32,
    /// Normalized height in pixels.
    pub height: u32,
}

impl SourceImage {
    /// Decodes the normalized payload back into raw encoded bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.base64)
            .map_err(|e| PlushyError::Decode(e.to_string()))
    }

    /// Builds a transformation request for this image.
    pub fn request(&self, instruction: impl Into<String>) -> TransformationRequest {
        TransformationRequest::new(self.base64.clone(), self.mime_type.clone(), instruction)
    }
}

/// The outbound payload of a single transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationRequest {
    /// Image payload, base64 without a data URI prefix.
    pub image_base64: String,
    /// MIME type of the image payload.
    pub mime_type: String,
    /// Free-text instruction describing the transformation.
    pub instruction: String,
}

impl TransformationRequest {
    /// Creates a new request.
    pub fn new(
        image_base64: impl Into<String>,
        mime_type: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            image_base64: image_base64.into(),
            mime_type: mime_type.into(),
            instruction: instruction.into(),
        }
    }
}

/// A transformed image returned by the remote model.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "transformation result should be shown or saved"]
pub struct TransformationResult {
    /// Renderable data URI (`data:image/png;base64,...`).
    pub data_url: String,
    /// Model that produced the image.
    pub model: Option<String>,
    /// Round-trip duration in milliseconds.
    pub duration_ms: Option<u64>,
}

impl TransformationResult {
    /// Wraps a base64 image payload as a result data URI.
    pub fn from_base64(data: &str) -> Self {
        Self {
            data_url: format!("{RESULT_DATA_URI_PREFIX}{data}"),
            model: None,
            duration_ms: None,
        }
    }

    /// Returns the base64 payload without the data URI prefix.
    pub fn base64_payload(&self) -> &str {
        self.data_url
            .strip_prefix(RESULT_DATA_URI_PREFIX)
            .unwrap_or(&self.data_url)
    }

    /// Decodes the payload into raw image bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(self.base64_payload())
            .map_err(|e| PlushyError::Decode(e.to_string()))
    }

    /// Returns the format detected from the decoded bytes.
    ///
    /// The data URI always claims PNG; the model may return something else.
    pub fn detected_format(&self) -> Option<ImageFormat> {
        self.to_bytes()
            .ok()
            .and_then(|bytes| ImageFormat::from_magic_bytes(&bytes))
    }

    /// Saves the decoded image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"short"), None);
    }

    #[test]
    fn test_source_file_content_type_from_extension() {
        let file = SourceFile::from_path("/photos/Forest.JPEG");
        assert_eq!(file.name(), "Forest.JPEG");
        assert_eq!(file.content_type(), "image/jpeg");
        assert!(file.is_image());

        let file = SourceFile::from_path("notes.txt");
        assert_eq!(file.content_type(), "application/octet-stream");
        assert!(!file.is_image());

        let file = SourceFile::from_path("no_extension");
        assert!(!file.is_image());
    }

    #[test]
    fn test_undecodable_image_extensions_are_still_images() {
        let file = SourceFile::from_path("logo.SVG");
        assert_eq!(file.content_type(), "image/svg+xml");
        assert!(file.is_image());

        assert_eq!(SourceFile::from_path("a.avif").content_type(), "image/avif");
        assert_eq!(SourceFile::from_path("a.heic").content_type(), "image/heic");
        assert!(SourceFile::from_path("a.jxl").is_image());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_read_error() {
        let file = SourceFile::from_path("/definitely/not/here/mushroom.png");
        let err = file.read().await.unwrap_err();
        assert!(matches!(err, PlushyError::ReadFile(_)));
        assert_eq!(err.to_string(), "Failed to read file");
    }

    #[tokio::test]
    async fn test_read_in_memory_bytes() {
        let file = SourceFile::from_bytes("drop.png", "image/png", vec![1, 2, 3]);
        let bytes = file.read().await.unwrap();
        assert_eq!(&*bytes, &[1u8, 2, 3][..]);
    }

    #[test]
    fn test_result_data_url() {
        let result = TransformationResult::from_base64("iVBORw0KGgo=");
        assert_eq!(result.data_url, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(result.base64_payload(), "iVBORw0KGgo=");
    }

    #[test]
    fn test_result_decodes_and_detects_format() {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(JPEG_MAGIC);
        let result = TransformationResult::from_base64(&encoded);
        assert_eq!(result.to_bytes().unwrap(), JPEG_MAGIC.to_vec());
        assert_eq!(result.detected_format(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_result_invalid_base64() {
        let result = TransformationResult::from_base64("not base64!!");
        assert!(matches!(result.to_bytes(), Err(PlushyError::Decode(_))));
        assert_eq!(result.detected_format(), None);
    }

    #[test]
    fn test_source_image_request() {
        let source = SourceImage {
            name: "a.png".into(),
            content_type: "image/png".into(),
            base64: "QUJD".into(),
            mime_type: "image/jpeg".into(),
            preview_url: "data:image/jpeg;base64,QUJD".into(),
            width: 1,
            height: 1,
        };
        let request = source.request("make it fluffy");
        assert_eq!(request.image_base64, "QUJD");
        assert_eq!(request.mime_type, "image/jpeg");
        assert_eq!(request.instruction, "make it fluffy");
        assert_eq!(source.to_bytes().unwrap(), b"ABC".to_vec());
    }
}
