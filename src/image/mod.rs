//! Image intake, normalization and the request/result types.

mod normalize;
mod types;

pub use normalize::{
    decode, encode_jpeg, intake, normalize, render_on_white, target_dimensions, NormalizedImage,
    JPEG_QUALITY, MAX_DIMENSION, NORMALIZED_MIME_TYPE,
};
pub use types::{
    ImageFormat, SourceFile, SourceImage, TransformationRequest, TransformationResult,
    DEFAULT_DOWNLOAD_NAME, RESULT_DATA_URI_PREFIX,
};
