//! Remote image transformation.

mod gemini;
mod provider;

pub use gemini::{GeminiModel, GeminiTransformer, GeminiTransformerBuilder, DEFAULT_BASE_URL};
pub use provider::ImageTransformer;
