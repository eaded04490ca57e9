//! Image transformer trait.

use crate::error::Result;
use crate::image::{TransformationRequest, TransformationResult};
use async_trait::async_trait;

/// Trait for remote models that transform an image according to an instruction.
///
/// Implementations issue exactly one remote call per [`transform`] and never
/// retry.
///
/// [`transform`]: ImageTransformer::transform
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    /// Transforms the request's image, returning a single result image.
    async fn transform(&self, request: &TransformationRequest) -> Result<TransformationResult>;

    /// Returns the model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Returns the name of this transformer for display.
    fn name(&self) -> &str {
        self.model()
    }

    /// Checks if the remote model is reachable and the credential accepted.
    async fn health_check(&self) -> Result<()>;
}
