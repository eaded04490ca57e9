#![warn(missing_docs)]
//! Plushy - turn any image into a soft, hairy plush world.
//!
//! This crate normalizes a user-supplied image, sends it with a text
//! instruction to a Gemini image model, and hands back the transformed image.
//!
//! # Quick Start
//!
//! ```no_run
//! use plushy::{GeminiTransformer, Session, SourceFile};
//!
//! #[tokio::main]
//! async fn main() -> plushy::Result<()> {
//!     let transformer = GeminiTransformer::builder().build()?;
//!
//!     let mut session = Session::new();
//!     session.intake(&SourceFile::from_path("mushroom.jpg")).await?;
//!     session.generate(&transformer).await;
//!
//!     match session.result() {
//!         Some(result) => result.save("plushy-world.png")?,
//!         None => eprintln!("{}", session.error().unwrap_or_default()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! - [`image`]: intake and normalization (bounded size, white background,
//!   JPEG re-encode)
//! - [`transform`]: the remote transformation call
//! - [`session`]: the Idle / Loading / Success / Error state machine
//!
//! # Features
//!
//! - `cli` (default): the `plushy` command-line interface

mod error;

pub mod image;
pub mod session;
pub mod transform;

// Re-export error types at crate root
pub use error::{PlushyError, Result};

pub use crate::image::{
    ImageFormat, SourceFile, SourceImage, TransformationRequest, TransformationResult,
};
pub use crate::session::{AppState, Session, DEFAULT_INSTRUCTION};
pub use crate::transform::{GeminiModel, GeminiTransformer, GeminiTransformerBuilder, ImageTransformer};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{PlushyError, Result};
    pub use crate::image::{SourceFile, SourceImage, TransformationResult};
    pub use crate::session::{AppState, Session};
    pub use crate::transform::{GeminiTransformer, ImageTransformer};
}
