//! Transforms an image into a plush world and saves the result.
//!
//! Run with: `cargo run --example transform_image -- <input_image>`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use plushy::{AppState, GeminiTransformer, Session, SourceFile};

#[tokio::main]
async fn main() -> plushy::Result<()> {
    let input_path = std::env::args()
        .nth(1)
        .expect("Usage: transform_image <input_image>");

    let transformer = GeminiTransformer::builder().build()?;

    let mut session = Session::new();
    session.intake(&SourceFile::from_path(&input_path)).await?;

    if let Some(source) = session.source() {
        println!("Normalized to {}x{}", source.width, source.height);
    }

    match session.generate(&transformer).await {
        Some(AppState::Success) => {
            if let Some(result) = session.result() {
                result.save(plushy::image::DEFAULT_DOWNLOAD_NAME)?;
                println!("Saved {}", plushy::image::DEFAULT_DOWNLOAD_NAME);
            }
        }
        _ => eprintln!("Failed: {}", session.error().unwrap_or("unknown error")),
    }

    Ok(())
}
