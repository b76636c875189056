pub mod classifier;
pub mod credential;
pub mod gemini;
pub mod image_preprocessor;
pub mod prompt;
pub mod utils;
pub mod verdict;
