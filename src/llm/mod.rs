//! Text generation backends.

pub mod gemini;

pub use gemini::{ContextMessage, GeminiClient, GeminiError, TextGenerator};
