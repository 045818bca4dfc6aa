//! Gateway to the remote generative-content API.
//!
//! Four independent request shapes: contextual chat, initial
//! suggestions, image generation/editing, and two-phase book
//! generation, plus the login probe. Stateless between calls; every
//! call site constructs a client from the current credential.

pub mod book;
pub mod chat;
pub mod error;
pub mod gemini;
pub mod image;

pub use error::GatewayError;
pub use gemini::GeminiClient;
