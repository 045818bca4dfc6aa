//! Generated book types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub content: String,
}

/// A generated book: created wholesale by one generation cycle and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub chapters: Vec<Chapter>,
}
