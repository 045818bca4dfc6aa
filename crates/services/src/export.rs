//! Book export: one self-contained HTML document per book.

use anyhow::{Context, Result};
use shared::book::Book;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::markdown::markdown_to_html;

/// Download-style filename for a book: title with whitespace collapsed
/// to underscores.
pub fn export_filename(title: &str) -> String {
    let stem: String = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    let stem = if stem.is_empty() { "book".to_string() } else { stem };
    format!("{stem}.html")
}

/// Render the whole book as a single HTML document with inline styles.
pub fn book_to_html(book: &Book) -> String {
    let mut body = String::new();
    for chapter in &book.chapters {
        body.push_str(&format!(
            "<section>\n<h2>{}</h2>\n{}</section>\n",
            escape_title(&chapter.title),
            markdown_to_html(&chapter.content)
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>\n\
         body {{ font-family: Georgia, serif; max-width: 46em; margin: 2em auto; \
         padding: 0 1em; line-height: 1.6; color: #222; }}\n\
         h1 {{ font-size: 2.2em; }}\n\
         section {{ margin-bottom: 3em; }}\n\
         code {{ background: #f0f0f0; padding: 0.1em 0.3em; border-radius: 3px; }}\n\
         </style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n",
        title = escape_title(&book.title),
        body = body,
    )
}

fn escape_title(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Write the exported document next to wherever the caller wants it and
/// return the full path.
pub fn write_export(book: &Book, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(export_filename(&book.title));
    fs::write(&path, book_to_html(book))
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "book exported");
    Ok(path)
}
