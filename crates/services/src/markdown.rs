//! Lightweight markdown-to-HTML renderer for exported chapters.
//!
//! Handles the subset of markdown that AI models actually produce:
//! - `# Heading` through `#### Heading`
//! - `**bold**`
//! - `- bullet` and `* bullet` list items
//! - `[text](url)` links
//! - `` `inline code` ``
//! - Paragraphs separated by blank lines

/// Render markdown text into an HTML fragment.
pub fn markdown_to_html(text: &str) -> String {
    let mut html = String::new();
    let mut in_list = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if in_list {
                html.push_str("</ul>\n");
                in_list = false;
            }
            continue;
        }

        // Headings
        let heading = [("#### ", "h4"), ("### ", "h3"), ("## ", "h2"), ("# ", "h1")]
            .iter()
            .find_map(|(prefix, tag)| trimmed.strip_prefix(prefix).map(|rest| (rest, *tag)));
        if let Some((rest, tag)) = heading {
            if in_list {
                html.push_str("</ul>\n");
                in_list = false;
            }
            html.push_str(&format!("<{tag}>{}</{tag}>\n", render_inline(rest)));
            continue;
        }

        // Bullet list items: "- text" or "* text" (at line start)
        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));
        if let Some(rest) = bullet {
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            html.push_str(&format!("<li>{}</li>\n", render_inline(rest)));
            continue;
        }

        if in_list {
            html.push_str("</ul>\n");
            in_list = false;
        }
        html.push_str(&format!("<p>{}</p>\n", render_inline(trimmed)));
    }

    if in_list {
        html.push_str("</ul>\n");
    }
    html
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render a single line with inline formatting: **bold**, `code`, [links](url).
fn render_inline(text: &str) -> String {
    let mut out = String::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        match find_next_marker(remaining) {
            None => {
                out.push_str(&escape(remaining));
                break;
            }
            Some((pos, MarkerKind::Bold)) => {
                out.push_str(&escape(&remaining[..pos]));
                remaining = &remaining[pos + 2..];
                if let Some(end) = remaining.find("**") {
                    out.push_str(&format!("<strong>{}</strong>", escape(&remaining[..end])));
                    remaining = &remaining[end + 2..];
                } else {
                    // No closing ** — emit as-is
                    out.push_str(&escape(&format!("**{remaining}")));
                    break;
                }
            }
            Some((pos, MarkerKind::Code)) => {
                out.push_str(&escape(&remaining[..pos]));
                remaining = &remaining[pos + 1..];
                if let Some(end) = remaining.find('`') {
                    out.push_str(&format!("<code>{}</code>", escape(&remaining[..end])));
                    remaining = &remaining[end + 1..];
                } else {
                    out.push_str(&escape(&format!("`{remaining}")));
                    break;
                }
            }
            Some((pos, MarkerKind::Link)) => {
                out.push_str(&escape(&remaining[..pos]));
                remaining = &remaining[pos + 1..];
                if let Some(close_bracket) = remaining.find("](") {
                    let link_text = &remaining[..close_bracket];
                    remaining = &remaining[close_bracket + 2..];
                    if let Some(close_paren) = remaining.find(')') {
                        let url = &remaining[..close_paren];
                        out.push_str(&format!(
                            "<a href=\"{}\">{}</a>",
                            escape(url),
                            escape(link_text)
                        ));
                        remaining = &remaining[close_paren + 1..];
                    } else {
                        // Malformed — emit as-is
                        out.push_str(&escape(&format!("[{link_text}](")));
                        break;
                    }
                } else {
                    out.push_str(&escape(&format!("[{remaining}")));
                    break;
                }
            }
        }
    }

    out
}

#[derive(Debug)]
enum MarkerKind {
    Bold, // **
    Code, // `
    Link, // [
}

/// Find the next inline marker in the text.
fn find_next_marker(text: &str) -> Option<(usize, MarkerKind)> {
    let mut best: Option<(usize, MarkerKind)> = None;

    if let Some(pos) = text.find("**") {
        best = Some((pos, MarkerKind::Bold));
    }
    if let Some(pos) = text.find('`') {
        if best.as_ref().map_or(true, |(b, _)| pos < *b) {
            best = Some((pos, MarkerKind::Code));
        }
    }
    if let Some(pos) = text.find('[') {
        // Only treat as link if followed by ]( somewhere
        if text[pos..].contains("](") && best.as_ref().map_or(true, |(b, _)| pos < *b) {
            best = Some((pos, MarkerKind::Link));
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headings_and_paragraphs() {
        let html = markdown_to_html("# Title\n\nSome **bold** text.\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<p>Some <strong>bold</strong> text.</p>"));
    }

    #[test]
    fn groups_bullets_into_one_list() {
        let html = markdown_to_html("- one\n- two\n\nafter");
        assert_eq!(html.matches("<ul>").count(), 1);
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains("<li>two</li>"));
        assert!(html.contains("<p>after</p>"));
    }

    #[test]
    fn renders_links_and_code() {
        let html = markdown_to_html("See [docs](https://example.com) and `code`.");
        assert!(html.contains("<a href=\"https://example.com\">docs</a>"));
        assert!(html.contains("<code>code</code>"));
    }

    #[test]
    fn escapes_html_in_source() {
        let html = markdown_to_html("a <script> & b");
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&amp;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn unclosed_bold_is_emitted_verbatim() {
        let html = markdown_to_html("**half open");
        assert!(html.contains("**half open"));
    }
}
