//! Front-matter parsing for Hugo-style markdown files.
//!
//! A file may open with a metadata block fenced by two lines consisting of
//! `---` alone:
//!
//! ```text
//! ---
//! title: On Epistemic Tools
//! author: Jane Doe
//! date: 2024-03-01
//! url: /posts/epistemic-tools/
//! ---
//! Body text starts here.
//! ```
//!
//! Recognized keys are `title`, `author`, `date` and `url`; anything else in
//! the block is ignored. Without two fences the whole file is body text.

use std::path::Path;

use crate::error::Result;
use crate::models::NewDocument;

const FENCE: &str = "---";

/// Parse raw file text into a [`NewDocument`].
///
/// Never fails: malformed or missing front matter yields empty metadata and
/// the full input as content.
pub fn parse_front_matter(raw: &str) -> NewDocument {
    let lines: Vec<&str> = raw.split('\n').collect();

    let mut fences = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim() == FENCE)
        .map(|(i, _)| i);

    let (start, end) = match (fences.next(), fences.next()) {
        (Some(start), Some(end)) => (start, end),
        _ => return NewDocument::from_content(raw),
    };

    let mut doc = NewDocument::default();
    for line in &lines[start + 1..end] {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = unquote(value.trim());
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "title" => doc.title = Some(value.to_string()),
            "author" => doc.author = Some(value.to_string()),
            "date" => doc.publication_date = Some(value.to_string()),
            "url" => doc.url = Some(value.to_string()),
            _ => {}
        }
    }

    doc.content = lines[end + 1..].join("\n");
    doc
}

/// Read a file from disk and parse it, recording its path.
pub fn load_document(path: &Path) -> Result<NewDocument> {
    let raw = std::fs::read_to_string(path)?;
    let mut doc = parse_front_matter(&raw);
    doc.file_path = Some(path.display().to_string());
    Ok(doc)
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
