//! HTML to Markdown conversion for fetched pages

use regex::Regex;
use std::sync::LazyLock;

use crate::error::RenderError;

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("EXCESS_NEWLINES: hardcoded regex is valid"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]+$").expect("BLANK_LINES: hardcoded regex is valid"));

/// Convert rendered HTML to cleaned Markdown on the blocking pool
///
/// # Errors
///
/// Returns `RenderError::Content` when conversion fails or the blocking task
/// is cancelled.
pub async fn html_to_markdown(html: String) -> Result<String, RenderError> {
    tokio::task::spawn_blocking(move || convert(&html))
        .await
        .map_err(|e| RenderError::Content(format!("markdown conversion task failed: {e}")))?
}

fn convert(html: &str) -> Result<String, RenderError> {
    let markdown = htmd::convert(html)
        .map_err(|e| RenderError::Content(format!("markdown conversion failed: {e}")))?;
    Ok(clean_markdown(&markdown))
}

/// Blank out whitespace-only lines, collapse runs of blank lines, trim
#[must_use]
pub fn clean_markdown(content: &str) -> String {
    let content = BLANK_LINES.replace_all(content, "");
    let content = EXCESS_NEWLINES.replace_all(&content, "\n\n");
    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_markdown_collapses_blank_runs() {
        let raw = "# Title\n\n\n\n   \nBody\t\n \t \n\n\nEnd\n\n";
        assert_eq!(clean_markdown(raw), "# Title\n\nBody\t\n\nEnd");
    }

    #[test]
    fn test_clean_markdown_keeps_indented_content() {
        let raw = "list:\n    code line\n";
        assert_eq!(clean_markdown(raw), "list:\n    code line");
    }

    #[tokio::test]
    async fn test_html_to_markdown() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>".to_string();
        let md = html_to_markdown(html).await.expect("converts");
        assert!(md.contains("Hello"));
        assert!(md.contains("World"));
        assert!(!md.contains("<p>"));
    }
}
