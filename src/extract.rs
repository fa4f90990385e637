use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::ExtractError;
use crate::library::NewBook;

const METADATA_SCAN_LINES: usize = 20;
pub const UNKNOWN_AUTHOR: &str = "Unknown";
pub const PASTED_TITLE: &str = "Pasted text";

const TEXT_TYPES: &[&str] = &["txt", "text", "md"];
const BINARY_TYPES: &[&str] = &["pdf", "epub", "docx", "doc"];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\n{3,}")
}

fn horizontal_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"[ \t]{2,}")
}

fn title_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)^title:\s*(.+)$")
}

fn author_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)^(?:author|by):\s*(.+)$")
}

/// Normalize line endings, collapse blank-line runs and horizontal whitespace, then trim
pub fn clean_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = blank_lines().replace_all(&text, "\n\n");
    let text = horizontal_runs().replace_all(&text, " ");
    text.trim().to_string()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Look for `Title:` and `Author:`/`By:` headers near the top of a text
pub fn extract_metadata(text: &str) -> Metadata {
    let mut metadata = Metadata::default();
    for line in text.split('\n').take(METADATA_SCAN_LINES) {
        if let Some(caps) = title_line().captures(line) {
            metadata.title = Some(caps[1].trim().to_string());
        }
        if let Some(caps) = author_line().captures(line) {
            metadata.author = Some(caps[1].trim().to_string());
        }
    }
    metadata
}

/// Explicit title/author given by the user, taking precedence over anything detected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// A cleaned document ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub author: String,
    pub file_type: String,
    pub content: String,
    pub word_count: usize,
}

impl Document {
    pub fn into_new_book(self) -> NewBook {
        NewBook {
            title: self.title,
            author: self.author,
            file_type: self.file_type,
            content: self.content,
        }
    }
}

/// Clean raw text and resolve its title and author.
///
/// Title falls back from the override to a `Title:` header to `fallback_title`; author
/// from the override to an `Author:` header to "Unknown".
pub fn ingest_text(
    raw: &str,
    file_type: &str,
    overrides: &Overrides,
    fallback_title: &str,
) -> Result<Document, ExtractError> {
    let content = clean_text(raw);
    let word_count = count_words(&content);
    if word_count == 0 {
        return Err(ExtractError::Empty);
    }

    let metadata = extract_metadata(&content);
    let title = non_blank(overrides.title.clone())
        .or(metadata.title)
        .unwrap_or_else(|| fallback_title.to_string());
    let author = non_blank(overrides.author.clone())
        .or(metadata.author)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    Ok(Document {
        title,
        author,
        file_type: file_type.to_string(),
        content,
        word_count,
    })
}

pub fn ingest_pasted(raw: &str, overrides: &Overrides) -> Result<Document, ExtractError> {
    ingest_text(raw, "txt", overrides, PASTED_TITLE)
}

/// Read a document from disk. Only plain-text formats are understood.
pub fn load_document(path: &Path, overrides: &Overrides) -> Result<Document, ExtractError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if BINARY_TYPES.contains(&extension.as_str()) {
        return Err(ExtractError::Unsupported(extension));
    }
    if !TEXT_TYPES.contains(&extension.as_str()) {
        let shown = if extension.is_empty() {
            "(none)".to_string()
        } else {
            extension
        };
        return Err(ExtractError::Unsupported(shown));
    }

    let raw = fs::read_to_string(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| PASTED_TITLE.to_string());

    let document = ingest_text(&raw, &extension, overrides, &stem)?;
    tracing::debug!(
        path = %path.display(),
        words = document.word_count,
        title = %document.title,
        "loaded document"
    );
    Ok(document)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
