// src/extract/fragment.rs
use crate::utils::error::ExtractError;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};

// Decoded filings name their body fragments with this token; attachments
// and audit reports do not carry it.
const BODY_FILE_MARKER: &str = "honbun";

/// Finds the one body fragment under `dir` whose content carries an element
/// with a `name` attribute equal to `keyword` and non-empty text.
///
/// Zero matches is not an error here: the caller moves on to the next
/// keyword, or records the statement as absent. Two or more matches means
/// the filing layout is not self-consistent and extraction must not pick
/// one at random.
pub fn find_fragment(dir: &Path, keyword: &str) -> Result<Option<PathBuf>, ExtractError> {
    let selector = keyword_selector(dir, keyword)?;

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if !name.to_string_lossy().contains(BODY_FILE_MARKER) {
            continue;
        }
        if fragment_has_keyword_text(&path, &selector)? {
            candidates.push(path);
        }
    }

    match candidates.len() {
        0 => {
            tracing::debug!("no fragment matched keyword '{}' under {}", keyword, dir.display());
            Ok(None)
        }
        1 => Ok(candidates.pop()),
        _ => {
            for path in &candidates {
                tracing::error!("ambiguous fragment for keyword '{}': {}", keyword, path.display());
            }
            Err(ExtractError::Ambiguous {
                keyword: keyword.to_string(),
                candidates,
            })
        }
    }
}

fn fragment_has_keyword_text(path: &Path, selector: &Selector) -> Result<bool, ExtractError> {
    let body = std::fs::read_to_string(path)?;
    let doc = Html::parse_document(&body);
    Ok(doc
        .select(selector)
        .any(|el| el.text().any(|t| !t.trim().is_empty())))
}

pub(crate) fn keyword_selector(context: &Path, keyword: &str) -> Result<Selector, ExtractError> {
    Selector::parse(&format!(r#"[name="{}"]"#, keyword)).map_err(|e| {
        ExtractError::MalformedLayout {
            path: context.to_path_buf(),
            detail: format!("keyword '{}' is not selectable: {}", keyword, e),
        }
    })
}
