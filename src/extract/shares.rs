// src/extract/shares.rs
use crate::extract::fragment::keyword_selector;
use crate::extract::table::build_grid;
use crate::utils::error::ExtractError;
use scraper::Html;
use std::path::Path;

const TOTAL: char = '計';

/// Pulls the outstanding-share total out of the share-count table: the
/// column is located by the fiscal-year-end issuance header, the row by the
/// total label, and the cell at their intersection is the value. Either
/// label missing is fatal, there is no sensible fallback.
pub fn extract_share_count(path: &Path, keyword: &str) -> Result<String, ExtractError> {
    let body = std::fs::read_to_string(path)?;
    let doc = Html::parse_document(&body);
    let selector = keyword_selector(path, keyword)?;

    // column positions matter here, so blank cells are kept
    let grid = build_grid(&doc, &selector, false);
    if grid.is_empty() {
        return Err(ExtractError::MalformedLayout {
            path: path.to_path_buf(),
            detail: "no share-count table under keyword".to_string(),
        });
    }

    let column = grid
        .iter()
        .find_map(|row| row.iter().position(|cell| is_issuance_header(cell)))
        .ok_or_else(|| ExtractError::MalformedLayout {
            path: path.to_path_buf(),
            detail: "fiscal-year-end issuance header not found".to_string(),
        })?;

    let row = grid
        .iter()
        .position(|row| {
            row.iter()
                .any(|cell| cell.contains(TOTAL) && !cell.contains("会計"))
        })
        .ok_or_else(|| ExtractError::MalformedLayout {
            path: path.to_path_buf(),
            detail: "total row not found".to_string(),
        })?;

    grid[row]
        .get(column)
        .cloned()
        .ok_or_else(|| ExtractError::MalformedLayout {
            path: path.to_path_buf(),
            detail: format!("total row has no cell at column {}", column),
        })
}

/// The issuance header comes in several phrasings across annual and
/// quarterly filings; each variant is matched on its characteristic
/// character set rather than the exact string.
fn is_issuance_header(cell: &str) -> bool {
    let has = |parts: &[&str]| parts.iter().all(|p| cell.contains(p));
    has(&["事業", "年度", "末", "現在", "発行"])
        || has(&["当期", "末", "現在", "発行", "数"])
        || has(&["四半期", "末", "発行", "数"])
        || has(&["四半期", "末", "現在", "発行", "株"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const KEYWORD: &str = "jpcrp_cor:IssuedSharesTotalNumberOfSharesEtcTextBlock";

    fn fixture(rows: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0101010_honbun_s.htm");
        let html = format!(
            r#"<html><body><div name="{}"><table>{}</table></div></body></html>"#,
            KEYWORD, rows
        );
        std::fs::write(&path, html).unwrap();
        (dir, path)
    }

    #[test]
    fn intersects_issuance_column_with_total_row() {
        let (_dir, path) = fixture(
            "<tr><td>種類</td><td>事業年度末現在発行数（株）</td><td>上場金融商品取引所名</td></tr>
             <tr><td>普通株式</td><td>12,000,000</td><td>東京証券取引所</td></tr>
             <tr><td>計</td><td>12,345,678</td><td>―</td></tr>",
        );
        assert_eq!(extract_share_count(&path, KEYWORD).unwrap(), "12,345,678");
    }

    #[test]
    fn quarterly_header_variant_is_accepted() {
        let (_dir, path) = fixture(
            "<tr><td>種類</td><td>第３四半期会計期間末現在発行数（株）</td></tr>
             <tr><td>計</td><td>8,000,000</td></tr>",
        );
        assert_eq!(extract_share_count(&path, KEYWORD).unwrap(), "8,000,000");
    }

    #[test]
    fn accounting_period_label_is_not_the_total_row() {
        let (_dir, path) = fixture(
            "<tr><td>種類</td><td>事業年度末現在発行数（株）</td></tr>
             <tr><td>会計年度</td><td>1</td></tr>
             <tr><td>計</td><td>5,000</td></tr>",
        );
        assert_eq!(extract_share_count(&path, KEYWORD).unwrap(), "5,000");
    }

    #[test]
    fn missing_issuance_header_is_fatal() {
        let (_dir, path) = fixture(
            "<tr><td>種類</td><td>発行可能株式総数</td></tr>
             <tr><td>計</td><td>5,000</td></tr>",
        );
        let err = extract_share_count(&path, KEYWORD).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedLayout { .. }));
    }

    #[test]
    fn missing_total_row_is_fatal() {
        let (_dir, path) = fixture(
            "<tr><td>種類</td><td>事業年度末現在発行数（株）</td></tr>
             <tr><td>普通株式</td><td>5,000</td></tr>",
        );
        let err = extract_share_count(&path, KEYWORD).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedLayout { .. }));
    }
}
