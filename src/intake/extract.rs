//! File-text extraction for uploads and the rule corpus
//!
//! - PDF: refuses encrypted files, otherwise `pdf-extract`, pages split on form feed
//! - Spreadsheets: every sheet as `--- Sheet: name ---` plus tab-separated rows
//! - HTML / XML / JSP: visible text nodes via `scraper`
//! - Sniffed binaries: unsupported
//! - Anything else: text in its detected encoding (UTF-8, EUC-KR, ...)

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use humansize::{format_size, BINARY};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Per-file upload limit
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "xml", "jsp", "xhtml"];
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm"];

/// Extract plain text from an uploaded file
pub fn extract(name: &str, bytes: &[u8]) -> EngineResult<String> {
    if bytes.len() > MAX_FILE_BYTES {
        return Err(EngineError::InputTooLarge {
            name: name.to_string(),
            size: format_size(bytes.len(), BINARY),
            limit: format_size(MAX_FILE_BYTES, BINARY),
        });
    }

    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let sniffed = infer::get(bytes);
    let guessed = mime_guess::from_path(name).first();

    debug!(
        "extract {}: ext={:?} sniffed={:?} guessed={:?}",
        name,
        ext,
        sniffed.map(|k| k.mime_type()),
        guessed.as_ref().map(|m| m.essence_str())
    );

    if ext == "pdf" || sniffed.map(|k| k.mime_type() == "application/pdf").unwrap_or(false) {
        return pdf_pages(name, bytes).map(|pages| pages.join("\n"));
    }

    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        return spreadsheet_text(name, bytes);
    }

    let is_markup = MARKUP_EXTENSIONS.contains(&ext.as_str())
        || guessed
            .as_ref()
            .map(|m| matches!(m.subtype().as_str(), "html" | "xml"))
            .unwrap_or(false);
    if is_markup {
        return Ok(markup_text(&decode_text(bytes)));
    }

    if let Some(kind) = sniffed {
        if kind.matcher_type() != infer::MatcherType::Text {
            return Err(EngineError::UnsupportedFormat {
                name: name.to_string(),
                detail: format!("binary content ({})", kind.mime_type()),
            });
        }
    }

    Ok(decode_text(bytes))
}

/// Decode text in its detected encoding; undecodable bytes become U+FFFD
pub fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.strip_prefix('\u{FEFF}').unwrap_or(text).to_string();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!("Text decoded as {} with replacement characters", used.name());
    } else {
        debug!("Text decoded as {}", used.name());
    }
    text.into_owned()
}

/// All sheets of an xlsx/xls workbook
fn spreadsheet_text(name: &str, bytes: &[u8]) -> EngineResult<String> {
    let decode_failure = |detail: String| EngineError::DecodeFailure {
        name: name.to_string(),
        detail,
    };

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| decode_failure(e.to_string()))?;

    let mut sheets = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| decode_failure(format!("sheet {}: {}", sheet, e)))?;
        sheets.push(sheet_text(&sheet, &range));
    }
    Ok(sheets.join("\n\n"))
}

fn sheet_text(sheet: &str, range: &Range<Data>) -> String {
    let rows: Vec<String> = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| cell.to_string())
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect();
    format!("--- Sheet: {} ---\n{}", sheet, rows.join("\n"))
}

/// Text of each PDF page, in order
pub fn pdf_pages(name: &str, bytes: &[u8]) -> EngineResult<Vec<String>> {
    if is_encrypted_pdf(bytes) {
        return Err(EngineError::DecryptionRequired {
            name: name.to_string(),
        });
    }

    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| EngineError::DecodeFailure {
        name: name.to_string(),
        detail: e.to_string(),
    })?;

    Ok(text.split('\u{000C}').map(str::to_string).collect())
}

/// An encrypted PDF declares `/Encrypt` in its trailer
fn is_encrypted_pdf(bytes: &[u8]) -> bool {
    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc.is_encrypted() || doc.trailer.get(b"Encrypt").is_ok(),
        // unreadable documents only count as encrypted when the last trailer says so
        Err(_) => trailer_declares_encryption(bytes),
    }
}

fn trailer_declares_encryption(bytes: &[u8]) -> bool {
    const TRAILER: &[u8] = b"trailer";
    const MARKER: &[u8] = b"/Encrypt";

    let Some(start) = bytes.windows(TRAILER.len()).rposition(|w| w == TRAILER) else {
        return false;
    };
    bytes[start..].windows(MARKER.len()).any(|w| w == MARKER)
}

/// Visible text of an HTML/XML document, one trimmed text node per line
pub fn markup_text(source: &str) -> String {
    let document = scraper::Html::parse_document(source);

    let lines: Vec<&str> = document
        .root_element()
        .descendants()
        .filter(|node| {
            !node
                .parent()
                .and_then(|p| p.value().as_element())
                .map(|e| matches!(e.name(), "script" | "style"))
                .unwrap_or(false)
        })
        .filter_map(|node| node.value().as_text())
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .collect();

    lines.join("\n")
}
