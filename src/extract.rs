//! Document text extraction (PDF, OOXML, plain text).
//!
//! Format dispatch happens once, here, by file extension. Everything past
//! this boundary sees an [`ExtractedDocument`]: the full text plus ordered
//! page segments (PDF pages, slides, worksheets, form-feed pages).

use std::io::Read;
use std::path::Path;

use crate::error::ExtractionError;
use crate::models::ExtractedDocument;

/// Extensions the corpus walk treats as documents. `doc` and `xls` are
/// counted as corpus members but fail extraction with a per-file error.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "txt", "xlsx", "xls", "pptx"];

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type OoxmlArchive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// Turns a file on disk into text. Implementations must not panic on bad input.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError>;
}

/// Lower-case extension of `path`, if any.
pub fn file_type(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    file_type(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// The built-in extractor for every supported format.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl Extractor for DocumentExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let ext = file_type(path).unwrap_or_default();
        if matches!(ext.as_str(), "doc" | "xls") {
            return Err(ExtractionError::LegacyFormat(path.display().to_string()));
        }
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ExtractionError::Unsupported(path.display().to_string()));
        }

        let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        extract_bytes(&bytes, &ext)
    }
}

/// Extract from in-memory bytes given a lower-case extension.
pub fn extract_bytes(bytes: &[u8], ext: &str) -> Result<ExtractedDocument, ExtractionError> {
    match ext {
        "txt" => Ok(extract_txt(bytes)),
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "pptx" => extract_pptx(bytes),
        "xlsx" => extract_xlsx(bytes),
        "doc" | "xls" => Err(ExtractionError::LegacyFormat(format!(".{}", ext))),
        other => Err(ExtractionError::Unsupported(format!(".{}", other))),
    }
}

fn extract_txt(bytes: &[u8]) -> ExtractedDocument {
    let text = String::from_utf8_lossy(bytes);
    if text.contains('\x0c') {
        ExtractedDocument::from_pages(text.split('\x0c').map(str::to_string).collect())
    } else {
        ExtractedDocument::from_text(text.into_owned())
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    Ok(ExtractedDocument::from_pages(pages))
}

fn open_archive(bytes: &[u8]) -> Result<OoxmlArchive<'_>, ExtractionError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractionError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut OoxmlArchive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractionError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractionError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractionError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractionError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Entry names matching `<prefix><n>.xml`, ordered by `n`.
fn numbered_entries(archive: &OoxmlArchive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let text = extract_paragraph_text(&xml, "\n\n")?;
    Ok(ExtractedDocument::from_text(text.trim_end().to_string()))
}

fn extract_pptx(bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        slides.push(extract_paragraph_text(&xml, "\n")?.trim_end().to_string());
    }
    Ok(ExtractedDocument::from_pages(slides))
}

/// Collect `<*:t>` runs, emitting `paragraph_sep` at the end of each `<*:p>`.
/// Works for both WordprocessingML (`w:`) and DrawingML (`a:`).
fn extract_paragraph_text(xml: &[u8], paragraph_sep: &str) -> Result<String, ExtractionError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" if !out.is_empty() && !out.ends_with(paragraph_sep) => {
                    out.push_str(paragraph_sep)
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let mut sheets = Vec::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        sheets.push(extract_sheet_rows(&xml, &shared_strings)?);
    }
    Ok(ExtractedDocument::from_pages(sheets))
}

fn read_shared_strings(archive: &mut OoxmlArchive<'_>) -> Result<Vec<String>, ExtractionError> {
    use quick_xml::events::Event;

    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// One line per row, cells separated by tabs. Shared-string cells are
/// resolved; inline strings and literal values are kept as written.
fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractionError> {
    use quick_xml::events::Event;

    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut cell_is_shared_str = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    let cell = if cell_is_shared_str {
                        s.parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i))
                            .cloned()
                    } else {
                        Some(s.to_string())
                    };
                    if let Some(cell) = cell {
                        row.push(cell);
                        cell_count += 1;
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => cell_is_shared_str = false,
                b"row" if !row.is_empty() => rows.push(std::mem::take(&mut row).join("\t")),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }
    Ok(rows.join("\n"))
}
