//! Text extraction for binary documents (PDF, DOCX).
//!
//! The ingester hands over raw bytes and the file extension; this module
//! returns plain UTF-8 text ready for metadata extraction and chunking.

use std::io::Read;

use quick_xml::events::Event;

use crate::error::ExtractError;

/// Maximum decompressed bytes read from `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// True if files with `extension` (lowercase, without dot) go through [`extract_text`].
pub fn needs_extraction(extension: &str) -> bool {
    matches!(extension, "pdf" | "docx")
}

/// Extract plain text from `bytes` of a file with the given extension.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    document_xml_text(&xml)
}

/// Collect `w:t` runs, one paragraph per `w:p`, separated by blank lines.
fn document_xml_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = std::mem::take(&mut current);
                    if !para.trim().is_empty() {
                        paragraphs.push(para);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file(
                    "word/document.xml",
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extract_text(b"foo", "odt").unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[test]
    fn test_invalid_pdf() {
        let err = extract_text(b"not a pdf", "pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_docx_zip() {
        let err = extract_text(b"not a zip", "docx").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_docx_paragraphs() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Jane Doe</w:t></w:r></w:p>
<w:p><w:r><w:t>Senior </w:t></w:r><w:r><w:t>Engineer &amp; Lead</w:t></w:r></w:p>
<w:p></w:p>
</w:body>
</w:document>"#;
        let text = extract_text(&docx_with(xml), "docx").unwrap();
        assert_eq!(text, "Jane Doe\n\nSenior Engineer & Lead");
    }

    #[test]
    fn test_needs_extraction() {
        assert!(needs_extraction("pdf"));
        assert!(needs_extraction("docx"));
        assert!(!needs_extraction("txt"));
    }
}
