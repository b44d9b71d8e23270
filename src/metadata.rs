//! Document reading and document-level metadata.
//!
//! [`read_document`] turns a file on disk into text: PDF and DOCX go through
//! [`crate::extract`], everything else is decoded with the first encoding in
//! [`TextEncoding::FALLBACK_ORDER`] that yields non-blank text.
//!
//! [`MetadataExtractor`] derives the flat metadata map stored with every
//! chunk of a document: file facts, the sha256 content hash used for change
//! detection, counts, an inferred [`DocumentType`], and a few best-effort
//! content signals (code-likeness, structured data, language).

use std::path::Path;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::extract;
use crate::models::{fields, DocumentType, Metadata};

const PROCESSOR_VERSION: &str = "1.0";

const CODE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".java", ".cpp", ".c", ".h", ".cs", ".php", ".rb", ".go", ".rs",
];

/// Substrings that suggest source code. Matched against lowercased content,
/// so the SQL keywords only fire through their lowercase form.
const CODE_INDICATORS: &[&str] = &[
    "def ",
    "function ",
    "class ",
    "import ",
    "from ",
    "#include",
    "public class",
    "private ",
    "protected ",
    "#!/",
    "<?php",
    "<script",
    "select ",
    "insert ",
    "update ",
];

const RESUME_KEYWORDS: &[&str] = &["experience", "education", "skills", "employment"];

const ENGLISH_FUNCTION_WORDS: &[&str] = &[
    "the", "and", "for", "are", "with", "have", "this", "that", "from",
];

/// Text encodings tried when decoding a plain-text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16,
    Latin1,
    Windows1252,
}

impl TextEncoding {
    pub const FALLBACK_ORDER: [TextEncoding; 4] = [
        TextEncoding::Utf8,
        TextEncoding::Utf16,
        TextEncoding::Latin1,
        TextEncoding::Windows1252,
    ];

    /// Decode `bytes`, or `None` if they are not valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                // ASCII in BOM-less UTF-16 is also valid UTF-8
                if utf16_order_without_bom(bytes).is_some() {
                    return None;
                }
                UTF_8
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .map(|text| text.into_owned())
            }
            TextEncoding::Utf16 => decode_utf16(bytes),
            // 0x80..=0x9F are C1 controls in Latin-1; leave those to Windows-1252.
            TextEncoding::Latin1 => {
                if bytes.iter().any(|b| (0x80..=0x9F).contains(b)) {
                    None
                } else {
                    Some(encoding_rs::mem::decode_latin1(bytes).into_owned())
                }
            }
            TextEncoding::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }
}

/// UTF-16 by BOM, or BOM-less when the NUL pattern of ASCII-heavy text
/// gives the byte order away.
fn decode_utf16(bytes: &[u8]) -> Option<String> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((enc, len)) if enc == UTF_16LE || enc == UTF_16BE => (enc, &bytes[len..]),
        Some(_) => return None,
        None => (utf16_order_without_bom(bytes)?, bytes),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
}

fn utf16_order_without_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.len() / 2;
    let high_nuls = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let low_nuls = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
    if high_nuls * 2 >= units && low_nuls == 0 {
        Some(UTF_16LE)
    } else if low_nuls * 2 >= units && high_nuls == 0 {
        Some(UTF_16BE)
    } else {
        None
    }
}

/// Decode raw bytes with the fallback encodings; first non-blank result wins.
pub fn decode_text(bytes: &[u8]) -> Option<(String, TextEncoding)> {
    TextEncoding::FALLBACK_ORDER.iter().find_map(|enc| {
        enc.decode(bytes)
            .filter(|text| !text.trim().is_empty())
            .map(|text| (text, *enc))
    })
}

/// Lowercased extension with a leading dot (`".txt"`), or empty.
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Read a document from disk as text.
///
/// Fails if the file cannot be read, binary extraction fails, or no
/// supported encoding yields non-blank text.
pub fn read_document(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let ext = dotted_extension(path);
    let ext = ext.trim_start_matches('.');
    if extract::needs_extraction(ext) {
        let text = extract::extract_text(&bytes, ext)
            .with_context(|| format!("Failed to extract text from {}", path.display()))?;
        if text.trim().is_empty() {
            bail!("No text extracted from {}", path.display());
        }
        return Ok(text);
    }

    match decode_text(&bytes) {
        Some((text, encoding)) => {
            tracing::debug!(path = %path.display(), ?encoding, "decoded document");
            Ok(text)
        }
        None => bail!(
            "Could not read {} with any supported encoding",
            path.display()
        ),
    }
}

/// Strip trailing whitespace per line and collapse runs of blank lines.
pub fn clean_text(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if !line.trim().is_empty() {
            lines.push(line.trim_end());
        } else if lines.last().is_some_and(|l| !l.is_empty()) {
            lines.push("");
        }
    }
    lines.join("\n")
}

/// Lowercase hex sha256 of `content`.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Derives document-level metadata from a file and its decoded content.
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Build the metadata for `path` with decoded `content`.
    ///
    /// Entries in `user_metadata` are applied last and override anything
    /// derived here.
    pub fn extract(
        &self,
        path: &Path,
        content: &str,
        user_metadata: Option<&Metadata>,
    ) -> Result<Metadata> {
        let stat = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let now = Utc::now().timestamp();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let char_count = content.chars().count();

        let mut meta = Metadata::new();
        meta.insert(fields::FILENAME.into(), json!(filename));
        meta.insert(fields::FILEPATH.into(), json!(path.display().to_string()));
        meta.insert(fields::FILE_EXTENSION.into(), json!(dotted_extension(path)));
        meta.insert(fields::FILE_SIZE.into(), json!(char_count));
        meta.insert(fields::FILE_SIZE_BYTES.into(), json!(stat.len()));
        meta.insert(fields::SOURCE_FILE_HASH.into(), json!(content_hash(content)));

        meta.insert(fields::INGESTION_TIME.into(), json!(now));
        meta.insert(
            fields::FILE_MODIFIED_TIME.into(),
            json!(unix_secs(stat.modified().ok())),
        );
        meta.insert(
            fields::FILE_CREATED_TIME.into(),
            json!(unix_secs(stat.created().ok().or(stat.modified().ok()))),
        );

        meta.insert(fields::CHARACTER_COUNT.into(), json!(char_count));
        meta.insert(
            fields::WORD_COUNT.into(),
            json!(content.split_whitespace().count()),
        );
        meta.insert(fields::LINE_COUNT.into(), json!(content.split('\n').count()));
        meta.insert(
            fields::PARAGRAPH_COUNT.into(),
            json!(content.split("\n\n").filter(|p| !p.trim().is_empty()).count()),
        );

        meta.insert(fields::IS_ORIGINAL_CONTENT.into(), json!(true));
        meta.insert(fields::CONTENT_MODIFIED.into(), json!(false));

        meta.insert(
            fields::DOCUMENT_TYPE.into(),
            json!(infer_document_type(path, content).as_str()),
        );
        let mime = mime_guess::from_path(path).first_or_text_plain().to_string();
        meta.insert(fields::MIME_TYPE.into(), json!(mime));

        meta.insert(fields::HAS_CODE.into(), json!(has_code(content)));
        meta.insert(
            fields::HAS_STRUCTURED_DATA.into(),
            json!(has_structured_data(content)),
        );
        meta.insert(fields::LANGUAGE.into(), json!(detect_language(content)));

        meta.insert(fields::PROCESSOR_VERSION.into(), json!(PROCESSOR_VERSION));
        meta.insert(fields::EXTRACTION_TIME.into(), json!(now));

        if let Some(user) = user_metadata {
            for (k, v) in user {
                meta.insert(k.clone(), v.clone());
            }
        }

        Ok(meta)
    }
}

fn unix_secs(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Filename keywords first, then extension, then content.
pub fn infer_document_type(path: &Path, content: &str) -> DocumentType {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let contains_any = |words: &[&str]| words.iter().any(|w| filename.contains(w));

    if contains_any(&["resume", "cv"]) {
        return DocumentType::Resume;
    }
    if contains_any(&["cover", "letter"]) {
        return DocumentType::CoverLetter;
    }
    if contains_any(&["project", "portfolio"]) {
        return DocumentType::Project;
    }
    if contains_any(&["profile", "work_history", "work history", "summary"]) {
        return DocumentType::Profile;
    }
    if filename.contains("readme") {
        return DocumentType::Documentation;
    }

    let ext = dotted_extension(path);
    if CODE_EXTENSIONS.contains(&ext.as_str()) {
        return DocumentType::Code;
    }
    match ext.as_str() {
        ".md" | ".rst" => return DocumentType::Documentation,
        ".txt" | ".doc" | ".docx" => return DocumentType::Document,
        _ => {}
    }

    if has_code(content) {
        return DocumentType::Code;
    }
    let lower = content.to_lowercase();
    if RESUME_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return DocumentType::Resume;
    }
    DocumentType::Document
}

pub fn has_code(content: &str) -> bool {
    let lower = content.to_lowercase();
    CODE_INDICATORS.iter().any(|i| lower.contains(i))
}

pub fn has_structured_data(content: &str) -> bool {
    let trimmed = content.trim();
    if (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('<') && trimmed.ends_with('>'))
    {
        return true;
    }
    if content.contains(',') && content.contains('\n') && content.split(',').count() > 5 {
        return true;
    }
    content.matches('|').count() > 5 && content.matches('\n').count() > 2
}

/// `"english"` when common English function words dominate the first 100
/// words, otherwise `"unknown"`.
pub fn detect_language(content: &str) -> &'static str {
    let words: Vec<String> = content
        .split_whitespace()
        .take(100)
        .map(|w| w.to_lowercase())
        .collect();
    if words.len() < 10 {
        return "unknown";
    }
    let hits = words
        .iter()
        .filter(|w| ENGLISH_FUNCTION_WORDS.contains(&w.as_str()))
        .count();
    if hits > 5 {
        "english"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_decode_utf8() {
        let (text, enc) = decode_text("résumé".as_bytes()).unwrap();
        assert_eq!(text, "résumé");
        assert_eq!(enc, TextEncoding::Utf8);
    }

    #[test]
    fn test_decode_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hello".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, enc) = decode_text(&bytes).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(enc, TextEncoding::Utf16);
    }

    fn utf16_bytes(text: &str, little_endian: bool) -> Vec<u8> {
        text.encode_utf16()
            .flat_map(|unit| {
                if little_endian {
                    unit.to_le_bytes()
                } else {
                    unit.to_be_bytes()
                }
            })
            .collect()
    }

    #[test]
    fn test_decode_utf16_without_bom() {
        let (text, enc) = decode_text(&utf16_bytes("Résumé: senior engineer", true)).unwrap();
        assert_eq!(text, "Résumé: senior engineer");
        assert_eq!(enc, TextEncoding::Utf16);

        let (text, enc) = decode_text(&utf16_bytes("plain ascii notes", true)).unwrap();
        assert_eq!(text, "plain ascii notes");
        assert_eq!(enc, TextEncoding::Utf16);

        let (text, enc) = decode_text(&utf16_bytes("Skills: Rust", false)).unwrap();
        assert_eq!(text, "Skills: Rust");
        assert_eq!(enc, TextEncoding::Utf16);
    }

    #[test]
    fn test_even_length_latin1_is_not_utf16() {
        let (text, enc) = decode_text(b"na\xEFve caf\xE9").unwrap();
        assert_eq!(text, "naïve café");
        assert_eq!(enc, TextEncoding::Latin1);
    }

    #[test]
    fn test_decode_latin1_and_cp1252() {
        let (text, enc) = decode_text(b"caf\xE9").unwrap();
        assert_eq!(text, "café");
        assert_eq!(enc, TextEncoding::Latin1);

        let (text, enc) = decode_text(b"\x93quoted\x94").unwrap();
        assert_eq!(text, "“quoted”");
        assert_eq!(enc, TextEncoding::Windows1252);
    }

    #[test]
    fn test_decode_blank_is_none() {
        assert!(decode_text(b"   \n\t ").is_none());
    }

    #[test]
    fn test_clean_text() {
        let cleaned = clean_text("a  \n\n\n\nb\t\n   \nc");
        assert_eq!(cleaned, "a\n\nb\n\nc");
    }

    #[test]
    fn test_document_type_priority() {
        let p = |s: &str| PathBuf::from(s);
        assert_eq!(infer_document_type(&p("my_cv.pdf"), ""), DocumentType::Resume);
        assert_eq!(
            infer_document_type(&p("cover_letter.txt"), ""),
            DocumentType::CoverLetter
        );
        assert_eq!(
            infer_document_type(&p("portfolio.md"), ""),
            DocumentType::Project
        );
        assert_eq!(
            infer_document_type(&p("work_history.txt"), ""),
            DocumentType::Profile
        );
        assert_eq!(
            infer_document_type(&p("README.md"), ""),
            DocumentType::Documentation
        );
        assert_eq!(infer_document_type(&p("main.rs"), ""), DocumentType::Code);
        assert_eq!(
            infer_document_type(&p("guide.md"), "def foo(): pass"),
            DocumentType::Documentation
        );
        assert_eq!(
            infer_document_type(&p("notes.txt"), "Skills: Rust"),
            DocumentType::Document
        );
        assert_eq!(
            infer_document_type(&p("notes"), "Ten years of experience"),
            DocumentType::Resume
        );
        assert_eq!(
            infer_document_type(&p("script"), "import os"),
            DocumentType::Code
        );
        assert_eq!(
            infer_document_type(&p("notes"), "hello there"),
            DocumentType::Document
        );
    }

    #[test]
    fn test_content_signals() {
        assert!(has_code("#!/bin/sh\necho hi"));
        assert!(has_code("SELECT * FROM users"));
        assert!(!has_code("Plain prose about gardening."));

        assert!(has_structured_data("{\"a\": 1}"));
        assert!(has_structured_data("a,b,c\nd,e,f\ng,h,i\n"));
        assert!(has_structured_data("|a|b|\n|c|d|\n|e|f|\n"));
        assert!(!has_structured_data("Just a sentence."));
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language("too short"), "unknown");
        let english = "This is the summary of the work that I have done with the team and for the company";
        assert_eq!(detect_language(english), "english");
        let other = "uno dos tres cuatro cinco seis siete ocho nueve diez once doce";
        assert_eq!(detect_language(other), "unknown");
    }

    #[test]
    fn test_extract_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("resume_jane.txt");
        let content = "Jane Doe\n\nExperience at Acme.\nSkills: Rust";
        std::fs::write(&path, content).unwrap();

        let mut user = Metadata::new();
        user.insert("document_type".into(), json!("profile"));
        user.insert("owner".into(), json!("jane"));

        let meta = MetadataExtractor::new()
            .extract(&path, content, Some(&user))
            .unwrap();
        assert_eq!(meta["filename"], "resume_jane.txt");
        assert_eq!(meta["file_extension"], ".txt");
        assert_eq!(meta["source_file_hash"], json!(content_hash(content)));
        assert_eq!(meta["source_file_hash"].as_str().unwrap().len(), 64);
        assert_eq!(meta["is_original_content"], true);
        assert_eq!(meta["paragraph_count"], 2);
        assert_eq!(meta["line_count"], 4);
        assert_eq!(meta["mime_type"], "text/plain");
        // caller overrides win
        assert_eq!(meta["document_type"], "profile");
        assert_eq!(meta["owner"], "jane");
    }

    #[test]
    fn test_read_document_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(read_document(&tmp.path().join("nope.txt")).is_err());
    }
}
