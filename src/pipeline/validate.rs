//! File validation: allow-listed types and per-kind size caps.
//!
//! A batch is validated as a unit. The first invalid file rejects the whole
//! selection, so the caller shows one message and adds nothing.

use crate::config::{IntakeConfig, MIB};
use crate::error::ValidationError;
use crate::pipeline::input::SourceFile;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image MIME types on the allow-list.
pub const IMAGE_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

/// The PDF MIME type.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// What a file is, as far as billing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Pdf,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Image => f.pad("image"),
            FileKind::Pdf => f.pad("pdf"),
        }
    }
}

/// Lower-case the MIME type, drop parameters, and fold known aliases.
pub fn normalize_mime(mime: &str) -> String {
    let base = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "application/x-pdf" => PDF_MIME_TYPE.to_string(),
        _ => base,
    }
}

/// Work out the kind of a file, ignoring the accept policy.
///
/// Some browsers report PDFs as `application/octet-stream` or leave the type
/// empty, so a `.pdf` name is enough on its own.
pub fn classify(name: &str, mime: &str) -> Option<FileKind> {
    let mime = normalize_mime(mime);
    if IMAGE_MIME_TYPES.contains(&mime.as_str()) {
        return Some(FileKind::Image);
    }
    if mime == PDF_MIME_TYPE || name.to_ascii_lowercase().ends_with(".pdf") {
        return Some(FileKind::Pdf);
    }
    None
}

/// The MIME type a file of `kind` is stored and uploaded with.
///
/// PDFs always get `application/pdf`, whatever the browser declared. Images
/// get the normalised declared type, which `classify` has already matched
/// against the allow-list.
pub fn canonical_mime(kind: FileKind, declared: &str) -> String {
    match kind {
        FileKind::Pdf => PDF_MIME_TYPE.to_string(),
        FileKind::Image => normalize_mime(declared),
    }
}

/// Validate one file against the configured allow-list and size caps.
pub fn validate_file(file: &SourceFile, config: &IntakeConfig) -> Result<FileKind, ValidationError> {
    let unsupported = || ValidationError::UnsupportedType {
        name: file.name.clone(),
        mime: if file.mime.is_empty() {
            "unknown type".to_string()
        } else {
            file.mime.clone()
        },
        allowed: config.accept.describe().to_string(),
    };

    let kind = classify(&file.name, &file.mime).ok_or_else(unsupported)?;
    let accepted = match kind {
        FileKind::Image => config.accept.images(),
        FileKind::Pdf => config.accept.pdfs(),
    };
    if !accepted {
        return Err(unsupported());
    }

    if file.bytes.is_empty() {
        return Err(ValidationError::Empty {
            name: file.name.clone(),
        });
    }

    let limit = match kind {
        FileKind::Image => config.image_limit(),
        FileKind::Pdf => config.pdf_limit(),
    };
    if file.size() > limit {
        return Err(ValidationError::TooLarge {
            name: file.name.clone(),
            size_mb: file.size() as f64 / MIB as f64,
            limit_mb: limit.div_ceil(MIB),
        });
    }

    Ok(kind)
}

/// Validate a batch, stopping at the first invalid file.
///
/// Returns the kind of every file, in order, when all of them pass.
pub fn validate_batch(
    files: &[SourceFile],
    config: &IntakeConfig,
) -> Result<Vec<FileKind>, ValidationError> {
    files.iter().map(|f| validate_file(f, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Accept;

    fn file(name: &str, mime: &str, size: usize) -> SourceFile {
        SourceFile::new(name, mime, vec![0u8; size])
    }

    #[test]
    fn allow_listed_images_are_images() {
        for mime in IMAGE_MIME_TYPES {
            assert_eq!(classify("x", mime), Some(FileKind::Image), "{mime}");
        }
        assert_eq!(classify("x", "IMAGE/JPG"), Some(FileKind::Image));
    }

    #[test]
    fn pdf_by_mime_or_extension() {
        assert_eq!(classify("a", "application/pdf"), Some(FileKind::Pdf));
        assert_eq!(classify("A.PDF", ""), Some(FileKind::Pdf));
        assert_eq!(
            classify("report.pdf", "application/octet-stream"),
            Some(FileKind::Pdf)
        );
        assert_eq!(classify("report.docx", "application/msword"), None);
    }

    #[test]
    fn mime_parameters_are_ignored() {
        assert_eq!(normalize_mime("Application/PDF; charset=binary"), "application/pdf");
    }

    #[test]
    fn stored_mime_is_canonical() {
        assert_eq!(canonical_mime(FileKind::Pdf, ""), "application/pdf");
        assert_eq!(
            canonical_mime(FileKind::Pdf, "application/octet-stream"),
            "application/pdf"
        );
        assert_eq!(canonical_mime(FileKind::Image, "image/JPG"), "image/jpeg");
    }

    #[test]
    fn image_over_ten_megabytes_is_rejected() {
        let config = IntakeConfig::default();
        let big = file("poster.png", "image/png", (10 * MIB + 1) as usize);
        let err = validate_file(&big, &config).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { limit_mb: 10, .. }));
    }

    #[test]
    fn pdf_may_be_larger_than_an_image() {
        let config = IntakeConfig::default();
        let pdf = file("book.pdf", "application/pdf", (20 * MIB) as usize);
        assert_eq!(validate_file(&pdf, &config), Ok(FileKind::Pdf));
    }

    #[test]
    fn unsupported_type_message_lists_allowed_types() {
        let config = IntakeConfig::default();
        let err = validate_file(&file("notes.txt", "text/plain", 3), &config).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("notes.txt"), "got: {msg}");
        assert!(msg.contains("PDF"), "got: {msg}");
    }

    #[test]
    fn images_only_policy_rejects_pdf() {
        let config = IntakeConfig::builder()
            .accept(Accept::ImagesOnly)
            .build()
            .unwrap();
        let err = validate_file(&file("a.pdf", "application/pdf", 10), &config).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn empty_file_is_rejected() {
        let config = IntakeConfig::default();
        let err = validate_file(&file("blank.png", "image/png", 0), &config).unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn batch_stops_at_first_bad_file() {
        let config = IntakeConfig::builder().max_file_bytes(100).build().unwrap();
        let batch = vec![
            file("ok.png", "image/png", 10),
            file("huge.pdf", "application/pdf", 101),
            file("bad.txt", "text/plain", 1),
        ];
        let err = validate_batch(&batch, &config).unwrap_err();
        assert!(
            matches!(err, ValidationError::TooLarge { ref name, .. } if name == "huge.pdf"),
            "got: {err:?}"
        );
    }

    #[test]
    fn batch_returns_kinds_in_order() {
        let config = IntakeConfig::default();
        let batch = vec![
            file("a.pdf", "application/pdf", 1),
            file("b.gif", "image/gif", 1),
        ];
        assert_eq!(
            validate_batch(&batch, &config).unwrap(),
            vec![FileKind::Pdf, FileKind::Image]
        );
    }
}
