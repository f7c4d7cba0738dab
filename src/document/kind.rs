use serde::{Deserialize, Serialize};

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Doc,
    Docx,
    Ppt,
    Pptx,
    Xls,
    Xlsx,
    Odt,
    Ods,
    Odp,
    Rtf,
    Txt,
    Csv,
    Epub,
    /// A document whose format could not be determined from its URL
    Unknown,
}

/// Leading bytes of the OLE2 compound file format (legacy Office)
const OLE2_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const PDF_SIGNATURE: &[u8] = b"%PDF";
const RTF_SIGNATURE: &[u8] = b"{\\rtf";

impl DocumentKind {
    /// All concrete formats, in the order their extensions are listed
    pub const KNOWN: [DocumentKind; 14] = [
        Self::Pdf,
        Self::Doc,
        Self::Docx,
        Self::Ppt,
        Self::Pptx,
        Self::Xls,
        Self::Xlsx,
        Self::Odt,
        Self::Ods,
        Self::Odp,
        Self::Rtf,
        Self::Txt,
        Self::Csv,
        Self::Epub,
    ];

    /// Maps a file extension (without the dot, any case) to a kind
    pub fn from_extension(ext: &str) -> Option<Self> {
        let kind = match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "doc" => Self::Doc,
            "docx" => Self::Docx,
            "ppt" | "pps" => Self::Ppt,
            "pptx" | "ppsx" => Self::Pptx,
            "xls" => Self::Xls,
            "xlsx" => Self::Xlsx,
            "odt" => Self::Odt,
            "ods" => Self::Ods,
            "odp" => Self::Odp,
            "rtf" => Self::Rtf,
            "txt" => Self::Txt,
            "csv" => Self::Csv,
            "epub" => Self::Epub,
            _ => return None,
        };
        Some(kind)
    }

    /// Maps a Content-Type header value to a document kind
    ///
    /// Parameters such as `; charset=utf-8` are ignored. Returns `None` for
    /// types that are not documents (HTML, images, scripts).
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let mime = essence(content_type);
        let kind = match mime.as_str() {
            "application/pdf" | "application/x-pdf" => Self::Pdf,
            "application/msword" => Self::Doc,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Docx
            }
            "application/vnd.ms-powerpoint" => Self::Ppt,
            "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Self::Pptx
            }
            "application/vnd.ms-excel" => Self::Xls,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Self::Xlsx,
            "application/vnd.oasis.opendocument.text" => Self::Odt,
            "application/vnd.oasis.opendocument.spreadsheet" => Self::Ods,
            "application/vnd.oasis.opendocument.presentation" => Self::Odp,
            "application/rtf" | "text/rtf" => Self::Rtf,
            "text/plain" => Self::Txt,
            "text/csv" => Self::Csv,
            "application/epub+zip" => Self::Epub,
            _ => return None,
        };
        Some(kind)
    }

    /// Infers a kind from the last path segment of a URL
    pub fn from_url(url: &url::Url) -> Option<Self> {
        url_extension(url).and_then(|ext| Self::from_extension(&ext))
    }

    /// Canonical file extension for this kind
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Ppt => "ppt",
            Self::Pptx => "pptx",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
            Self::Odt => "odt",
            Self::Ods => "ods",
            Self::Odp => "odp",
            Self::Rtf => "rtf",
            Self::Txt => "txt",
            Self::Csv => "csv",
            Self::Epub => "epub",
            Self::Unknown => "bin",
        }
    }

    /// Whether a served Content-Type is compatible with this kind
    ///
    /// Generic binary types are accepted for every kind since many servers
    /// label all downloads `application/octet-stream`. An unknown kind accepts
    /// anything except an HTML page.
    pub fn accepts_mime(&self, content_type: &str) -> bool {
        let mime = essence(content_type);
        if mime.is_empty() {
            return true;
        }
        if matches!(
            mime.as_str(),
            "application/octet-stream"
                | "binary/octet-stream"
                | "application/download"
                | "application/force-download"
                | "application/x-download"
        ) {
            return true;
        }
        match self {
            Self::Unknown => mime != "text/html" && mime != "application/xhtml+xml",
            // Zip containers are often served as plain zip
            Self::Docx | Self::Xlsx | Self::Pptx | Self::Odt | Self::Ods | Self::Odp | Self::Epub
                if matches!(mime.as_str(), "application/zip" | "application/x-zip-compressed") =>
            {
                true
            }
            // Text formats are frequently mislabelled as one another
            Self::Txt | Self::Csv if mime.starts_with("text/") && mime != "text/html" => true,
            kind => Self::from_mime(&mime) == Some(*kind),
        }
    }

    /// Whether the leading bytes of a body match this kind's file signature
    ///
    /// Formats without a fixed signature always pass.
    pub fn matches_signature(&self, head: &[u8]) -> bool {
        match self {
            Self::Pdf => contains_within(head, PDF_SIGNATURE, 1024),
            Self::Doc | Self::Xls | Self::Ppt => head.starts_with(OLE2_SIGNATURE),
            Self::Docx
            | Self::Xlsx
            | Self::Pptx
            | Self::Odt
            | Self::Ods
            | Self::Odp
            | Self::Epub => head.starts_with(ZIP_SIGNATURE),
            Self::Rtf => head.starts_with(RTF_SIGNATURE),
            Self::Txt | Self::Csv | Self::Unknown => true,
        }
    }

    /// Whether a text snippet can be read from the body for categorization
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Txt | Self::Csv | Self::Rtf)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lowercase extension of the last path segment, if it has one
pub fn url_extension(url: &url::Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let (stem, ext) = decoded.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// The `type/subtype` part of a Content-Type value, lowercased
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn contains_within(head: &[u8], needle: &[u8], limit: usize) -> bool {
    let window = &head[..head.len().min(limit)];
    window.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_from_extension_case_insensitive() {
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("pptx"), Some(DocumentKind::Pptx));
        assert_eq!(DocumentKind::from_extension("html"), None);
    }

    #[test]
    fn test_from_mime_ignores_parameters() {
        assert_eq!(
            DocumentKind::from_mime("application/pdf; charset=binary"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(DocumentKind::from_mime("text/html; charset=utf-8"), None);
    }

    #[test]
    fn test_from_url_uses_last_segment() {
        let url = Url::parse("https://example.com/files.d/report.PDF?v=2").unwrap();
        assert_eq!(DocumentKind::from_url(&url), Some(DocumentKind::Pdf));

        let url = Url::parse("https://example.com/v1.2/notes").unwrap();
        assert_eq!(DocumentKind::from_url(&url), None);
    }

    #[test]
    fn test_url_extension_decodes_segment() {
        let url = Url::parse("https://example.com/Annual%20Report.Docx").unwrap();
        assert_eq!(url_extension(&url), Some("docx".to_string()));
    }

    #[test]
    fn test_accepts_mime() {
        assert!(DocumentKind::Pdf.accepts_mime("application/pdf"));
        assert!(DocumentKind::Pdf.accepts_mime("application/octet-stream"));
        assert!(!DocumentKind::Pdf.accepts_mime("text/html; charset=utf-8"));
        assert!(DocumentKind::Docx.accepts_mime("application/zip"));
        assert!(DocumentKind::Csv.accepts_mime("text/plain"));
        assert!(!DocumentKind::Csv.accepts_mime("text/html"));
        assert!(DocumentKind::Unknown.accepts_mime("application/pdf"));
        assert!(!DocumentKind::Unknown.accepts_mime("text/html"));
    }

    #[test]
    fn test_missing_content_type_is_accepted() {
        assert!(DocumentKind::Xlsx.accepts_mime(""));
    }

    #[test]
    fn test_signatures() {
        assert!(DocumentKind::Pdf.matches_signature(b"%PDF-1.7\n..."));
        assert!(!DocumentKind::Pdf.matches_signature(b"<!DOCTYPE html>"));
        assert!(DocumentKind::Docx.matches_signature(b"PK\x03\x04rest"));
        assert!(DocumentKind::Xls.matches_signature(OLE2_SIGNATURE));
        assert!(!DocumentKind::Doc.matches_signature(b"PK\x03\x04"));
        assert!(DocumentKind::Txt.matches_signature(b"anything"));
    }

    #[test]
    fn test_pdf_signature_after_preamble() {
        let mut body = vec![b'\n'; 20];
        body.extend_from_slice(b"%PDF-1.4");
        assert!(DocumentKind::Pdf.matches_signature(&body));
    }
}
