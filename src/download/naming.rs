//! Filenames and collision-safe destination paths

use crate::document::DocumentKind;
use std::path::{Path, PathBuf};
use url::Url;

/// Longest filename stem kept, in characters
const MAX_STEM_CHARS: usize = 120;

/// Derives the stored filename for a document
///
/// Prefers the server's Content-Disposition name, then the last URL path
/// segment. The extension of `kind` is appended when the name does not
/// already carry a document extension.
pub fn document_filename(url: &Url, kind: DocumentKind, content_disposition: Option<&str>) -> String {
    let raw = content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| {
            url.path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .map(|s| {
                    urlencoding::decode(s)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| s.to_string())
                })
        })
        .unwrap_or_else(|| "document".to_string());

    let name = sanitize_filename(&raw);
    let (stem, ext) = split_extension(&name);
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = if stem.is_empty() { "document".to_string() } else { stem };

    match ext {
        Some(ext) if DocumentKind::from_extension(ext).is_some() => format!("{}.{}", stem, ext),
        _ if kind == DocumentKind::Unknown => match ext {
            Some(ext) => format!("{}.{}", stem, ext),
            None => format!("{}.{}", stem, kind.extension()),
        },
        Some(ext) => format!("{}.{}.{}", stem, ext, kind.extension()),
        None => format!("{}.{}", stem, kind.extension()),
    }
}

/// Extracts the filename from a Content-Disposition header
///
/// Handles `filename="a.pdf"`, `filename=a.pdf` and the RFC 5987
/// `filename*=UTF-8''a%20b.pdf` form, preferring the latter.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();

    if let Some(pos) = lower.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                let decoded = decoded.trim_matches('"').to_string();
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        }
    }

    let pos = lower.find("filename=")?;
    let value = header[pos + 9..].trim();
    let name = match value.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or(""),
        None => value.split(';').next().unwrap_or("").trim(),
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Replaces characters that are invalid on common filesystems
///
/// `< > : " / \ | ? *` and control characters become `_`; leading dots are
/// dropped so a name can never be `.` or `..` or hidden.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    sanitized.trim_start_matches('.').trim().to_string()
}

/// Returns a path in `dir` that does not exist yet
///
/// `name.pdf`, then `name_1.pdf`, `name_2.pdf`, ...
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let base = dir.join(filename);
    if !base.exists() {
        return base;
    }

    let (stem, ext) = split_extension(filename);
    let ext = ext.map(|e| format!(".{}", e)).unwrap_or_default();
    let mut n: u32 = 1;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.len() <= 5 => {
            (stem, Some(ext))
        }
        _ => (name, None),
    }
}
