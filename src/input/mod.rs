//! Seed URL input
//!
//! Seeds come from a newline-delimited text file, a JSON document (any
//! string values, nested arrays and objects included), a CSV file (URLs in
//! any column), or a directory holding such files. Entries that are not
//! absolute http(s) URLs with a host are dropped with a log line; an input
//! with no usable URL at all is a configuration error.

use crate::url::normalize_parsed;
use crate::{ConfigError, ConfigResult};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Input formats understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedFormat {
    Text,
    Json,
    Csv,
}

impl SeedFormat {
    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "list" => Some(Self::Text),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Guesses the format of content with no telling extension
    pub fn sniff(contents: &str) -> Self {
        match contents.trim_start().chars().next() {
            Some('[') | Some('{') => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Loads seed URLs from a file or directory
///
/// # Arguments
///
/// * `path` - A `.txt`, `.json` or `.csv` file, a file of unknown type
///   (sniffed), or a directory of supported files
///
/// # Returns
///
/// * `Ok(Vec<Url>)` - Normalized, de-duplicated seeds in input order
/// * `Err(ConfigError)` - The input is unreadable, malformed, or holds no usable URL
pub fn load_seeds(path: &Path) -> ConfigResult<Vec<Url>> {
    let files = if path.is_dir() {
        directory_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut seen = HashSet::new();
    let mut seeds = Vec::new();
    let mut dropped = 0usize;

    for file in &files {
        let contents = fs::read_to_string(file).map_err(|e| input_error(file, e.to_string()))?;
        let format = SeedFormat::from_path(file).unwrap_or_else(|| SeedFormat::sniff(&contents));
        let candidates = match format {
            SeedFormat::Text => text_entries(&contents),
            SeedFormat::Json => json_entries(&contents).map_err(|m| input_error(file, m))?,
            SeedFormat::Csv => csv_entries(&contents).map_err(|m| input_error(file, m))?,
        };
        tracing::debug!(
            "{}: {} entries read as {:?}",
            file.display(),
            candidates.len(),
            format
        );

        for candidate in candidates {
            match parse_seed(&candidate) {
                Some(url) => {
                    if seen.insert(url.as_str().to_string()) {
                        seeds.push(url);
                    }
                }
                None => {
                    tracing::debug!("Ignoring seed entry {:?}", candidate);
                    dropped += 1;
                }
            }
        }
    }

    if dropped > 0 {
        tracing::warn!("Ignored {} entries that are not http(s) URLs", dropped);
    }
    if seeds.is_empty() {
        return Err(input_error(path, "no valid http(s) URLs found".to_string()));
    }

    tracing::info!("Loaded {} seed URLs from {}", seeds.len(), path.display());
    Ok(seeds)
}

/// Parses one entry into a normalized seed URL
///
/// Only absolute `http`/`https` URLs with a host qualify.
pub fn parse_seed(entry: &str) -> Option<Url> {
    let entry = entry.trim().trim_matches('"').trim();
    if entry.is_empty() {
        return None;
    }
    let url = Url::parse(entry).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
        return None;
    }
    normalize_parsed(url).ok()
}

fn directory_files(dir: &Path) -> ConfigResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| input_error(dir, e.to_string()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && SeedFormat::from_path(p).is_some())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(input_error(dir, "directory holds no .txt, .json or .csv files".to_string()));
    }
    Ok(files)
}

fn text_entries(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn json_entries(contents: &str) -> Result<Vec<String>, String> {
    let value: Value = serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {}", e))?;
    let mut out = Vec::new();
    collect_strings(&value, &mut out);
    Ok(out)
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Every non-empty field of every record; header rows are harmless since
/// they never parse as URLs
fn csv_entries(contents: &str) -> Result<Vec<String>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("invalid CSV: {}", e))?;
        out.extend(
            record
                .iter()
                .filter(|field| !field.is_empty())
                .map(str::to_string),
        );
    }
    Ok(out)
}

fn input_error(path: &Path, message: String) -> ConfigError {
    ConfigError::Input {
        path: path.to_path_buf(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn urls(seeds: &[Url]) -> Vec<&str> {
        seeds.iter().map(|u| u.as_str()).collect()
    }

    #[test]
    fn test_text_seeds() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "seeds.txt",
            "# course pages\nhttps://example.com/docs\n\nftp://example.com/x\nnot a url\nHTTPS://Example.com:443/docs#top\n",
        );
        let seeds = load_seeds(&path).unwrap();
        assert_eq!(urls(&seeds), vec!["https://example.com/docs"]);
    }

    #[test]
    fn test_json_nested_values() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "seeds.json",
            r#"{"primary": ["https://a.com/"], "more": {"b": "https://b.com/x", "n": 3, "c": ["mailto:x@y.z"]}}"#,
        );
        let seeds = load_seeds(&path).unwrap();
        assert_eq!(seeds.len(), 2);
        assert!(urls(&seeds).contains(&"https://b.com/x"));
    }

    #[test]
    fn test_csv_any_column_with_quotes() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "seeds.csv",
            "name,link\n\"Course, Fall\",https://a.com/c\nhttps://b.com/,\"https://c.com/x,y\"\n",
        );
        let seeds = load_seeds(&path).unwrap();
        assert_eq!(
            urls(&seeds),
            vec!["https://a.com/c", "https://b.com/", "https://c.com/x,y"]
        );
    }

    #[test]
    fn test_unknown_extension_sniffed() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "seeds.dat", "[\"https://a.com/\"]");
        assert_eq!(load_seeds(&json).unwrap().len(), 1);
        let text = write(&dir, "seeds.lst", "https://b.com/\n");
        assert_eq!(load_seeds(&text).unwrap().len(), 1);
    }

    #[test]
    fn test_directory_deduplicates() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.txt", "https://a.com/\nhttps://b.com/\n");
        write(&dir, "b.json", "[\"https://b.com/\", \"https://c.com/\"]");
        write(&dir, "notes.md", "https://ignored.com/");

        let seeds = load_seeds(dir.path()).unwrap();
        assert_eq!(
            urls(&seeds),
            vec!["https://a.com/", "https://b.com/", "https://c.com/"]
        );
    }

    #[test]
    fn test_no_valid_urls_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "seeds.txt", "nothing here\nfile:///etc/passwd\n");
        let err = load_seeds(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Input { .. }));
    }

    #[test]
    fn test_malformed_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "seeds.json", "[\"https://a.com/\"");
        let err = load_seeds(&path).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_csv_multiline_quoted_cell() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "seeds.csv",
            "name,url\n\"Dept of\nPhysics\",https://a.example.com/docs\n",
        );
        let seeds = load_seeds(&path).unwrap();
        assert_eq!(urls(&seeds), vec!["https://a.example.com/docs"]);
    }

    #[test]
    fn test_csv_escaped_quotes_and_ragged_rows() {
        let entries = csv_entries("\"say \"\"hi\"\"\",x\nhttps://a.com/\n").unwrap();
        assert_eq!(entries, vec!["say \"hi\"", "x", "https://a.com/"]);
    }
}
