//! JSON Lines product feed

use crate::extract::ProductRecord;
use crate::output::traits::{OutputResult, ProductSink};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes one JSON object per line
///
/// Text is written as UTF-8; non-ASCII characters are not escaped.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
    written: u64,
}

impl JsonLinesSink {
    /// Creates (or truncates) the feed file
    pub fn create(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            written: 0,
        })
    }

    /// Opens the feed file for appending, creating it if needed
    pub fn append(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Number of records written so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl ProductSink for JsonLinesSink {
    fn accept(&mut self, record: &ProductRecord) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        tracing::debug!("Feed flushed with {} records", self.written);
        Ok(())
    }
}

/// Writes a complete feed from already stored records
///
/// # Returns
///
/// The number of records written
pub fn write_feed(path: &Path, records: &[ProductRecord]) -> OutputResult<u64> {
    let mut sink = JsonLinesSink::create(path)?;
    for record in records {
        sink.accept(record)?;
    }
    sink.finish()?;
    Ok(sink.written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_product, ExtractOptions};
    use tempfile::TempDir;
    use url::Url;

    fn record(path: &str, title: &str) -> ProductRecord {
        let body = format!(r#"<h1 class="title">{}</h1><span class="value">77</span>"#, title);
        let url = Url::parse(&format!("https://shop.example.com{}", path)).unwrap();
        extract_product(&body, url, &ExtractOptions::default()).unwrap()
    }

    #[test]
    fn test_one_object_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed").join("products.jsonl");

        let written = write_feed(&path, &[record("/p/1", "Soap"), record("/p/2", "Shampoo")]).unwrap();
        assert_eq!(written, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: ProductRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.title, "Soap");
        assert_eq!(first.url, "https://shop.example.com/p/1");
    }

    #[test]
    fn test_non_ascii_is_written_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.jsonl");

        write_feed(&path, &[record("/p/1", "Мыло детское")]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Мыло детское"));
        assert!(!content.contains("\\u"));
    }

    #[test]
    fn test_append_keeps_existing_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.jsonl");
        write_feed(&path, &[record("/p/1", "Soap")]).unwrap();

        let mut sink = JsonLinesSink::append(&path).unwrap();
        sink.accept(&record("/p/2", "Shampoo")).unwrap();
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_empty_feed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.jsonl");

        assert_eq!(write_feed(&path, &[]).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
