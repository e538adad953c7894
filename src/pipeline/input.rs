//! Input: read the URL list from a CSV or plain-text file.
//!
//! One URL per record, taken from the first field and trimmed. Lines starting
//! with `#` are comments. Rows whose first field is empty or not an absolute
//! URL are dropped and counted rather than failing the whole file, so a
//! header row such as `url` is simply skipped.

use crate::error::Web2PdfError;
use crate::job::validate_url;
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, info, warn};

/// URLs read from an input file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlList {
    pub urls: Vec<String>,
    /// Rows dropped because they were empty, undecodable or not a URL.
    pub dropped: usize,
}

/// Read and parse the URL list at `path`.
///
/// # Errors
/// * [`Web2PdfError::InputNotFound`] if `path` does not exist
/// * [`Web2PdfError::InputRead`] if it cannot be read
/// * [`Web2PdfError::NoUrls`] if no row holds a usable URL
pub async fn read_url_list(path: impl AsRef<Path>) -> Result<UrlList, Web2PdfError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Web2PdfError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Web2PdfError::InputRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let list = parse_url_list(&bytes);
    info!(
        "Read {} URLs from {} ({} rows dropped)",
        list.urls.len(),
        path.display(),
        list.dropped
    );
    if list.urls.is_empty() {
        return Err(Web2PdfError::NoUrls {
            dropped: list.dropped,
        });
    }
    Ok(list)
}

/// Parse URL-list content already in memory.
pub fn parse_url_list(data: &[u8]) -> UrlList {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(data);

    let mut list = UrlList::default();
    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(row = row + 1, "dropping unreadable row: {e}");
                list.dropped += 1;
                continue;
            }
        };
        let first = record.get(0).unwrap_or("").trim();
        if first.is_empty() {
            debug!(row = row + 1, "dropping empty row");
            list.dropped += 1;
            continue;
        }
        match validate_url(first) {
            Ok(_) => list.urls.push(first.to_string()),
            Err(reason) => {
                warn!(row = row + 1, "dropping '{first}': {reason}");
                list.dropped += 1;
            }
        }
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_column_is_trimmed() {
        let list = parse_url_list(b"  https://a.example/x , title A\nhttps://b.example,title B,extra\n");
        assert_eq!(list.urls, vec!["https://a.example/x", "https://b.example"]);
        assert_eq!(list.dropped, 0);
    }

    #[test]
    fn header_blank_and_junk_rows_are_dropped() {
        let data = "url,title\n\n  ,\nnot a url\nhttps://ok.example\n# https://commented.example\n";
        let list = parse_url_list(data.as_bytes());
        assert_eq!(list.urls, vec!["https://ok.example"]);
        // header, whitespace-only row, junk row
        assert_eq!(list.dropped, 3);
    }

    #[test]
    fn bom_is_stripped() {
        let list = parse_url_list(b"\xEF\xBB\xBFhttps://bom.example\n");
        assert_eq!(list.urls, vec!["https://bom.example"]);
    }

    #[test]
    fn plain_text_list_works() {
        let list = parse_url_list(b"https://one.example\nhttps://two.example");
        assert_eq!(list.urls.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = read_url_list("/definitely/not/here.csv").await.unwrap_err();
        assert!(matches!(err, Web2PdfError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn file_without_urls_is_no_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.csv");
        std::fs::write(&path, "url\nnope\n").unwrap();
        let err = read_url_list(&path).await.unwrap_err();
        assert!(matches!(err, Web2PdfError::NoUrls { dropped: 2 }));
    }
}
