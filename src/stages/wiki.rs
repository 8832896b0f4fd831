use serde::{Deserialize, Serialize};

use crate::chunk::{Page, WikiChunker};
use crate::error::{Result, StageError};
use crate::per_item::{ItemStage, Outputs, emit};
use crate::{Dict, Record, Setting, payload};

const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiChunkerConfig {
    /// Pages per output record.
    pub batch_size: usize,
    /// Split page text into paragraphs.
    pub paragraph: bool,
}

impl Default for WikiChunkerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            paragraph: false,
        }
    }
}

/// Turns page records into batches of `[title, lowercase title, path, text]`
/// rows.
///
/// Input is one decoded page per record, `{"data": {"title", "redirect",
/// "revisions": [{"text"}]}}`. Every `batch_size` pages one
/// `{"data": [[..], ..]}` record is emitted; the last partial batch is
/// emitted when the upstream ends.
pub struct WikiChunkerStage {
    conf: WikiChunkerConfig,
    pages: usize,
    rows: Vec<[String; 4]>,
}

impl WikiChunkerStage {
    pub fn new(batch_size: usize) -> Self {
        Self {
            conf: WikiChunkerConfig {
                batch_size,
                ..WikiChunkerConfig::default()
            },
            pages: 0,
            rows: Vec::new(),
        }
    }

    fn take_batch(&mut self) -> Result<Record> {
        let rows = std::mem::take(&mut self.rows);
        payload::wrap(&rows)
    }
}

impl Default for WikiChunkerStage {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl ItemStage for WikiChunkerStage {
    fn name(&self) -> &str {
        "wiki_chunker"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        if blob.is_empty() {
            return Ok(());
        }
        self.conf = serde_json::from_slice(blob)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.conf.batch_size == 0 {
            return Err(StageError::config("batch_size must be positive"));
        }
        self.pages = 0;
        self.rows.clear();
        Ok(())
    }

    fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
        let page: Page = payload::unwrap(&record)?;
        if page.title.is_empty() {
            return Err(StageError::invalid("page without title"));
        }

        for chunk in WikiChunker::new(std::iter::once(page), self.conf.paragraph) {
            let lower = chunk.title.to_lowercase();
            self.rows.push([chunk.title, lower, chunk.path, chunk.text]);
        }

        self.pages += 1;
        if self.pages % self.conf.batch_size != 0 {
            return Ok(emit::none());
        }
        Ok(emit::one(self.take_batch()?))
    }

    fn flush<'d>(&mut self, _dict: &'d Dict) -> Result<Outputs<'d>> {
        if self.rows.is_empty() {
            return Ok(emit::none());
        }
        Ok(emit::one(self.take_batch()?))
    }

    /// Takes [`Setting::BatchSize`].
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::BatchSize(size) => {
                self.conf.batch_size = size;
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Revision;
    use crate::{Entry, PerItem, RecordStream, Stage};

    fn page_record(title: &str, redirect: Option<&str>, text: &str) -> Entry {
        payload::wrap(&Page {
            title: title.into(),
            redirect: redirect.map(Into::into),
            revisions: vec![Revision { text: text.into() }],
        })
    }

    fn rows(entry: &Entry) -> Vec<Vec<String>> {
        payload::unwrap(entry.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn batches_pages_and_flushes_tail() {
        let pages: Vec<Entry> = (0..5)
            .map(|i| page_record(&format!("Page {i}"), None, "text"))
            .collect();
        let mut stage = PerItem::new(WikiChunkerStage::new(2));
        let dict = Dict::new();

        let out: Vec<Entry> = stage
            .produce(Some(Box::new(pages.into_iter()) as RecordStream<'_>), &dict)
            .unwrap()
            .collect();
        let sizes: Vec<usize> = out.iter().map(|e| rows(e).len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(rows(&out[0])[0], vec!["Page 0", "page 0", "", "text"]);
    }

    #[test]
    fn records_redirect_target() {
        let pages = vec![page_record("RUST", Some("Rust"), "")];
        let mut stage = PerItem::new(WikiChunkerStage::new(10));
        let dict = Dict::new();

        let out: Vec<Entry> = stage
            .produce(Some(Box::new(pages.into_iter()) as RecordStream<'_>), &dict)
            .unwrap()
            .collect();
        assert_eq!(rows(&out[0])[0], vec!["RUST", "rust", "Rust", ""]);
    }

    #[test]
    fn paragraph_mode_adds_rows_per_page() {
        let pages = vec![page_record("A", None, "one\n\ntwo"), page_record("B", None, "three")];
        let mut stage = PerItem::new(WikiChunkerStage::default());
        stage.configure(br#"{"batch_size": 2, "paragraph": true}"#).unwrap();
        let dict = Dict::new();

        let out: Vec<Entry> = stage
            .produce(Some(Box::new(pages.into_iter()) as RecordStream<'_>), &dict)
            .unwrap()
            .collect();
        assert_eq!(out.len(), 1);
        let texts: Vec<String> = rows(&out[0]).into_iter().map(|r| r[3].clone()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn untitled_page_fails_alone() {
        let pages = vec![page_record("", None, "x"), page_record("B", None, "y")];
        let mut stage = PerItem::new(WikiChunkerStage::new(10));
        let dict = Dict::new();

        let out: Vec<Entry> = stage
            .produce(Some(Box::new(pages.into_iter()) as RecordStream<'_>), &dict)
            .unwrap()
            .collect();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(StageError::Invalid(_))));
        assert_eq!(rows(&out[1]).len(), 1);
    }
}
