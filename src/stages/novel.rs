use std::fs::File;
use std::io::BufReader;

use encoding_rs::Encoding;
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, NovelChunker};
use crate::error::{Result, StageError};
use crate::per_item::{ItemStage, Outputs, emit};
use crate::{Dict, Record, payload};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NovelChunkerConfig {
    /// Emit rows of strings instead of chunk objects.
    pub string_mode: bool,
    /// Encoding label of the input files, e.g. `GBK`. Empty means UTF-8.
    pub encoding: String,
    /// Emit one record per chunk instead of one record per book.
    pub per_chunk: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NovelChunkerInput {
    pub url: String,
}

/// Chunks the book named by each input record's `file://` url.
///
/// Input: `{"data": {"url": "file:///path/to/book.txt"}}`. Output is one
/// record per book holding every chunk, or one record per chunk with
/// `per_chunk`. A bad url or unreadable file fails only that record.
#[derive(Default)]
pub struct NovelChunkerStage {
    conf: NovelChunkerConfig,
}

impl NovelChunkerStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_encoding(&mut self, encoding: impl Into<String>) {
        self.conf.encoding = encoding.into();
    }

    fn open(&self, url: &str) -> Result<BufReader<DecodeReaderBytes<File, Vec<u8>>>> {
        let path = url
            .strip_prefix("file://")
            .ok_or_else(|| StageError::invalid(format!("invalid url: {url}")))?;

        let encoding = match self.conf.encoding.as_str() {
            "" => None,
            label => Some(Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                StageError::invalid(format!("unknown encoding: {label}"))
            })?),
        };

        let decoder = DecodeReaderBytesBuilder::new()
            .encoding(encoding)
            .build(File::open(path)?);
        Ok(BufReader::new(decoder))
    }
}

fn encode(chunks: Vec<Chunk>, string_mode: bool) -> Result<Record> {
    if string_mode {
        let rows: Vec<Vec<String>> = chunks.into_iter().map(Chunk::into_row).collect();
        payload::wrap(&rows)
    } else {
        payload::wrap(&chunks)
    }
}

impl ItemStage for NovelChunkerStage {
    fn name(&self) -> &str {
        "novel_chunker"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        if blob.is_empty() {
            return Ok(());
        }
        self.conf = serde_json::from_slice(blob)?;
        Ok(())
    }

    fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
        let input: NovelChunkerInput = payload::unwrap(&record)?;
        let reader = self.open(&input.url)?;
        let chunker = NovelChunker::new(reader);
        let string_mode = self.conf.string_mode;

        if self.conf.per_chunk {
            return Ok(emit::from_iter(chunker.map(move |chunk| {
                let chunk = chunk?;
                if string_mode {
                    payload::wrap(&chunk.into_row())
                } else {
                    payload::wrap(&chunk)
                }
            })));
        }

        Ok(emit::from_iter(std::iter::once_with(move || {
            let chunks = chunker.collect::<Result<Vec<Chunk>>>()?;
            encode(chunks, string_mode)
        })))
    }
}
