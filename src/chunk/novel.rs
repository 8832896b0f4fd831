use std::io::{BufRead, Lines};

use super::Chunk;
use crate::error::Result;

/// Splits plain-text books into paragraphs.
///
/// A paragraph ends at a blank line. Two or more consecutive blank lines
/// also end the chapter: `num1` advances and `num2` restarts, taking effect
/// from the next paragraph. Each line is appended with a leading space, and
/// empty paragraphs are never yielded.
pub struct NovelChunker<R> {
    lines: Lines<R>,
    num1: i32,
    num2: i32,
    buf: String,
    empty_lines: usize,
    done: bool,
}

impl<R: BufRead> NovelChunker<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            num1: 0,
            num2: 0,
            buf: String::new(),
            empty_lines: 0,
            done: false,
        }
    }

    /// Close the paragraph in `buf`. Returns it unless it is empty.
    fn boundary(&mut self) -> Option<Chunk> {
        self.num2 += 1;
        let chunk = Chunk {
            num1: self.num1,
            num2: self.num2,
            text: std::mem::take(&mut self.buf),
            ..Chunk::default()
        };

        // numbering for the next chapter starts after this chunk is stamped
        if self.empty_lines > 1 {
            self.num1 += 1;
            self.num2 = 0;
        }
        self.empty_lines = 0;

        (!chunk.text.is_empty()).then_some(chunk)
    }
}

impl<R: BufRead> Iterator for NovelChunker<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.lines.next() {
                Some(Ok(line)) if line.is_empty() => self.empty_lines += 1,
                Some(Ok(line)) => {
                    let closed = if self.empty_lines > 0 {
                        self.boundary()
                    } else {
                        None
                    };
                    self.buf.push(' ');
                    self.buf.push_str(&line);
                    if let Some(chunk) = closed {
                        return Some(Ok(chunk));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
                None => {
                    self.done = true;
                    return self.boundary().map(Ok);
                }
            }
        }
        None
    }
}
