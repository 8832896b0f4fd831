use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::Chunk;

/// One page of a wiki dump, already decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    /// Target title when this page is a redirect.
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(default)]
    pub text: String,
}

impl Page {
    pub fn is_redirect(&self) -> bool {
        self.redirect.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Walks pages and turns each one into chunks.
///
/// `num1` counts pages from 1. A redirect page becomes a single chunk whose
/// `path` is the redirect target. Other pages use their first revision and
/// become one chunk, or one chunk per paragraph in paragraph mode.
pub struct WikiChunker<I> {
    pages: I,
    paragraphs: bool,
    num1: i32,
    pending: VecDeque<Chunk>,
}

impl<I: Iterator<Item = Page>> WikiChunker<I> {
    pub fn new(pages: I, paragraphs: bool) -> Self {
        Self {
            pages,
            paragraphs,
            num1: 0,
            pending: VecDeque::new(),
        }
    }

    fn handle_page(&mut self, page: Page) {
        self.num1 += 1;

        if page.is_redirect() {
            self.pending.push_back(Chunk {
                num1: self.num1,
                num2: 0,
                path: page.redirect.unwrap_or_default(),
                title: page.title,
                text: String::new(),
            });
            return;
        }

        if page.revisions.len() > 1 {
            tracing::warn!(title = %page.title, revisions = page.revisions.len(), "page has more than one revision");
        }
        let text = page
            .revisions
            .into_iter()
            .next()
            .map(|rev| rev.text)
            .unwrap_or_default();

        if !self.paragraphs {
            self.pending.push_back(Chunk {
                num1: self.num1,
                num2: 0,
                title: page.title,
                text,
                ..Chunk::default()
            });
            return;
        }

        let mut num2 = 0;
        for paragraph in split_paragraphs(&text) {
            num2 += 1;
            self.pending.push_back(Chunk {
                num1: self.num1,
                num2,
                title: page.title.clone(),
                text: paragraph,
                ..Chunk::default()
            });
        }
    }
}

/// Blank-line separated paragraphs, lines joined with `\n`.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

impl<I: Iterator<Item = Page>> Iterator for WikiChunker<I> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(chunk);
            }
            let page = self.pages.next()?;
            self.handle_page(page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, text: &str) -> Page {
        Page {
            title: title.into(),
            redirect: None,
            revisions: vec![Revision { text: text.into() }],
        }
    }

    fn redirect(title: &str, target: &str) -> Page {
        Page {
            title: title.into(),
            redirect: Some(target.into()),
            revisions: vec![],
        }
    }

    #[test]
    fn whole_page_mode() {
        let pages = vec![page("Rust", "A language.\n\nSafe."), redirect("RUST", "Rust")];
        let chunks: Vec<Chunk> = WikiChunker::new(pages.into_iter(), false).collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].num1, 1);
        assert_eq!(chunks[0].text, "A language.\n\nSafe.");
        assert_eq!(chunks[1].num1, 2);
        assert_eq!(chunks[1].path, "Rust");
        assert_eq!(chunks[1].title, "RUST");
        assert!(chunks[1].text.is_empty());
    }

    #[test]
    fn paragraph_mode_numbers_within_page() {
        let pages = vec![
            page("A", "\nfirst\nstill first\n\n\nsecond\n\nthird"),
            page("B", "only"),
        ];
        let chunks: Vec<Chunk> = WikiChunker::new(pages.into_iter(), true).collect();

        let got: Vec<(i32, i32, &str)> = chunks
            .iter()
            .map(|c| (c.num1, c.num2, c.text.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (1, 1, "first\nstill first"),
                (1, 2, "second"),
                (1, 3, "third"),
                (2, 1, "only"),
            ]
        );
    }

    #[test]
    fn uses_first_revision() {
        let mut p = page("A", "first rev");
        p.revisions.push(Revision {
            text: "second rev".into(),
        });
        let chunks: Vec<Chunk> = WikiChunker::new(vec![p].into_iter(), false).collect();
        assert_eq!(chunks[0].text, "first rev");
    }

    #[test]
    fn empty_redirect_is_a_regular_page() {
        let mut p = page("A", "body");
        p.redirect = Some(String::new());
        assert!(!p.is_redirect());
    }

    #[test]
    fn pulls_pages_lazily() {
        let mut produced = 0;
        let pages = std::iter::from_fn(|| {
            produced += 1;
            Some(page("P", "x"))
        });
        let first: Vec<Chunk> = WikiChunker::new(pages, false).take(3).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(produced, 3);
    }
}
