//! Text chunkers. Each one is a lazy iterator of [`Chunk`]s.

pub mod novel;
pub mod wiki;

use serde::{Deserialize, Serialize};

pub use novel::NovelChunker;
pub use wiki::{Page, Revision, WikiChunker};

/// A piece of text and where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequence number of the chunk (chapter or page).
    pub num1: i32,
    /// Sequence number of the chunk under the current `num1`.
    pub num2: i32,
    pub path: String,
    pub title: String,
    pub text: String,
}

impl Chunk {
    /// Flatten to `[num1, num2, path, title, text]`.
    pub fn into_row(self) -> Vec<String> {
        vec![
            self.num1.to_string(),
            self.num2.to_string(),
            self.path,
            self.title,
            self.text,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_lowercase_keys() {
        let chunk = Chunk {
            num1: 1,
            num2: 2,
            path: "p".into(),
            title: "t".into(),
            text: "x".into(),
        };
        assert_eq!(
            serde_json::to_string(&chunk).unwrap(),
            r#"{"num1":1,"num2":2,"path":"p","title":"t","text":"x"}"#
        );
    }
}
