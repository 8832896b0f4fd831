use crate::error::Result;
use crate::{Dict, RecordStream, Setting, Stage};

/// Source stage yielding a fixed list of strings, one record each.
///
/// Ignores its input. Records are produced only as they are pulled.
pub struct StringArraySource {
    items: Vec<String>,
}

impl StringArraySource {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

impl Stage for StringArraySource {
    fn name(&self) -> &str {
        "string_array"
    }

    fn produce<'a>(
        &'a mut self,
        _input: Option<RecordStream<'a>>,
        _dict: &'a Dict,
    ) -> Result<RecordStream<'a>> {
        Ok(Box::new(
            self.items.iter().map(|item| Ok(item.as_bytes().to_vec())),
        ))
    }

    /// Takes [`Setting::Records`].
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::Records(items) => {
                self.items = items;
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }
}
