use crate::Dict;
use crate::error::{Result, StageError};
use crate::stages::ToolCall;

/// An opaque record payload, conventionally a JSON document.
pub type Record = Vec<u8>;

/// One entry of a record sequence: a record, or the failure that took its place.
pub type Entry = Result<Record>;

/// A lazy, single-pass sequence of entries.
///
/// Nothing upstream runs until the sequence is pulled. Dropping it stops all
/// further upstream work.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Entry> + 'a>;

/// Callback used by the chat stage to answer a model's tool call.
pub type ToolCallFn = Box<dyn FnMut(&ToolCall) -> Result<String>>;

/// Row projection applied by the database writer before insert.
pub type ProjectionFn = Box<dyn Fn(Vec<String>) -> Vec<String>>;

/// Run-time parameters a stage may accept through [`Stage::set_value`].
///
/// Each stage documents which variants it takes; everything else is
/// rejected with [`StageError::UnsupportedValue`].
pub enum Setting {
    Model(String),
    Format(serde_json::Value),
    Tools(Vec<serde_json::Value>),
    ToolCall(ToolCallFn),
    Projection(ProjectionFn),
    BatchSize(usize),
    Limit(usize),
    Query(String),
    Records(Vec<String>),
    Jq(String),
}

impl Setting {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Model(_) => "model",
            Self::Format(_) => "format",
            Self::Tools(_) => "tools",
            Self::ToolCall(_) => "tool_call",
            Self::Projection(_) => "projection",
            Self::BatchSize(_) => "batch_size",
            Self::Limit(_) => "limit",
            Self::Query(_) => "query",
            Self::Records(_) => "records",
            Self::Jq(_) => "jq",
        }
    }

    /// The error a stage returns for a setting it does not take.
    pub fn unsupported(&self) -> StageError {
        StageError::UnsupportedValue(self.name())
    }
}

impl std::fmt::Debug for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Setting::{}", self.name())
    }
}

/// The unit of computation in a pipeline.
///
/// A stage consumes a [`RecordStream`] (or nothing, for a source) plus the
/// side dictionary, and produces a new [`RecordStream`]. Implement it
/// directly for sources and combinators; for one-record-in, N-records-out
/// transforms implement [`crate::ItemStage`] and wrap it in
/// [`crate::PerItem`].
pub trait Stage {
    /// Name used in logs and runner events.
    fn name(&self) -> &str;

    /// One-time configuration from a serialized blob. Accepts anything by
    /// default.
    fn configure(&mut self, _blob: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Build the output sequence. Must not do record work eagerly: all work
    /// happens as the caller pulls. An `Err` here is a construction failure
    /// and no sequence exists.
    fn produce<'a>(
        &'a mut self,
        input: Option<RecordStream<'a>>,
        dict: &'a Dict,
    ) -> Result<RecordStream<'a>>;

    /// Set a single run-time value. Unsupported unless overridden.
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        Err(setting.unsupported())
    }

    /// Release held resources. Safe to call more than once.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Stage + ?Sized> Stage for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        (**self).configure(blob)
    }

    fn produce<'a>(
        &'a mut self,
        input: Option<RecordStream<'a>>,
        dict: &'a Dict,
    ) -> Result<RecordStream<'a>> {
        (**self).produce(input, dict)
    }

    fn set_value(&mut self, setting: Setting) -> Result<()> {
        (**self).set_value(setting)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}

/// Release every stage, even after a failure, and report the first error.
pub(crate) fn release_all<'s>(stages: impl IntoIterator<Item = &'s mut Box<dyn Stage>>) -> Result<()> {
    let mut first: Option<StageError> = None;
    for stage in stages {
        if let Err(err) = stage.release() {
            tracing::warn!(stage = stage.name(), error = %err, "release failed");
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Drain a sequence into its successful records and its failures, keeping
/// their relative order within each list.
pub fn collect(stream: RecordStream<'_>) -> (Vec<Record>, Vec<StageError>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for entry in stream {
        match entry {
            Ok(record) => records.push(record),
            Err(err) => failures.push(err),
        }
    }
    (records, failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    impl Stage for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }

        fn produce<'a>(
            &'a mut self,
            _input: Option<RecordStream<'a>>,
            _dict: &'a Dict,
        ) -> Result<RecordStream<'a>> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn set_value_unsupported_by_default() {
        let mut stage = Nothing;
        let err = stage.set_value(Setting::Model("llama".into())).unwrap_err();
        assert!(matches!(err, StageError::UnsupportedValue("model")));
    }

    #[test]
    fn configure_and_release_default_to_ok() {
        let mut stage = Nothing;
        assert!(stage.configure(br#"{"anything": 1}"#).is_ok());
        assert!(stage.release().is_ok());
        assert!(stage.release().is_ok());
    }

    #[test]
    fn boxed_stage_delegates() {
        let mut stage: Box<dyn Stage> = Box::new(Nothing);
        assert_eq!(stage.name(), "nothing");
        let dict = Dict::new();
        assert_eq!(stage.produce(None, &dict).unwrap().count(), 0);
    }

    #[test]
    fn collect_splits_records_and_failures() {
        let entries: Vec<Entry> = vec![
            Ok(b"a".to_vec()),
            Err(StageError::other("x")),
            Ok(b"b".to_vec()),
        ];
        let (records, failures) = collect(Box::new(entries.into_iter()));
        assert_eq!(records, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn setting_debug_shows_name() {
        let setting = Setting::BatchSize(3);
        assert_eq!(format!("{setting:?}"), "Setting::batch_size");
    }
}
