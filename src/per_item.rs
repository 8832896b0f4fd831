use crate::error::{Result, StageError};
use crate::{Dict, Entry, Record, RecordStream, Setting, Stage};

/// The lazy outputs of one input record.
///
/// May borrow the side dictionary, never the stage that produced it.
pub type Outputs<'d> = Box<dyn Iterator<Item = Entry> + 'd>;

/// Constructors for [`Outputs`].
pub mod emit {
    use super::Outputs;
    use crate::{Entry, Record, StageError};

    /// No output for this input.
    pub fn none<'d>() -> Outputs<'d> {
        Box::new(std::iter::empty())
    }

    pub fn one<'d>(record: Record) -> Outputs<'d> {
        Box::new(std::iter::once(Ok(record)))
    }

    pub fn many<'d>(records: Vec<Record>) -> Outputs<'d> {
        Box::new(records.into_iter().map(Ok))
    }

    /// A single failed entry.
    pub fn fail<'d>(err: StageError) -> Outputs<'d> {
        Box::new(std::iter::once(Err(err)))
    }

    /// Wrap any lazy iterator of entries.
    pub fn from_iter<'d, I>(entries: I) -> Outputs<'d>
    where
        I: IntoIterator<Item = Entry>,
        I::IntoIter: 'd,
    {
        Box::new(entries.into_iter())
    }
}

/// A one-record-in, N-records-out transform.
///
/// Wrap it in [`PerItem`] to get a full [`Stage`]. The adapter handles
/// iteration, failure forwarding, cancellation and the final flush.
pub trait ItemStage {
    fn name(&self) -> &str;

    /// Transform one input record. The returned outputs are pulled lazily,
    /// so one input may expand into an arbitrarily long run of records.
    ///
    /// Returning an error other than [`StageError::Cancelled`] fails only
    /// this record; the sequence carries on with the next one.
    fn process_one<'d>(&mut self, record: Record, dict: &'d Dict) -> Result<Outputs<'d>>;

    /// Called each time a sequence is built, before any record is pulled.
    /// Resets per-invocation state. An error here is a construction failure.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once after the upstream ends cleanly. Aggregating stages emit
    /// their last partial batch here.
    fn flush<'d>(&mut self, _dict: &'d Dict) -> Result<Outputs<'d>> {
        Ok(emit::none())
    }

    fn configure(&mut self, _blob: &[u8]) -> Result<()> {
        Ok(())
    }

    fn set_value(&mut self, setting: Setting) -> Result<()> {
        Err(setting.unsupported())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Adapter turning an [`ItemStage`] into a [`Stage`].
pub struct PerItem<S> {
    inner: S,
}

impl<S: ItemStage> PerItem<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ItemStage> Stage for PerItem<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        self.inner.configure(blob)
    }

    fn produce<'a>(
        &'a mut self,
        input: Option<RecordStream<'a>>,
        dict: &'a Dict,
    ) -> Result<RecordStream<'a>> {
        let Some(upstream) = input else {
            return Ok(Box::new(std::iter::empty()));
        };
        self.inner.begin()?;
        Ok(Box::new(ItemStream {
            stage: &mut self.inner,
            upstream,
            dict,
            current: None,
            state: State::Pulling,
        }))
    }

    fn set_value(&mut self, setting: Setting) -> Result<()> {
        self.inner.set_value(setting)
    }

    fn release(&mut self) -> Result<()> {
        self.inner.release()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pulling,
    Flushed,
    Done,
}

struct ItemStream<'a, S> {
    stage: &'a mut S,
    upstream: RecordStream<'a>,
    dict: &'a Dict,
    current: Option<Outputs<'a>>,
    state: State,
}

impl<S> ItemStream<'_, S> {
    fn stop(&mut self) -> Option<Entry> {
        self.state = State::Done;
        self.current = None;
        None
    }
}

impl<S: ItemStage> Iterator for ItemStream<'_, S> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            if self.state == State::Done {
                return None;
            }

            if let Some(outputs) = self.current.as_mut() {
                match outputs.next() {
                    Some(Err(StageError::Cancelled)) => return self.stop(),
                    Some(entry) => return Some(entry),
                    None => self.current = None,
                }
            }

            if self.state == State::Flushed {
                return self.stop();
            }

            match self.upstream.next() {
                Some(Ok(record)) => match self.stage.process_one(record, self.dict) {
                    Ok(outputs) => self.current = Some(outputs),
                    Err(StageError::Cancelled) => return self.stop(),
                    Err(err) => return Some(Err(err)),
                },
                Some(Err(StageError::Cancelled)) => return self.stop(),
                Some(Err(err)) => {
                    self.stop();
                    return Some(Err(err));
                }
                None => {
                    self.state = State::Flushed;
                    match self.stage.flush(self.dict) {
                        Ok(outputs) => self.current = Some(outputs),
                        Err(StageError::Cancelled) => return self.stop(),
                        Err(err) => {
                            self.stop();
                            return Some(Err(err));
                        }
                    }
                }
            }
        }
    }
}
