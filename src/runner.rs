use crate::{Dict, Record, RecordStream, Result, Stage, StageError};
use std::time::{Duration, Instant};

/// What the runner does with a failed entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop at the first failure and return it.
    #[default]
    Abort,
    /// Count the failure and keep pulling.
    Continue,
}

/// Passed to the `on_record` hook for each successful record.
pub struct RecordEvent<'a> {
    pub stage: &'a str,
    pub record: &'a [u8],
    /// Time spent pulling this entry.
    pub duration: Duration,
    /// Position in the sequence, failures included.
    pub index: usize,
}

/// Passed to the `on_error` hook for each failed entry and for construction
/// failures.
pub struct ErrorEvent<'a> {
    pub stage: &'a str,
    pub error: &'a StageError,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: usize,
    pub failures: usize,
    pub elapsed: Duration,
    /// Successful records, kept only with `collect(true)`.
    pub outputs: Vec<Record>,
}

/// Drains a stage's output sequence under an error policy.
pub struct Runner<S: Stage> {
    stage: S,
    policy: ErrorPolicy,
    limit: Option<usize>,
    collect: bool,
    on_record: Option<Box<dyn FnMut(&RecordEvent)>>,
    on_error: Option<Box<dyn FnMut(&ErrorEvent)>>,
}

impl<S: Stage> Runner<S> {
    pub fn new(stage: S) -> Self {
        Self {
            stage,
            policy: ErrorPolicy::default(),
            limit: None,
            collect: false,
            on_record: None,
            on_error: None,
        }
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop pulling after `limit` successful records.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Keep successful records in [`RunSummary::outputs`].
    pub fn collect(mut self, collect: bool) -> Self {
        self.collect = collect;
        self
    }

    /// Register a callback that fires after each successful record.
    pub fn on_record(mut self, cb: impl FnMut(&RecordEvent) + 'static) -> Self {
        self.on_record = Some(Box::new(cb));
        self
    }

    /// Register a callback that fires for each failure.
    pub fn on_error(mut self, cb: impl FnMut(&ErrorEvent) + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Set both hooks to log records and failures through `tracing`.
    pub fn with_tracing(self) -> Self {
        self.on_record(|e| {
            tracing::info!(
                stage = e.stage,
                index = e.index,
                bytes = e.record.len(),
                secs = e.duration.as_secs_f64(),
                "record"
            );
        })
        .on_error(|e| {
            tracing::warn!(stage = e.stage, index = e.index, error = %e.error, "failed entry");
        })
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    pub fn run<'a>(
        &'a mut self,
        input: Option<RecordStream<'a>>,
        dict: &'a Dict,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let name = self.stage.name().to_string();

        let stream = match self.stage.produce(input, dict) {
            Ok(stream) => stream,
            Err(err) => {
                if let Some(cb) = &mut self.on_error {
                    cb(&ErrorEvent {
                        stage: &name,
                        error: &err,
                        index: 0,
                    });
                }
                return Err(err);
            }
        };

        let mut summary = RunSummary::default();
        let mut pulled = Instant::now();
        for entry in stream {
            let index = summary.records + summary.failures;
            let duration = pulled.elapsed();

            match entry {
                Ok(record) => {
                    summary.records += 1;
                    if let Some(cb) = &mut self.on_record {
                        cb(&RecordEvent {
                            stage: &name,
                            record: &record,
                            duration,
                            index,
                        });
                    }
                    if self.collect {
                        summary.outputs.push(record);
                    }
                    if self.limit.is_some_and(|limit| summary.records >= limit) {
                        break;
                    }
                }
                Err(StageError::Cancelled) => break,
                Err(err) => {
                    summary.failures += 1;
                    if let Some(cb) = &mut self.on_error {
                        cb(&ErrorEvent {
                            stage: &name,
                            error: &err,
                            index,
                        });
                    }
                    if self.policy == ErrorPolicy::Abort {
                        return Err(err);
                    }
                }
            }
            pulled = Instant::now();
        }

        summary.elapsed = start.elapsed();
        Ok(summary)
    }

    pub fn release(&mut self) -> Result<()> {
        self.stage.release()
    }
}
