use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{Result, StageError};
use crate::stage::release_all;
use crate::{Dict, Entry, Record, RecordStream, Stage};

/// Broadcast group: every member observes the same input, in the same
/// order, for its side effects. Member outputs are discarded.
///
/// Every member's sequence is built when the group's is, so a member that
/// cannot be built fails the group at once. On the first pull the members
/// are drained round-robin, so members whose work lives in their lazy
/// generation loop (writers, for instance) really run. The shared input is
/// read once and queued only as far as the slowest live member lags behind.
pub struct FanOut {
    name: String,
    stages: Vec<Box<dyn Stage>>,
}

impl FanOut {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn add<S: Stage + 'static>(&mut self, stage: S) {
        self.stages.push(Box::new(stage));
    }

    pub fn with<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.add(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Stage for FanOut {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, _blob: &[u8]) -> Result<()> {
        Err(StageError::NotImplemented)
    }

    fn produce<'a>(
        &'a mut self,
        input: Option<RecordStream<'a>>,
        dict: &'a Dict,
    ) -> Result<RecordStream<'a>> {
        let tee = input.map(|upstream| Tee::shared(upstream, self.stages.len()));

        let mut members = Vec::with_capacity(self.stages.len());
        for (id, stage) in self.stages.iter_mut().enumerate() {
            let name = stage.name().to_string();
            let replay = tee.as_ref().map(|tee| {
                Box::new(Replay {
                    tee: Rc::clone(tee),
                    id,
                }) as RecordStream<'a>
            });
            let output = stage.produce(replay, dict)?;
            members.push(Member {
                name,
                output: Some(output),
                failures: 0,
            });
        }

        Ok(Box::new(Broadcast {
            group: self.name.clone(),
            members,
            tee,
            finished: false,
        }))
    }

    fn release(&mut self) -> Result<()> {
        release_all(self.stages.iter_mut())
    }
}

/// The shared input, read once and queued per member.
struct Tee<'a> {
    /// `None` once the input ended, failed, or nobody reads it any more.
    upstream: Option<RecordStream<'a>>,
    /// Records a member has yet to see; `None` once the member left.
    queues: Vec<Option<VecDeque<Record>>>,
    failure: Option<StageError>,
}

impl<'a> Tee<'a> {
    fn shared(upstream: RecordStream<'a>, members: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            upstream: Some(upstream),
            queues: vec![Some(VecDeque::new()); members],
            failure: None,
        }))
    }

    fn next_for(&mut self, id: usize) -> Option<Record> {
        if let Some(record) = self.queues[id].as_mut().and_then(VecDeque::pop_front) {
            return Some(record);
        }

        let upstream = self.upstream.as_mut()?;
        match upstream.next() {
            Some(Ok(record)) => {
                for (other, queue) in self.queues.iter_mut().enumerate() {
                    if other == id {
                        continue;
                    }
                    if let Some(queue) = queue {
                        queue.push_back(record.clone());
                    }
                }
                Some(record)
            }
            Some(Err(StageError::Cancelled)) | None => {
                self.upstream = None;
                None
            }
            // members see a clean end; the failure is the group's only entry
            Some(Err(err)) => {
                self.upstream = None;
                self.failure = Some(err);
                None
            }
        }
    }

    fn leave(&mut self, id: usize) {
        self.queues[id] = None;
        if self.queues.iter().all(Option::is_none) {
            self.upstream = None;
        }
    }
}

/// One member's view of the shared input.
struct Replay<'a> {
    tee: Rc<RefCell<Tee<'a>>>,
    id: usize,
}

impl Iterator for Replay<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.tee.borrow_mut().next_for(self.id).map(Ok)
    }
}

impl Drop for Replay<'_> {
    fn drop(&mut self) {
        if let Ok(mut tee) = self.tee.try_borrow_mut() {
            tee.leave(self.id);
        }
    }
}

struct Member<'a> {
    name: String,
    output: Option<RecordStream<'a>>,
    failures: usize,
}

struct Broadcast<'a> {
    group: String,
    members: Vec<Member<'a>>,
    tee: Option<Rc<RefCell<Tee<'a>>>>,
    finished: bool,
}

impl Broadcast<'_> {
    /// Pull one entry from every live member. False once all are drained.
    fn step(&mut self) -> bool {
        let mut live = false;
        for member in &mut self.members {
            let Some(output) = member.output.as_mut() else {
                continue;
            };
            match output.next() {
                Some(Ok(_)) => live = true,
                Some(Err(err)) if !err.is_cancelled() => {
                    member.failures += 1;
                    tracing::warn!(group = %self.group, stage = %member.name, error = %err, "fan-out member failure");
                    live = true;
                }
                _ => {
                    // dropping the output releases the member's place in the tee
                    member.output = None;
                    tracing::debug!(group = %self.group, stage = %member.name, failures = member.failures, "fan-out member drained");
                }
            }
        }
        live
    }
}

impl Iterator for Broadcast<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.finished {
            return None;
        }
        self.finished = true;
        while self.step() {}

        let failure = self.tee.take().and_then(|tee| {
            let mut tee = tee.borrow_mut();
            tee.failure.take()
        });
        failure.map(Err)
    }
}
