use crate::error::{Result, StageError};
use crate::stage::release_all;
use crate::{Dict, RecordStream, Stage};

/// Sequential composition: the output of stage *i* feeds stage *i + 1*.
///
/// Building the pipe's sequence runs no stage; work starts only when the
/// returned sequence is pulled. Stages are configured individually before
/// they are added.
pub struct Pipe {
    name: String,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn add<S: Stage + 'static>(&mut self, stage: S) {
        self.stages.push(Box::new(stage));
    }

    /// Chain a stage, builder style.
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

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name())
    }
}

impl Stage for Pipe {
    fn name(&self) -> &str {
        &self.name
    }

    /// A pipe has no configuration of its own.
    fn configure(&mut self, _blob: &[u8]) -> Result<()> {
        Err(StageError::NotImplemented)
    }

    fn produce<'a>(
        &'a mut self,
        input: Option<RecordStream<'a>>,
        dict: &'a Dict,
    ) -> Result<RecordStream<'a>> {
        let mut seq = input;
        for stage in self.stages.iter_mut() {
            seq = Some(stage.produce(seq, dict)?);
        }
        Ok(seq.unwrap_or_else(|| Box::new(std::iter::empty())))
    }

    fn release(&mut self) -> Result<()> {
        release_all(self.stages.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Entry, StringArraySource};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every call it receives into a shared log.
    struct Logged {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        fail_release: bool,
        fail_produce: bool,
    }

    impl Logged {
        fn new(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name,
                log: Rc::clone(log),
                fail_release: false,
                fail_produce: false,
            }
        }
    }

    impl Stage for Logged {
        fn name(&self) -> &str {
            self.name
        }

        fn produce<'a>(
            &'a mut self,
            input: Option<RecordStream<'a>>,
            _dict: &'a Dict,
        ) -> Result<RecordStream<'a>> {
            self.log.borrow_mut().push(format!("produce {}", self.name));
            if self.fail_produce {
                return Err(StageError::config(format!("{} misconfigured", self.name)));
            }
            let log = Rc::clone(&self.log);
            let name = self.name;
            let input = input.unwrap_or_else(|| Box::new(std::iter::empty()));
            Ok(Box::new(input.inspect(move |_| {
                log.borrow_mut().push(format!("pull {name}"));
            })))
        }

        fn release(&mut self) -> Result<()> {
            self.log.borrow_mut().push(format!("release {}", self.name));
            if self.fail_release {
                return Err(StageError::other(format!("{} release failed", self.name)));
            }
            Ok(())
        }
    }

    #[test]
    fn empty_pipe_passes_input_through() {
        let mut pipe = Pipe::new("empty");
        let dict = Dict::new();
        let input: RecordStream = Box::new(vec![Ok(b"x".to_vec())].into_iter());
        let out: Vec<Entry> = pipe.produce(Some(input), &dict).unwrap().collect();
        assert_eq!(out.len(), 1);
        assert_eq!(pipe.produce(None, &dict).unwrap().count(), 0);
    }

    #[test]
    fn produce_does_not_pull() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pipe = Pipe::new("lazy")
            .with(StringArraySource::new(["a", "b"]))
            .with(Logged::new("p1", &log))
            .with(Logged::new("p2", &log));
        let dict = Dict::new();

        let mut seq = pipe.produce(None, &dict).unwrap();
        assert_eq!(*log.borrow(), vec!["produce p1", "produce p2"]);

        seq.next().unwrap().unwrap();
        drop(seq);
        assert_eq!(
            *log.borrow(),
            vec!["produce p1", "produce p2", "pull p1", "pull p2"]
        );
    }

    #[test]
    fn construction_error_aborts() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut broken = Logged::new("p2", &log);
        broken.fail_produce = true;
        let mut pipe = Pipe::new("broken")
            .with(Logged::new("p1", &log))
            .with(broken)
            .with(Logged::new("p3", &log));
        let dict = Dict::new();

        let err = pipe.produce(None, &dict).err().unwrap();
        assert!(matches!(err, StageError::Config(msg) if msg == "p2 misconfigured"));
        assert_eq!(*log.borrow(), vec!["produce p1", "produce p2"]);
    }

    #[test]
    fn release_reaches_every_stage_and_reports_first_failure() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut second = Logged::new("p2", &log);
        second.fail_release = true;
        let mut third = Logged::new("p3", &log);
        third.fail_release = true;

        let mut pipe = Pipe::new("teardown")
            .with(Logged::new("p1", &log))
            .with(second)
            .with(third);

        let err = pipe.release().unwrap_err();
        assert_eq!(err.to_string(), "p2 release failed");
        assert_eq!(*log.borrow(), vec!["release p1", "release p2", "release p3"]);
    }

    #[test]
    fn configure_not_implemented() {
        let mut pipe = Pipe::new("p");
        assert!(matches!(pipe.configure(b"{}"), Err(StageError::NotImplemented)));
    }

    #[test]
    fn reports_names_and_len() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pipe = Pipe::new("p")
            .with(Logged::new("a", &log))
            .with(Logged::new("b", &log));
        assert_eq!(pipe.len(), 2);
        assert!(!pipe.is_empty());
        assert_eq!(pipe.stage_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
