use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Native, RcIter};
use jaq_json::Val;
use serde::Deserialize;

use crate::error::{Result, StageError};
use crate::per_item::{ItemStage, Outputs, emit};
use crate::{Dict, Entry, Record, Setting};

type Filter = jaq_core::Filter<Native<Val>>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JqConfig {
    pub query: String,
}

fn compile(query: &str) -> Result<Filter> {
    let program = File {
        code: query,
        path: (),
    };
    let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = Arena::default();
    let modules = loader.load(&arena, program).map_err(|errs| {
        StageError::config(format!("jq: cannot parse {query:?} ({} errors)", errs.len()))
    })?;
    Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| {
            StageError::config(format!("jq: cannot compile {query:?} ({} errors)", errs.len()))
        })
}

fn run(filter: &Filter, input: serde_json::Value) -> Vec<Entry> {
    let inputs = RcIter::new(core::iter::empty());
    filter
        .run((Ctx::new([], &inputs), Val::from(input)))
        .map(|out| match out {
            Ok(val) => Ok(val.to_string().into_bytes()),
            Err(err) => Err(StageError::invalid(format!("jq: {err}"))),
        })
        .collect()
}

/// Runs a jq query over each JSON record and emits one record per result.
///
/// Without a query records pass through untouched. A record that is not
/// JSON, or a result that is a jq error, fails on its own.
#[derive(Default)]
pub struct JqStage {
    query: String,
    filter: Option<Filter>,
}

impl JqStage {
    pub fn new(query: &str) -> Result<Self> {
        let mut stage = Self::default();
        stage.set_query(query)?;
        Ok(stage)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    fn set_query(&mut self, query: &str) -> Result<()> {
        self.filter = if query.is_empty() {
            None
        } else {
            Some(compile(query)?)
        };
        self.query = query.to_string();
        Ok(())
    }
}

impl ItemStage for JqStage {
    fn name(&self) -> &str {
        "jq"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        if blob.is_empty() {
            return Ok(());
        }
        let conf: JqConfig = serde_json::from_slice(blob)?;
        self.set_query(&conf.query)
    }

    fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
        let Some(filter) = &self.filter else {
            return Ok(emit::one(record));
        };
        let input: serde_json::Value = serde_json::from_slice(&record)?;
        Ok(emit::from_iter(run(filter, input)))
    }

    /// Takes [`Setting::Jq`].
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::Jq(query) => self.set_query(&query),
            other => Err(other.unsupported()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PerItem, Pipe, Stage, StringArraySource};

    fn texts(out: Vec<Entry>) -> Vec<String> {
        out.into_iter()
            .map(|e| match e {
                Ok(r) => String::from_utf8(r).unwrap(),
                Err(err) => format!("ERR {err}"),
            })
            .collect()
    }

    fn run_over(stage: JqStage, records: &[&str]) -> Vec<Entry> {
        let mut pipe = Pipe::new("jq")
            .with(StringArraySource::new(records.iter().copied()))
            .with(PerItem::new(stage));
        let dict = Dict::new();
        pipe.produce(None, &dict).unwrap().collect()
    }

    #[test]
    fn field_lookup_per_record() {
        let mut stage = JqStage::new("").unwrap();
        stage.set_value(Setting::Jq(".foo".into())).unwrap();

        let out = run_over(
            stage,
            &[
                r#"{"foo": 111, "bar": 222}"#,
                r#"{"foo": "bar", "bar": "zoo"}"#,
                r#"{"data": {"a": 1, "b": 2}}"#,
            ],
        );
        assert_eq!(texts(out), vec!["111", "\"bar\"", "null"]);
    }

    #[test]
    fn one_record_per_result() {
        let stage = JqStage::new(".data[]").unwrap();
        let out = run_over(stage, &[r#"{"data": [1, 2, 3]}"#, r#"{"data": ["x"]}"#]);
        assert_eq!(texts(out), vec!["1", "2", "3", "\"x\""]);
    }

    #[test]
    fn invalid_json_fails_record() {
        let stage = JqStage::new(".a").unwrap();
        let out = run_over(stage, &["not json", r#"{"a": true}"#]);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(StageError::Json(_))));
        assert_eq!(out[1].as_ref().unwrap(), b"true");
    }

    #[test]
    fn runtime_error_fails_that_result() {
        let stage = JqStage::new(".a + 1").unwrap();
        let out = run_over(stage, &[r#"{"a": "x"}"#, r#"{"a": 1}"#]);
        assert!(matches!(&out[0], Err(StageError::Invalid(msg)) if msg.starts_with("jq: ")));
        assert_eq!(out[1].as_ref().unwrap(), b"2");
    }

    #[test]
    fn empty_query_passes_records_through() {
        let stage = JqStage::default();
        let out = run_over(stage, &["not even json"]);
        assert_eq!(texts(out), vec!["not even json"]);
    }

    #[test]
    fn bad_query_is_a_config_error() {
        assert!(matches!(JqStage::new(".[["), Err(StageError::Config(_))));

        let mut stage = PerItem::new(JqStage::default());
        stage.configure(br#"{"query": ".b"}"#).unwrap();
        assert_eq!(stage.inner().query(), ".b");
        assert!(stage.set_value(Setting::Limit(1)).is_err());
    }
}
