//! Broadcast one word list to two stages: a printer and a letter counter.

use std::cell::Cell;
use std::rc::Rc;

use stageline::stages::Head;
use stageline::{
    Dict, FanOut, ItemStage, Outputs, PerItem, Pipe, Record, Result, Stage, StringArraySource,
    emit,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

struct Print;

impl ItemStage for Print {
    fn name(&self) -> &str {
        "print"
    }

    fn process_one<'d>(&mut self, record: Record, dict: &'d Dict) -> Result<Outputs<'d>> {
        let word = String::from_utf8_lossy(&record);
        println!("{}", dict.render(&format!("{{prefix}} {word}")));
        Ok(emit::one(record))
    }
}

struct CountLetters {
    total: Rc<Cell<usize>>,
}

impl ItemStage for CountLetters {
    fn name(&self) -> &str {
        "count_letters"
    }

    fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
        self.total.set(self.total.get() + record.len());
        Ok(emit::none())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .from_env_lossy(),
        )
        .init();

    let total = Rc::new(Cell::new(0));
    let mut pipe = Pipe::new("fan_out_demo")
        .with(StringArraySource::new([
            "alpha", "beta", "gamma", "delta", "epsilon",
        ]))
        .with(PerItem::new(Head::new(4)))
        .with(
            FanOut::new("broadcast")
                .with(PerItem::new(Print))
                .with(PerItem::new(CountLetters {
                    total: Rc::clone(&total),
                })),
        );

    let dict = Dict::new().with("prefix", "->");
    for entry in pipe.produce(None, &dict)? {
        entry?;
    }
    println!("letters in the first four words: {}", total.get());

    pipe.release()
}
