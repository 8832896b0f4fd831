//! Chunk plain-text books into paragraphs and store them in SQLite.
//!
//! ```text
//! cargo run --example novel_to_sqlite -- books.db book1.txt book2.txt
//! ```
//!
//! With no book arguments a small sample book is written to a temp dir.

use std::io::Write;

use stageline::stages::{DbWriter, NovelChunkerStage, query_rows};
use stageline::{Dict, ErrorPolicy, PerItem, Pipe, Runner, Stage, StringArraySource};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const SAMPLE: &str = "Chapter one begins.\nIt was a dark night.\n\nThe rain fell.\n\n\nChapter two.\n";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(|| ":memory:".to_string());
    let mut books: Vec<String> = args.collect();

    let sample_dir = tempfile::tempdir()?;
    if books.is_empty() {
        let path = sample_dir.path().join("sample.txt");
        std::fs::File::create(&path)?.write_all(SAMPLE.as_bytes())?;
        books.push(path.display().to_string());
    }

    let requests: Vec<String> = books
        .iter()
        .map(|path| serde_json::json!({"data": {"url": format!("file://{path}")}}).to_string())
        .collect();

    let mut chunker = PerItem::new(NovelChunkerStage::new());
    chunker.configure(br#"{"string_mode": true}"#)?;

    let mut writer = PerItem::new(DbWriter::new());
    writer.configure(
        serde_json::json!({"path": db_path, "table": "chunks"})
            .to_string()
            .as_bytes(),
    )?;
    if let Some(conn) = writer.inner().connection() {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (num1 TEXT, num2 TEXT, path TEXT, title TEXT, text TEXT)",
        )?;
    }

    let pipe = Pipe::new("novel_to_sqlite")
        .with(StringArraySource::new(requests))
        .with(chunker)
        .with(writer);

    let mut runner = Runner::new(pipe)
        .with_policy(ErrorPolicy::Continue)
        .with_tracing();
    let dict = Dict::new();
    let summary = runner.run(None, &dict)?;
    println!(
        "{} books stored, {} failed, in {:.3}s",
        summary.records,
        summary.failures,
        summary.elapsed.as_secs_f64()
    );

    if db_path == ":memory:" {
        println!("(in-memory database, nothing persisted)");
    } else {
        let conn = rusqlite::Connection::open(&db_path)?;
        for row in query_rows(&conn, "SELECT num1, num2, text FROM chunks LIMIT 5")? {
            println!("{}.{} {}", row[0], row[1], row[2]);
        }
    }

    runner.release()?;
    Ok(())
}
