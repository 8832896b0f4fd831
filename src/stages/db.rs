use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StageError};
use crate::per_item::{ItemStage, Outputs, emit};
use crate::stage::ProjectionFn;
use crate::{Dict, Record, Setting, payload};

/// Configuration shared by the database stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// SQLite file. Empty or `:memory:` opens a private in-memory database.
    pub path: String,
    /// Target table for the writer.
    pub table: String,
    /// Statement template; `{key}` placeholders are filled from the side
    /// dictionary.
    pub qtemplate: String,
}

/// Open (or create) the database named in `conf`.
pub fn open_database(conf: &DbConfig) -> Result<Connection> {
    let conn = match conf.path.as_str() {
        "" | ":memory:" => Connection::open_in_memory()?,
        path => Connection::open(Path::new(path))?,
    };
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn close(conn: Option<Connection>) -> Result<()> {
    match conn {
        Some(conn) => conn.close().map_err(|(_, err)| err.into()),
        None => Ok(()),
    }
}

fn not_configured(stage: &str) -> StageError {
    StageError::config(format!("{stage}: database not configured"))
}

fn cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

/// Run `sql` and render every column of every row as text.
pub fn query_rows(conn: &Connection, sql: &str) -> Result<Vec<Vec<String>>> {
    let mut stmt = conn.prepare(sql)?;
    let ncol = stmt.column_count();
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cols = Vec::with_capacity(ncol);
        for i in 0..ncol {
            cols.push(cell(row.get_ref(i)?));
        }
        out.push(cols);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// DbQuery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DbQueryInput {
    /// `exec` runs a statement batch; anything else runs a query.
    pub mode: String,
    pub data: String,
}

/// Runs the SQL carried by each input record.
///
/// Input: `{"mode": "exec" | "", "data": "<sql>"}`; an empty `data` falls
/// back to the configured template. Output: `{"data": [[col, ..], ..]}`.
#[derive(Default)]
pub struct DbQuery {
    conf: DbConfig,
    conn: Option<Connection>,
}

impl DbQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }
}

impl ItemStage for DbQuery {
    fn name(&self) -> &str {
        "db_query"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        self.conf = serde_json::from_slice(blob)?;
        close(self.conn.take())?;
        self.conn = Some(open_database(&self.conf)?);
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.conn.is_none() {
            return Err(not_configured(self.name()));
        }
        Ok(())
    }

    fn process_one<'d>(&mut self, record: Record, dict: &'d Dict) -> Result<Outputs<'d>> {
        let input: DbQueryInput = serde_json::from_slice(&record)?;
        let template = if input.data.is_empty() {
            &self.conf.qtemplate
        } else {
            &input.data
        };
        if template.is_empty() {
            return Err(StageError::invalid("empty query"));
        }
        let sql = dict.render(template);

        let conn = self.conn.as_ref().ok_or_else(|| not_configured("db_query"))?;
        let rows = if input.mode == "exec" {
            conn.execute_batch(&sql)?;
            Vec::new()
        } else {
            query_rows(conn, &sql)?
        };
        Ok(emit::one(payload::wrap(&rows)?))
    }

    /// Takes [`Setting::Query`], replacing the statement template.
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::Query(template) => {
                self.conf.qtemplate = template;
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }

    fn release(&mut self) -> Result<()> {
        close(self.conn.take())
    }
}

// ---------------------------------------------------------------------------
// DbWriter
// ---------------------------------------------------------------------------

/// Inserts the rows of each input record in one transaction.
///
/// Input: `{"data": [[col, ..], ..]}`. Output: `{"data": <rows written>}`.
/// Every row must have the width of the first one after projection.
#[derive(Default)]
pub struct DbWriter {
    conf: DbConfig,
    conn: Option<Connection>,
    projection: Option<ProjectionFn>,
}

impl DbWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    fn statement(&self, ncols: usize, dict: &Dict) -> String {
        if !self.conf.qtemplate.is_empty() {
            return dict.render(&self.conf.qtemplate);
        }
        let marks = vec!["?"; ncols].join(",");
        format!("INSERT INTO {} VALUES ({marks})", self.conf.table)
    }
}

impl ItemStage for DbWriter {
    fn name(&self) -> &str {
        "db_writer"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        let conf: DbConfig = serde_json::from_slice(blob)?;
        if conf.table.is_empty() && conf.qtemplate.is_empty() {
            return Err(StageError::config("table name is empty"));
        }
        self.conf = conf;
        close(self.conn.take())?;
        self.conn = Some(open_database(&self.conf)?);
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.conn.is_none() {
            return Err(not_configured(self.name()));
        }
        Ok(())
    }

    fn process_one<'d>(&mut self, record: Record, dict: &'d Dict) -> Result<Outputs<'d>> {
        let mut rows: Vec<Vec<String>> = payload::unwrap(&record)?;
        if let Some(project) = &self.projection {
            rows = rows.into_iter().map(project.as_ref()).collect();
        }
        let Some(first) = rows.first() else {
            return Ok(emit::none());
        };
        let ncols = first.len();
        if ncols == 0 {
            return Err(StageError::invalid("no columns"));
        }
        if let Some(bad) = rows.iter().find(|row| row.len() != ncols) {
            return Err(StageError::invalid(format!(
                "row has {} columns, expected {ncols}",
                bad.len()
            )));
        }

        let sql = self.statement(ncols, dict);
        let conn = self.conn.as_mut().ok_or_else(|| not_configured("db_writer"))?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &rows {
                tracing::debug!(?row, "db writer row");
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        Ok(emit::one(payload::wrap(&rows.len())?))
    }

    /// Takes [`Setting::Projection`].
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::Projection(project) => {
                self.projection = Some(project);
                Ok(())
            }
            other => Err(other.unsupported()),
        }
    }

    fn release(&mut self) -> Result<()> {
        close(self.conn.take())
    }
}
