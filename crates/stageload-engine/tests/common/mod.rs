//! In-memory warehouse double for engine integration tests.
//!
//! `FakeWarehouse` answers the statements the engine issues (existence
//! checks, DDL, loads, result scans, validation, session tagging) from a
//! small mutable model, and logs every call with the query tag that was
//! active when it ran.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail};
use serde_json::json;
use stageload_engine::Session;
use stageload_types::value::{Row, SqlParam};

#[derive(Debug, Clone)]
pub struct Call {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StagedFile {
    pub rows: u64,
    /// (code, message, raw record) for each rejected row.
    pub rejected: Vec<(String, String, String)>,
}

#[derive(Default)]
struct State {
    tables: HashSet<String>,
    broken_tables: HashSet<String>,
    files: HashMap<String, StagedFile>,
    loaded: HashSet<String>,
    tag: Option<String>,
    last_query_id: Option<String>,
    query_files: HashMap<String, String>,
    results: HashMap<String, Vec<Row>>,
    next_query: u64,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeWarehouse {
    state: Mutex<State>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a file at `stage_path` (e.g. `@S3_RAW/ingest/orders.csv`).
    pub fn stage_file(&self, stage_path: &str, file: StagedFile) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(stage_path.to_string(), file);
    }

    /// Mark a staged file as already loaded by an earlier run.
    pub fn mark_loaded(&self, stage_path: &str) {
        self.state
            .lock()
            .unwrap()
            .loaded
            .insert(stage_path.to_string());
    }

    pub fn create_table(&self, fqn: &str) {
        self.state.lock().unwrap().tables.insert(fqn.to_string());
    }

    /// Make `CREATE TABLE` fail for `fqn`.
    pub fn break_table(&self, fqn: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_tables
            .insert(fqn.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn current_tag(&self) -> Option<String> {
        self.state.lock().unwrap().tag.clone()
    }

    pub fn has_table(&self, fqn: &str) -> bool {
        self.state.lock().unwrap().tables.contains(fqn)
    }
}

fn text_param(params: &[SqlParam], index: usize) -> anyhow::Result<String> {
    params
        .get(index)
        .and_then(SqlParam::to_text)
        .ok_or_else(|| anyhow!("missing bind parameter {index}"))
}

/// First single-quoted literal after `marker`, with doubled quotes undone.
fn literal_after(sql: &str, marker: &str) -> anyhow::Result<String> {
    let start = sql
        .find(marker)
        .ok_or_else(|| anyhow!("'{marker}' not found in: {sql}"))?
        + marker.len();
    let rest = sql[start..]
        .trim_start()
        .strip_prefix('\'')
        .ok_or_else(|| anyhow!("expected literal after '{marker}'"))?;
    let mut out = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                out.push('\'');
                continue;
            }
            return Ok(out);
        }
        out.push(ch);
    }
    bail!("unterminated literal after '{marker}'")
}

/// Table name following `keyword` up to the next space or parenthesis.
fn table_after(sql: &str, keyword: &str) -> anyhow::Result<String> {
    let start = sql
        .find(keyword)
        .ok_or_else(|| anyhow!("'{keyword}' not found"))?
        + keyword.len();
    Ok(sql[start..]
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_string())
}

impl Session for FakeWarehouse {
    fn execute(&self, sql: &str, params: &[SqlParam]) -> anyhow::Result<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        let tag = state.tag.clone();
        state.calls.push(Call {
            sql: sql.to_string(),
            params: params.to_vec(),
            tag,
        });

        if sql.starts_with("ALTER SESSION SET QUERY_TAG") {
            state.tag = Some(text_param(params, 0)?);
            return Ok(Vec::new());
        }
        if sql.starts_with("ALTER SESSION UNSET QUERY_TAG") {
            state.tag = None;
            return Ok(Vec::new());
        }
        if sql.contains("INFORMATION_SCHEMA.TABLES") {
            let database = table_after(sql, "FROM")?
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string();
            let fqn = format!(
                "{database}.{}.{}",
                text_param(params, 0)?.to_uppercase(),
                text_param(params, 1)?.to_uppercase()
            );
            return Ok(if state.tables.contains(&fqn) {
                vec![Row::from([("PRESENT".to_string(), json!(1))])]
            } else {
                Vec::new()
            });
        }
        if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            let fqn = table_after(sql, "EXISTS")?;
            if state.broken_tables.contains(&fqn) {
                bail!("SQL access control error: insufficient privileges on {fqn}");
            }
            state.tables.insert(fqn);
            return Ok(Vec::new());
        }
        if sql.starts_with("ALTER TABLE") {
            return Ok(Vec::new());
        }
        if sql.contains("INFER_SCHEMA") {
            return Ok(vec![
                Row::from([
                    ("COLUMN_NAME".to_string(), json!("ID")),
                    ("TYPE".to_string(), json!("NUMBER(38, 0)")),
                    ("NULLABLE".to_string(), json!(false)),
                ]),
                Row::from([
                    ("COLUMN_NAME".to_string(), json!("AMOUNT")),
                    ("TYPE".to_string(), json!("FLOAT")),
                    ("NULLABLE".to_string(), json!(true)),
                ]),
            ]);
        }
        if sql.starts_with("COPY INTO") {
            let path = literal_after(sql, "FROM")?;
            let file = state
                .files
                .get(&path)
                .cloned()
                .ok_or_else(|| anyhow!("Remote file '{path}' was not found"))?;
            state.next_query += 1;
            let query_id = format!("q-{}", state.next_query);

            let rows = if state.loaded.contains(&path) {
                vec![Row::from([(
                    "status".to_string(),
                    json!("Copy executed with 0 files processed."),
                )])]
            } else {
                state.loaded.insert(path.clone());
                let status = if file.rejected.is_empty() {
                    "LOADED"
                } else {
                    "PARTIALLY_LOADED"
                };
                vec![Row::from([
                    ("file".to_string(), json!(path)),
                    ("status".to_string(), json!(status)),
                    ("rows_parsed".to_string(), json!(file.rows + file.rejected.len() as u64)),
                    ("rows_loaded".to_string(), json!(file.rows)),
                    ("errors_seen".to_string(), json!(file.rejected.len())),
                ])]
            };
            state.query_files.insert(query_id.clone(), path);
            state.results.insert(query_id.clone(), rows);
            state.last_query_id = Some(query_id);
            return Ok(Vec::new());
        }
        if sql.starts_with("SELECT LAST_QUERY_ID") {
            let id = state.last_query_id.clone().unwrap_or_default();
            return Ok(vec![Row::from([("QUERY_ID".to_string(), json!(id))])]);
        }
        if sql.contains("RESULT_SCAN") {
            let id = literal_after(sql, "RESULT_SCAN(")?;
            return state
                .results
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("unknown query id {id}"));
        }
        if sql.contains("TABLE(VALIDATE(") {
            let id = literal_after(sql, "JOB_ID =>")?;
            let already_loaded = state.results.get(&id).is_some_and(|rows| {
                rows.iter().any(|r| r.get("status").is_some_and(|s| {
                    s.as_str().is_some_and(|s| s.contains("0 files processed"))
                }))
            });
            if already_loaded {
                return Ok(Vec::new());
            }
            let path = state
                .query_files
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("unknown job id {id}"))?;
            let file = state.files.get(&path).cloned().unwrap_or_default();
            return Ok(file
                .rejected
                .iter()
                .enumerate()
                .map(|(i, (code, message, raw))| {
                    Row::from([
                        ("ERROR".to_string(), json!(message)),
                        ("FILE".to_string(), json!(path)),
                        ("LINE".to_string(), json!(i + 2)),
                        ("CODE".to_string(), json!(code)),
                        ("REJECTED_RECORD".to_string(), json!(raw)),
                    ])
                })
                .collect());
        }

        bail!("unexpected statement: {sql}")
    }
}
