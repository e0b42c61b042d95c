//! Schema Description
//!
//! Renders introspected metadata into the text the language model sees: one
//! `CREATE TABLE` block per table, optionally followed by a few sample rows.
//! A description is built once per connect and shared immutably afterwards.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::engine::{QueryResult, Session, TableInfo};
use crate::error::Result;

/// Sample values longer than this are truncated
const MAX_SAMPLE_VALUE_CHARS: usize = 100;

/// Text snapshot of the connected database's tables and columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescription(Arc<str>);

impl SchemaDescription {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SchemaDescription {
    fn from(text: String) -> Self {
        Self(Arc::from(text))
    }
}

impl std::fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Introspect a session and render its schema description
///
/// Returns the table count alongside the text. A failing sample query is logged
/// and the table is described without samples.
pub async fn describe<S: Session>(
    session: &S,
    sample_rows: usize,
) -> Result<(SchemaDescription, usize)> {
    let info = session.introspect().await?;

    let mut blocks = Vec::with_capacity(info.tables.len());
    for table in &info.tables {
        let sample = if sample_rows == 0 {
            None
        } else {
            match session.sample_rows(&table.name, sample_rows).await {
                Ok(sample) => Some(sample),
                Err(e) => {
                    tracing::warn!(table = %table.name, error = %e, "skipping sample rows");
                    None
                }
            }
        };
        blocks.push(render_table(table, sample.as_ref()));
    }

    Ok((SchemaDescription::from(blocks.join("\n\n")), info.tables.len()))
}

fn render_table(table: &TableInfo, sample: Option<&QueryResult>) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let null = if col.nullable { "" } else { " NOT NULL" };
            format!("\t{} {}{null}", col.name, col.data_type)
        })
        .collect();

    if !table.primary_key.is_empty() {
        lines.push(format!("\tPRIMARY KEY ({})", table.primary_key.join(", ")));
    }

    for fk in &table.foreign_keys {
        lines.push(format!(
            "\tFOREIGN KEY({}) REFERENCES {} ({})",
            fk.columns.join(", "),
            fk.referenced_table,
            fk.referenced_columns.join(", ")
        ));
    }

    let mut out = format!("CREATE TABLE {} (\n{}\n)", table.name, lines.join(", \n"));

    if let Some(sample) = sample {
        let _ = write!(
            out,
            "\n\n/*\n{} rows from {} table:\n{}",
            sample.rows.len(),
            table.name,
            sample.columns.join("\t")
        );
        for row in &sample.rows {
            let values: Vec<String> = sample
                .columns
                .iter()
                .map(|c| row.get(c).map_or_else(|| "NULL".to_string(), render_sample_value))
                .collect();
            let _ = write!(out, "\n{}", values.join("\t"));
        }
        out.push_str("\n*/");
    }

    out
}

fn render_sample_value(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::Null => return "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.chars().count() > MAX_SAMPLE_VALUE_CHARS {
        let truncated: String = text.chars().take(MAX_SAMPLE_VALUE_CHARS).collect();
        format!("{truncated}...")
    } else {
        text
    }
}
