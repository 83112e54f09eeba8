//! Output formatting for query results
//!
//! Supports multiple output formats:
//! - Table: Pretty-printed ASCII table (default)
//! - CSV: Comma-separated values
//! - JSON: JSON array of objects, keys in column order
//! - Vertical: One column per line (useful for wide results)

use crate::projector::{ResultProjector, Row, ScalarValue};
use crate::query::QueryOutput;
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::arrow::util::pretty::pretty_format_batches;
use std::io::{self, Write};

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty-printed ASCII table
    #[default]
    Table,
    /// Comma-separated values
    Csv,
    /// JSON array of objects
    Json,
    /// Vertical format (one column per line)
    Vertical,
}

impl OutputFormat {
    /// Parse format from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" | "t" => Some(Self::Table),
            "csv" | "c" => Some(Self::Csv),
            "json" | "j" => Some(Self::Json),
            "vertical" | "v" => Some(Self::Vertical),
            _ => None,
        }
    }

    /// Name as accepted by `from_str`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Vertical => "vertical",
        }
    }

    /// Get all format names for help text
    pub fn all_names() -> &'static [&'static str] {
        &["table", "csv", "json", "vertical"]
    }
}

/// Formatter for outputting query results in various formats
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter {
    format: OutputFormat,
    max_rows: Option<usize>,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            max_rows: None,
        }
    }

    /// Set maximum rows to display
    pub fn with_max_rows(mut self, max: usize) -> Self {
        self.max_rows = Some(max);
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format a query result and write to stdout
    pub fn print(&self, output: &QueryOutput) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        self.write(&mut stdout, output)
    }

    /// Format a query result and write to the given writer
    pub fn write<W: Write>(&self, writer: &mut W, output: &QueryOutput) -> io::Result<()> {
        if self.format == OutputFormat::Table {
            return self.write_table(writer, &output.batches);
        }

        let rows = ResultProjector::project(&output.schema, &output.batches)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        match self.format {
            OutputFormat::Csv => self.write_csv(writer, &rows),
            OutputFormat::Json => self.write_json(writer, &rows),
            _ => self.write_vertical(writer, &rows),
        }
    }

    /// Format as string
    pub fn format_to_string(&self, output: &QueryOutput) -> String {
        let mut buffer = Vec::new();
        let _ = self.write(&mut buffer, output);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn visible<'a>(&self, rows: &'a [Row]) -> &'a [Row] {
        match self.max_rows {
            Some(max) if max < rows.len() => &rows[..max],
            _ => rows,
        }
    }

    /// Write as pretty-printed table
    fn write_table<W: Write>(&self, writer: &mut W, batches: &[RecordBatch]) -> io::Result<()> {
        if batches.is_empty() {
            return Ok(());
        }

        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        let shown = match self.max_rows {
            Some(max) if max < total => limit_batches(batches, max),
            _ => batches.to_vec(),
        };

        let display = pretty_format_batches(&shown)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        writeln!(writer, "{}", display)?;

        let remaining = total - shown.iter().map(|b| b.num_rows()).sum::<usize>();
        if remaining > 0 {
            writeln!(writer, "... ({} more rows)", remaining)?;
        }
        Ok(())
    }

    fn write_csv<W: Write>(&self, writer: &mut W, rows: &[Row]) -> io::Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };

        let headers: Vec<String> = first.columns().iter().map(|c| csv_field(c)).collect();
        writeln!(writer, "{}", headers.join(","))?;

        for row in self.visible(rows) {
            let values: Vec<String> = row
                .values()
                .iter()
                .map(|value| match value {
                    ScalarValue::Null => String::new(),
                    other => csv_field(&other.to_string()),
                })
                .collect();
            writeln!(writer, "{}", values.join(","))?;
        }
        Ok(())
    }

    fn write_json<W: Write>(&self, writer: &mut W, rows: &[Row]) -> io::Result<()> {
        let shown = self.visible(rows);
        if shown.is_empty() {
            writeln!(writer, "[]")?;
            return Ok(());
        }

        writeln!(writer, "[")?;
        for (idx, row) in shown.iter().enumerate() {
            let object = serde_json::to_string(row)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let separator = if idx + 1 < shown.len() { "," } else { "" };
            writeln!(writer, "  {}{}", object, separator)?;
        }
        writeln!(writer, "]")?;
        Ok(())
    }

    fn write_vertical<W: Write>(&self, writer: &mut W, rows: &[Row]) -> io::Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };

        let max_name_len = first.columns().iter().map(|n| n.len()).max().unwrap_or(0);

        for (idx, row) in self.visible(rows).iter().enumerate() {
            writeln!(writer, "*************************** {} ***************************", idx + 1)?;
            for (name, value) in row.iter() {
                writeln!(writer, "{:>width$}: {}", name, value, width = max_name_len)?;
            }
        }
        Ok(())
    }
}

/// Leading `max` rows of `batches`
fn limit_batches(batches: &[RecordBatch], max: usize) -> Vec<RecordBatch> {
    let mut remaining = max;
    let mut limited = Vec::new();
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.num_rows());
        limited.push(batch.slice(0, take));
        remaining -= take;
    }
    limited
}

/// Quote if the value contains a comma, quote, or newline
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
