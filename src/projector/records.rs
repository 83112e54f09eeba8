//! Typed records handed to presentation

use super::{Row, ScalarValue};
use crate::error::{PipelineError, Result};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

/// One line item of the cost table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    pub service: Option<String>,
    pub usage_start: Option<NaiveDateTime>,
    pub usage_end: Option<NaiveDateTime>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub cost: Option<Decimal>,
    pub currency: Option<String>,
    pub description: Option<String>,
}

impl DetailRecord {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            service: text(row, "AWS_SERVICE")?,
            usage_start: timestamp(row, "LINE_ITEM_USAGE_START_DATE")?,
            usage_end: timestamp(row, "LINE_ITEM_USAGE_END_DATE")?,
            cost: decimal(row, "UNBLENDED_COST")?,
            currency: text(row, "CURRENCY")?,
            description: text(row, "DESCRIPTION")?,
        })
    }
}

/// Total cost of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    pub service: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub total_cost: Option<Decimal>,
}

impl AggregateRecord {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            service: text(row, "AWS_SERVICE")?,
            total_cost: decimal(row, "TOTAL_UNBLENDED_COST")?,
        })
    }
}

fn column<'a>(row: &'a Row, name: &str) -> Result<&'a ScalarValue> {
    row.get(name)
        .ok_or_else(|| PipelineError::Projection(format!("row has no column {}", name)))
}

fn mismatch(name: &str, expected: &str, found: &ScalarValue) -> PipelineError {
    PipelineError::Projection(format!(
        "column {} expected {}, found {}",
        name,
        expected,
        found.type_name()
    ))
}

fn text(row: &Row, name: &str) -> Result<Option<String>> {
    match column(row, name)? {
        ScalarValue::Null => Ok(None),
        ScalarValue::Utf8(s) => Ok(Some(s.clone())),
        other => Err(mismatch(name, "text", other)),
    }
}

fn timestamp(row: &Row, name: &str) -> Result<Option<NaiveDateTime>> {
    match column(row, name)? {
        ScalarValue::Null => Ok(None),
        ScalarValue::Utf8(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ"))
            .map(Some)
            .map_err(|e| {
                PipelineError::Projection(format!("column {}: bad timestamp '{}': {}", name, s, e))
            }),
        other => other
            .as_timestamp()
            .map(Some)
            .ok_or_else(|| mismatch(name, "timestamp", other)),
    }
}

fn decimal(row: &Row, name: &str) -> Result<Option<Decimal>> {
    match column(row, name)? {
        ScalarValue::Null => Ok(None),
        other => other
            .as_decimal()
            .map(Some)
            .ok_or_else(|| mismatch(name, "number", other)),
    }
}
