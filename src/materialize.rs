//! Conversion of one report page into a typed, page-local table.

use chrono::NaiveDateTime;

use crate::error::ReportError;
use crate::reporting::{MetricType, Report};
use crate::table::{Column, ColumnData, ColumnType, Table};

/// Prefix of Core Reporting field names.
const FIELD_PREFIX: &str = "ga:";

/// Time grain encoded by a date-like dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateGrain {
    /// `YYYYMM`
    YearMonth,
    /// `YYYYMMDD`
    Date,
    /// `YYYYMMDDHH`
    DateHour,
    /// `YYYYMMDDHHmm`
    DateHourMinute,
}

impl DateGrain {
    /// Recognize a grain from a dimension name, with or without the `ga:` prefix.
    pub fn from_dimension(name: &str) -> Option<Self> {
        match name.strip_prefix(FIELD_PREFIX).unwrap_or(name) {
            "yearMonth" => Some(DateGrain::YearMonth),
            "date" => Some(DateGrain::Date),
            "dateHour" => Some(DateGrain::DateHour),
            "dateHourMinute" => Some(DateGrain::DateHourMinute),
            _ => None,
        }
    }

    fn width(self) -> usize {
        match self {
            DateGrain::YearMonth => 6,
            DateGrain::Date => 8,
            DateGrain::DateHour => 10,
            DateGrain::DateHourMinute => 12,
        }
    }

    /// Digits appended to reach the `YYYYMMDDHHmm` layout.
    fn padding(self) -> &'static str {
        match self {
            DateGrain::YearMonth => "010000",
            DateGrain::Date => "0000",
            DateGrain::DateHour => "00",
            DateGrain::DateHourMinute => "",
        }
    }

    pub fn parse(self, value: &str) -> Option<NaiveDateTime> {
        if value.len() != self.width() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let full = format!("{}{}", value, self.padding());
        NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M").ok()
    }
}

/// Semantic column type for a declared metric wire type.
pub fn metric_column_type(metric_type: MetricType) -> ColumnType {
    match metric_type {
        MetricType::Integer => ColumnType::Integer,
        MetricType::Float
        | MetricType::Currency
        | MetricType::Percent
        | MetricType::Time
        | MetricType::MetricTypeUnspecified => ColumnType::Float,
    }
}

/// How the raw strings of one column are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Integer,
    Float,
    Timestamp(DateGrain),
    Text,
}

impl Decoder {
    fn for_dimension(name: &str) -> Self {
        DateGrain::from_dimension(name)
            .map(Decoder::Timestamp)
            .unwrap_or(Decoder::Text)
    }

    fn for_metric(metric_type: MetricType) -> Self {
        match metric_column_type(metric_type) {
            ColumnType::Integer => Decoder::Integer,
            _ => Decoder::Float,
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Decoder::Integer => ColumnType::Integer,
            Decoder::Float => ColumnType::Float,
            Decoder::Timestamp(_) => ColumnType::Timestamp,
            Decoder::Text => ColumnType::Text,
        }
    }

    fn decode(self, column: &str, raw: Vec<String>) -> Result<ColumnData, ReportError> {
        let fail = |value: &str| ReportError::Decode {
            column: column.to_string(),
            value: value.to_string(),
            expected: self.column_type().as_str(),
        };

        Ok(match self {
            Decoder::Text => ColumnData::Text(raw),
            Decoder::Integer => ColumnData::Integer(
                raw.iter()
                    .map(|v| v.trim().parse::<i64>().map_err(|_| fail(v.as_str())))
                    .collect::<Result<_, _>>()?,
            ),
            Decoder::Float => ColumnData::Float(
                raw.iter()
                    .map(|v| v.trim().parse::<f64>().map_err(|_| fail(v.as_str())))
                    .collect::<Result<_, _>>()?,
            ),
            Decoder::Timestamp(grain) => ColumnData::Timestamp(
                raw.iter()
                    .map(|v| grain.parse(v).ok_or_else(|| fail(v.as_str())))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// Build the page-local table for one report page.
///
/// Columns are the header's dimensions followed by its metrics. A page without
/// a data section yields zero rows with the declared columns.
pub fn materialize(report: &Report) -> Result<Table, ReportError> {
    let header = &report.column_header;
    let metric_entries = &header.metric_header.metric_header_entries;

    let mut layout: Vec<(&str, Decoder)> = header
        .dimensions
        .iter()
        .map(|name| (name.as_str(), Decoder::for_dimension(name)))
        .collect();
    layout.extend(
        metric_entries
            .iter()
            .map(|entry| (entry.name.as_str(), Decoder::for_metric(entry.metric_type))),
    );

    let dimension_count = header.dimensions.len();
    let rows = &report.data.rows;
    let mut raw: Vec<Vec<String>> = layout
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();

    for (index, row) in rows.iter().enumerate() {
        if row.dimensions.len() != dimension_count {
            return Err(ReportError::ProtocolViolation(format!(
                "row {} has {} dimension values, header declares {}",
                index,
                row.dimensions.len(),
                dimension_count
            )));
        }
        // Only one date range is ever requested
        let metric_values = row.metrics.first().map(|r| r.values.as_slice()).unwrap_or(&[]);
        if metric_values.len() != metric_entries.len() {
            return Err(ReportError::ProtocolViolation(format!(
                "row {} has {} metric values, header declares {}",
                index,
                metric_values.len(),
                metric_entries.len()
            )));
        }

        for (slot, value) in raw
            .iter_mut()
            .zip(row.dimensions.iter().chain(metric_values.iter()))
        {
            slot.push(value.clone());
        }
    }

    let columns = layout
        .into_iter()
        .zip(raw)
        .map(|((name, decoder), values)| {
            decoder
                .decode(name, values)
                .map(|data| Column::new(name, data))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Table::new(columns)
}
