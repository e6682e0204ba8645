//! Report client: request building and the pagination loop.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ReportError;
use crate::fields::{normalize, normalize_date, DateInput, FieldKind, FieldSpec};
use crate::materialize::materialize;
use crate::reporting::{BatchRequest, DateRange, Report, ReportRequest, ReportSession};
use crate::table::Table;

/// Parameters of one report query.
#[derive(Debug, Clone)]
pub struct ReportQuery {
    view_id: String,
    start_date: DateInput,
    end_date: DateInput,
    metrics: Vec<FieldSpec>,
    dimensions: Option<Vec<FieldSpec>>,
    extra: Map<String, Value>,
}

impl ReportQuery {
    /// Create a query over `view_id` for the given date range and metrics.
    pub fn new(
        view_id: impl Into<String>,
        start_date: impl Into<DateInput>,
        end_date: impl Into<DateInput>,
        metrics: Vec<FieldSpec>,
    ) -> Self {
        Self {
            view_id: view_id.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            metrics,
            dimensions: None,
            extra: Map::new(),
        }
    }

    /// Break results down by these dimensions.
    pub fn dimensions(mut self, dimensions: Vec<FieldSpec>) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Forward an extra top-level key into the report request (e.g. `samplingLevel`, `pageSize`).
    ///
    /// The value replaces any key the client builds under the same name.
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Forward several extra keys at once.
    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.extra.extend(options);
        self
    }

    /// Build the canonical request body. Fails before any network call on bad input.
    pub fn build_body(&self) -> Result<BatchRequest, ReportError> {
        let dimensions = match &self.dimensions {
            Some(dimensions) => Some(normalize(dimensions, FieldKind::Dimensions)?),
            None => None,
        };

        Ok(BatchRequest {
            report_requests: vec![ReportRequest {
                view_id: self.view_id.clone(),
                date_ranges: vec![DateRange {
                    start_date: normalize_date(&self.start_date)?,
                    end_date: normalize_date(&self.end_date)?,
                }],
                metrics: normalize(&self.metrics, FieldKind::Metrics)?,
                dimensions,
                include_empty_rows: true,
                hide_totals: true,
                hide_value_ranges: true,
                page_token: None,
                extra: self.extra.clone(),
            }],
        })
    }
}

/// Runs report queries against a [`ReportSession`].
#[derive(Clone)]
pub struct ReportClient {
    session: Arc<dyn ReportSession>,
}

impl ReportClient {
    pub fn new(session: Arc<dyn ReportSession>) -> Self {
        Self { session }
    }

    /// Fetch every page of the report and return them as one table.
    ///
    /// Pages are requested one after the other, each carrying the continuation
    /// token of the previous one, until a page comes back without a token.
    pub async fn query(&self, query: &ReportQuery) -> Result<Table, ReportError> {
        let mut body = query.build_body()?;
        let mut table: Option<Table> = None;
        let mut declared_rows: Option<u64> = None;
        let mut pages = 0usize;

        loop {
            let response = self.session.batch_get(&body).await?;
            pages += 1;

            let report = response.reports.into_iter().next().ok_or_else(|| {
                ReportError::ProtocolViolation(format!("page {} carried no report", pages))
            })?;

            let page = materialize(&report)?;
            let page_rows = page.num_rows();
            let accumulated = match table.as_mut() {
                Some(table) => {
                    table.append(page)?;
                    table.num_rows()
                }
                None => {
                    table = Some(page);
                    page_rows
                }
            };

            tracing::debug!(
                view_id = %query.view_id,
                page = pages,
                rows = page_rows,
                accumulated,
                "Fetched report page"
            );
            warn_if_sampled(&report);

            if let Some(count) = report.data.row_count {
                declared_rows = Some(count);
            }
            if let Some(declared) = declared_rows {
                if accumulated as u64 > declared {
                    return Err(row_count_mismatch(declared, accumulated));
                }
            }

            match next_page_token(report) {
                Some(token) if page_rows == 0 => {
                    tracing::warn!(
                        page = pages,
                        token = %token,
                        "Empty page carried a continuation token, stopping pagination"
                    );
                    break;
                }
                Some(token) => body.report_requests[0].page_token = Some(token),
                None => break,
            }
        }

        let table = table.unwrap_or_default();
        if let Some(declared) = declared_rows {
            if declared != table.num_rows() as u64 {
                return Err(row_count_mismatch(declared, table.num_rows()));
            }
        }
        Ok(table)
    }
}

impl std::fmt::Debug for ReportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportClient").finish()
    }
}

/// Continuation token of a page; falsy values mean there is no next page.
fn next_page_token(report: Report) -> Option<Value> {
    report.next_page_token.filter(|token| match token {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    })
}

fn row_count_mismatch(declared: u64, received: usize) -> ReportError {
    ReportError::ProtocolViolation(format!(
        "report declares {} rows but {} were received",
        declared, received
    ))
}

fn warn_if_sampled(report: &Report) {
    if let (Some(read), Some(space)) = (
        &report.data.samples_read_counts,
        &report.data.sampling_space_sizes,
    ) {
        tracing::warn!(
            samples_read = ?read,
            sampling_space = ?space,
            "Report data is sampled"
        );
    }
}
