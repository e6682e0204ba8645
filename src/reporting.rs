//! Analytics Reporting API v4 wire types and the authenticated `reports:batchGet` session.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{ser, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::auth::OAuth2Client;
use crate::error::ApiError;
use crate::fields::FieldObject;

/// Body of a `reports:batchGet` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub report_requests: Vec<ReportRequest>,
}

/// One report request inside a batch.
///
/// On the wire, `extra` is merged over the built keys, so a caller option
/// replaces the field of the same name. `page_token`, when set by the
/// pagination loop, is written last.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub view_id: String,
    pub date_ranges: Vec<DateRange>,
    pub metrics: Vec<FieldObject>,
    pub dimensions: Option<Vec<FieldObject>>,
    pub include_empty_rows: bool,
    pub hide_totals: bool,
    pub hide_value_ranges: bool,
    /// Opaque continuation token copied from the previous page.
    pub page_token: Option<Value>,
    /// Caller options forwarded verbatim (sampling level, page size, ...).
    pub extra: Map<String, Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuiltFields<'a> {
    view_id: &'a str,
    date_ranges: &'a [DateRange],
    metrics: &'a [FieldObject],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<&'a [FieldObject]>,
    include_empty_rows: bool,
    hide_totals: bool,
    hide_value_ranges: bool,
}

impl ReportRequest {
    /// JSON object actually sent for this request.
    pub fn to_wire(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let built = BuiltFields {
            view_id: &self.view_id,
            date_ranges: &self.date_ranges,
            metrics: &self.metrics,
            dimensions: self.dimensions.as_deref(),
            include_empty_rows: self.include_empty_rows,
            hide_totals: self.hide_totals,
            hide_value_ranges: self.hide_value_ranges,
        };
        let mut wire = match serde_json::to_value(built)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        wire.extend(self.extra.clone());
        if let Some(token) = &self.page_token {
            wire.insert("pageToken".to_string(), token.clone());
        }
        Ok(wire)
    }
}

impl Serialize for ReportRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire()
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

/// Response of a `reports:batchGet` call.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub reports: Vec<Report>,
}

/// One page of a report.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default)]
    pub column_header: ColumnHeader,
    #[serde(default)]
    pub data: ReportData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metric_header: MetricHeader,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricHeader {
    #[serde(default)]
    pub metric_header_entries: Vec<MetricHeaderEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricHeaderEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub metric_type: MetricType,
}

/// Declared wire type of a metric column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    Integer,
    Float,
    Currency,
    Percent,
    Time,
    #[default]
    #[serde(other)]
    MetricTypeUnspecified,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    /// Total number of matching rows for the whole report, not just this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_read_counts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_space_sizes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReportRow {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<DateRangeValues>,
}

/// Metric values of a row for one date range.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DateRangeValues {
    #[serde(default)]
    pub values: Vec<String>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    code: u16,
    message: String,
    #[serde(default)]
    status: String,
}

/// Authenticated session able to execute batched report requests.
#[async_trait]
pub trait ReportSession: Send + Sync {
    async fn batch_get(&self, body: &BatchRequest) -> Result<BatchResponse, ApiError>;
}

/// HTTP session against the Analytics Reporting API.
#[derive(Clone)]
pub struct AnalyticsReportingClient {
    base_url: String,
    http_client: Client,
    auth_client: OAuth2Client,
}

impl AnalyticsReportingClient {
    pub fn new(
        base_url: String,
        auth_client: OAuth2Client,
        timeout: std::time::Duration,
    ) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::HttpClientInit(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            auth_client,
        })
    }

    fn batch_get_url(&self) -> String {
        format!("{}/reports:batchGet", self.base_url)
    }

    /// Execute POST request.
    async fn execute_post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        tracing::debug!(url = %url, "Reporting API POST request");

        let token = self.auth_client.get_token().await?;

        let response = self
            .http_client
            .post(url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle HTTP response and parse JSON.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            tracing::trace!(body = %truncate(&body, 500), "Reporting API response");
            Ok(serde_json::from_str(&body)?)
        } else {
            tracing::debug!(status = %status, body = %truncate(&body, 500), "Reporting API error response");
            Err(parse_error_response(status, &body))
        }
    }
}

#[async_trait]
impl ReportSession for AnalyticsReportingClient {
    async fn batch_get(&self, body: &BatchRequest) -> Result<BatchResponse, ApiError> {
        let url = self.batch_get_url();
        self.execute_post(&url, body).await
    }
}

impl std::fmt::Debug for AnalyticsReportingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsReportingClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Map an error body to the Google envelope when possible.
fn parse_error_response(status: StatusCode, body: &str) -> ApiError {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(error) => {
            let code = if error.error.status.is_empty() {
                error.error.code.to_string()
            } else {
                error.error.status
            };
            ApiError::Remote {
                status,
                code,
                message: error.error.message,
            }
        }
        Err(_) => ApiError::HttpError {
            status,
            body: body.to_string(),
        },
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_deserializes_full_page() {
        let report: Report = serde_json::from_value(json!({
            "columnHeader": {
                "dimensions": ["ga:date"],
                "metricHeader": {"metricHeaderEntries": [{"name": "ga:users", "type": "INTEGER"}]}
            },
            "data": {
                "rowCount": 1,
                "rows": [{"dimensions": ["20200319"], "metrics": [{"values": ["1"]}]}]
            },
            "nextPageToken": "1000"
        }))
        .unwrap();

        assert_eq!(report.column_header.dimensions, vec!["ga:date"]);
        let entry = &report.column_header.metric_header.metric_header_entries[0];
        assert_eq!(entry.metric_type, MetricType::Integer);
        assert_eq!(report.data.row_count, Some(1));
        assert_eq!(report.data.rows[0].metrics[0].values, vec!["1"]);
        assert_eq!(report.next_page_token, Some(json!("1000")));
    }

    #[test]
    fn test_report_deserializes_empty_data() {
        let report: Report = serde_json::from_value(json!({
            "columnHeader": {"metricHeader": {"metricHeaderEntries": [{"name": "ga:users", "type": "INTEGER"}]}},
            "data": {}
        }))
        .unwrap();

        assert!(report.column_header.dimensions.is_empty());
        assert!(report.data.rows.is_empty());
        assert_eq!(report.data.row_count, None);
        assert!(report.next_page_token.is_none());
    }

    #[test]
    fn test_unknown_metric_type_falls_back() {
        let entry: MetricHeaderEntry =
            serde_json::from_value(json!({"name": "ga:x", "type": "SOMETHING_NEW"})).unwrap();
        assert_eq!(entry.metric_type, MetricType::MetricTypeUnspecified);
    }

    #[test]
    fn test_request_serializes_wire_shape() {
        let mut extra = Map::new();
        extra.insert("samplingLevel".to_string(), json!("LARGE"));
        let request = BatchRequest {
            report_requests: vec![ReportRequest {
                view_id: "VIEWID".to_string(),
                date_ranges: vec![DateRange {
                    start_date: "5DaysAgo".to_string(),
                    end_date: "yesterday".to_string(),
                }],
                metrics: vec![serde_json::from_value(json!({"expression": "ga:users"})).unwrap()],
                dimensions: None,
                include_empty_rows: true,
                hide_totals: true,
                hide_value_ranges: true,
                page_token: None,
                extra,
            }],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"reportRequests": [{
                "viewId": "VIEWID",
                "dateRanges": [{"startDate": "5DaysAgo", "endDate": "yesterday"}],
                "metrics": [{"expression": "ga:users"}],
                "includeEmptyRows": true,
                "hideTotals": true,
                "hideValueRanges": true,
                "samplingLevel": "LARGE"
            }]})
        );
    }

    #[test]
    fn test_request_options_replace_built_keys() {
        let mut extra = Map::new();
        extra.insert("viewId".to_string(), json!("OTHER"));
        extra.insert("hideTotals".to_string(), json!(false));
        extra.insert("pageToken".to_string(), json!("abc"));
        let mut request = ReportRequest {
            view_id: "VIEWID".to_string(),
            date_ranges: vec![DateRange {
                start_date: "today".to_string(),
                end_date: "today".to_string(),
            }],
            metrics: vec![serde_json::from_value(json!({"expression": "ga:users"})).unwrap()],
            dimensions: None,
            include_empty_rows: true,
            hide_totals: true,
            hide_value_ranges: true,
            page_token: None,
            extra,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["viewId"], json!("OTHER"));
        assert_eq!(wire["hideTotals"], json!(false));
        assert_eq!(wire["pageToken"], json!("abc"));
        assert_eq!(wire.as_object().unwrap().len(), 7);

        request.page_token = Some(json!("next"));
        assert_eq!(serde_json::to_value(&request).unwrap()["pageToken"], json!("next"));
    }

    #[test]
    fn test_parse_error_response_google_envelope() {
        let body = r#"{"error": {"code": 400, "message": "Unknown metric(s): ga:user", "status": "INVALID_ARGUMENT"}}"#;
        match parse_error_response(StatusCode::BAD_REQUEST, body) {
            ApiError::Remote { code, message, .. } => {
                assert_eq!(code, "INVALID_ARGUMENT");
                assert!(message.contains("ga:user"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_response_plain_body() {
        match parse_error_response(StatusCode::BAD_GATEWAY, "upstream down") {
            ApiError::HttpError { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...(truncated)");
    }
}
