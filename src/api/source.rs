//! Catalog-facing description of a report query as a named data source.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::query::{ReportClient, ReportQuery};
use crate::error::ReportError;
use crate::fields::{DateInput, FieldSpec};
use crate::table::Table;

/// Name under which the source is registered.
pub const SOURCE_NAME: &str = "google_analytics_query";

/// Kind of object produced by [`QuerySource::read`].
pub const SOURCE_CONTAINER: &str = "table";

/// Declared parameters of the source, exactly the inputs of a report query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceArgs {
    pub view_id: String,
    pub start_date: Value,
    pub end_date: Value,
    pub metrics: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Vec<FieldSpec>>,
    /// Extra request keys forwarded verbatim.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl SourceArgs {
    fn to_query(&self) -> ReportQuery {
        let mut query = ReportQuery::new(
            self.view_id.clone(),
            DateInput::from(&self.start_date),
            DateInput::from(&self.end_date),
            self.metrics.clone(),
        )
        .options(self.options.clone());
        if let Some(dimensions) = &self.dimensions {
            query = query.dimensions(dimensions.clone());
        }
        query
    }
}

/// A parameterized report query exposed as a discoverable data source.
///
/// Every `read` performs a fresh fetch; nothing is cached between reads.
#[derive(Debug, Clone)]
pub struct QuerySource {
    args: SourceArgs,
    description: String,
    metadata: Map<String, Value>,
}

impl QuerySource {
    pub fn new(args: SourceArgs) -> Self {
        Self {
            args,
            description: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    pub fn container(&self) -> &'static str {
        SOURCE_CONTAINER
    }

    /// Catalog entry describing this source and its parameters.
    pub fn describe(&self) -> Result<Value, ReportError> {
        let args = serde_json::to_value(&self.args).map_err(|e| {
            ReportError::InvalidValue(format!("Source arguments are not serializable: {}", e))
        })?;
        Ok(json!({
            "sources": {
                self.name(): {
                    "args": args,
                    "container": self.container(),
                    "description": self.description,
                    "driver": concat!(module_path!(), "::QuerySource"),
                    "metadata": self.metadata,
                }
            }
        }))
    }

    /// Validate the parameters without contacting the API.
    pub fn validate(&self) -> Result<(), ReportError> {
        self.args.to_query().build_body().map(|_| ())
    }

    /// Run the query and return the complete table.
    pub async fn read(&self, client: &ReportClient) -> Result<Table, ReportError> {
        client.query(&self.args.to_query()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::reporting::{BatchRequest, BatchResponse, ReportSession};
    use crate::table::ColumnData;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct SingleUserSession;

    #[async_trait]
    impl ReportSession for SingleUserSession {
        async fn batch_get(&self, _body: &BatchRequest) -> Result<BatchResponse, ApiError> {
            Ok(serde_json::from_value(json!({"reports": [{
                "columnHeader": {"metricHeader": {"metricHeaderEntries": [{"name": "ga:users", "type": "INTEGER"}]}},
                "data": {"rowCount": 1, "rows": [{"metrics": [{"values": ["1"]}]}]}
            }]}))?)
        }
    }

    fn args() -> SourceArgs {
        serde_json::from_value(json!({
            "view_id": "VIEWID",
            "start_date": "5DaysAgo",
            "end_date": "yesterday",
            "metrics": ["ga:user"]
        }))
        .unwrap()
    }

    #[test]
    fn test_describe_lists_declared_args() {
        let source = QuerySource::new(args());
        assert_eq!(source.name(), "google_analytics_query");
        assert_eq!(source.container(), "table");

        let description = source.describe().unwrap();
        let entry = &description["sources"]["google_analytics_query"];
        assert_eq!(
            entry["args"],
            json!({
                "view_id": "VIEWID",
                "start_date": "5DaysAgo",
                "end_date": "yesterday",
                "metrics": ["ga:user"]
            })
        );
        assert_eq!(entry["description"], json!(""));
        assert_eq!(entry["metadata"], json!({}));
    }

    #[test]
    fn test_args_round_trip_options() {
        let args: SourceArgs = serde_json::from_value(json!({
            "view_id": "VIEWID",
            "start_date": "2020-03-01",
            "end_date": "today",
            "metrics": [{"expression": "ga:sessions", "alias": "Sessions"}],
            "dimensions": ["ga:date"],
            "samplingLevel": "SMALL"
        }))
        .unwrap();
        assert_eq!(args.options.get("samplingLevel"), Some(&json!("SMALL")));
        assert_eq!(
            serde_json::to_value(&args).unwrap()["samplingLevel"],
            json!("SMALL")
        );
    }

    #[test]
    fn test_validate_reports_type_errors() {
        let mut bad = args();
        bad.start_date = json!(5);
        let err = QuerySource::new(bad).validate().unwrap_err();
        assert!(matches!(err, ReportError::InvalidType(_)));
        assert!(QuerySource::new(args()).validate().is_ok());
    }

    #[tokio::test]
    async fn test_read_fetches_table() {
        let client = ReportClient::new(Arc::new(SingleUserSession));
        let source = QuerySource::new(args()).with_description("daily users");

        let table = source.read(&client).await.unwrap();

        assert_eq!(table.column_names(), vec!["ga:users"]);
        assert_eq!(table.columns()[0].data, ColumnData::Integer(vec![1]));
        assert_eq!(
            source.describe().unwrap()["sources"]["google_analytics_query"]["description"],
            json!("daily users")
        );
    }
}
