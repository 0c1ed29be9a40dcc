/// Body of the outbound streaming chat request.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryRequest {
    /// Fresh identifier for every query.
    pub session_id: String,
    pub bot_app_key: String,
    /// End-user identifier.
    pub visitor_biz_id: String,
    pub content: String,
    pub streaming_throttle: u32,
}

impl QueryRequest {
    /// Creates a query with a newly generated session id.
    pub fn new(
        bot_app_key: impl Into<String>,
        visitor_biz_id: impl Into<String>,
        content: impl Into<String>,
        streaming_throttle: u32,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            bot_app_key: bot_app_key.into(),
            visitor_biz_id: visitor_biz_id.into(),
            content: content.into(),
            streaming_throttle,
        }
    }
}
