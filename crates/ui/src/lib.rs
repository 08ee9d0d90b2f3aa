use axum::{
    Json, Router,
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures_util::stream::Stream;
use oranlens_parser::{CarrierEvent, ErrorRecord, ParseOutput, ParseStatistics, RpcRecord};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt as _;
use tracing::info;

/// Read-only viewer over one loaded parse result set. Filtering is
/// in-memory; the record collections are already ordered by line number.
pub struct UiServer {
    results: Arc<ParseOutput>,
}

impl UiServer {
    pub fn new(results: Arc<ParseOutput>) -> Self {
        Self { results }
    }

    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/", get(index))
            .route("/api/statistics", get(statistics))
            .route("/api/messages", get(messages))
            .route("/api/errors", get(errors))
            .route("/api/carriers", get(carriers))
            .route("/events", get(sse_handler))
            .with_state(self.results);

        info!("UI server started on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn index() -> axum::response::Html<&'static str> {
    axum::response::Html(include_str!("index.html"))
}

async fn statistics(State(results): State<Arc<ParseOutput>>) -> Json<ParseStatistics> {
    Json(results.statistics.clone())
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageFilter {
    pub message_type: Option<String>,
    pub session_id: Option<u64>,
    pub direction: Option<String>,
    pub operation: Option<String>,
    pub unanswered_only: Option<bool>,
}

pub fn filter_messages<'a>(messages: &'a [RpcRecord], f: &MessageFilter) -> Vec<&'a RpcRecord> {
    messages
        .iter()
        .filter(|m| {
            f.message_type
                .as_deref()
                .is_none_or(|t| m.message_type.as_str() == t)
        })
        .filter(|m| f.session_id.is_none_or(|s| m.session_id == s))
        .filter(|m| {
            f.direction
                .as_deref()
                .is_none_or(|d| m.direction.as_str() == d)
        })
        .filter(|m| {
            f.operation
                .as_deref()
                .is_none_or(|op| m.operation.as_deref() == Some(op))
        })
        .filter(|m| {
            // Unanswered = requests still waiting for a reply.
            !f.unanswered_only.unwrap_or(false)
                || (m.message_type == oranlens_parser::MessageType::Rpc && !m.has_response)
        })
        .collect()
}

async fn messages(
    State(results): State<Arc<ParseOutput>>,
    Query(filter): Query<MessageFilter>,
) -> Json<Vec<RpcRecord>> {
    Json(
        filter_messages(&results.messages, &filter)
            .into_iter()
            .cloned()
            .collect(),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorFilter {
    pub error_type: Option<String>,
    pub session_id: Option<u64>,
}

pub fn filter_errors<'a>(errors: &'a [ErrorRecord], f: &ErrorFilter) -> Vec<&'a ErrorRecord> {
    errors
        .iter()
        .filter(|e| {
            f.error_type
                .as_deref()
                .is_none_or(|t| e.error_type.as_str() == t)
        })
        .filter(|e| f.session_id.is_none_or(|s| e.session_id == s))
        .collect()
}

async fn errors(
    State(results): State<Arc<ParseOutput>>,
    Query(filter): Query<ErrorFilter>,
) -> Json<Vec<ErrorRecord>> {
    Json(
        filter_errors(&results.errors, &filter)
            .into_iter()
            .cloned()
            .collect(),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct CarrierFilter {
    pub carrier_type: Option<String>,
    pub event_type: Option<String>,
    pub carrier_name: Option<String>,
}

pub fn filter_carriers<'a>(events: &'a [CarrierEvent], f: &CarrierFilter) -> Vec<&'a CarrierEvent> {
    events
        .iter()
        .filter(|c| f.carrier_type.as_deref().is_none_or(|t| c.carrier_type == t))
        .filter(|c| {
            f.event_type
                .as_deref()
                .is_none_or(|t| c.event_type.as_str() == t)
        })
        .filter(|c| f.carrier_name.as_deref().is_none_or(|n| c.carrier_name == n))
        .collect()
}

async fn carriers(
    State(results): State<Arc<ParseOutput>>,
    Query(filter): Query<CarrierFilter>,
) -> Json<Vec<CarrierEvent>> {
    Json(
        filter_carriers(&results.carrier_events, &filter)
            .into_iter()
            .cloned()
            .collect(),
    )
}

/// Replays the full ordered message stream to each subscriber, one SSE
/// event per record.
async fn sse_handler(
    State(results): State<Arc<ParseOutput>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE subscriber connected");
    let messages = results.messages.clone();
    let stream = tokio_stream::iter(messages).filter_map(|msg| {
        let json = serde_json::to_string(&msg).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream)
}
