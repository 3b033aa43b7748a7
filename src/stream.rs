// Consumes a streamed documentation response
//
// The backend answers `POST /generate/` with a byte stream whose first line
// may be `{"id": <n>}` naming the stored record, followed by Markdown.

use std::fmt;
use std::sync::OnceLock;

use futures_util::{Stream, StreamExt};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder::Utf8Decoder;
use crate::view::{DocumentView, ScrollPolicy};

/// Longest leading text held back while waiting to see whether it is an id marker.
pub const MARKER_PROBE_LIMIT: usize = 64;

fn id_marker() -> &'static Regex {
    static ID_MARKER: OnceLock<Regex> = OnceLock::new();
    ID_MARKER.get_or_init(|| Regex::new(r#"^\{"id":\s*(\d+)\}\n"#).expect("id marker pattern"))
}

/// Matches a leading `{"id": <digits>}\n`, returning the id and where the document starts.
pub fn parse_id_marker(text: &str) -> Option<(i64, usize)> {
    let captures = id_marker().captures(text)?;
    let id = captures[1].parse().ok()?;
    Some((id, captures.get(0)?.end()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    /// Stopped by the caller; not an error.
    Cancelled,
    Failed(String),
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Notifications for whoever keeps the history list fresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    RecordId(i64),
    Finished(StreamOutcome),
}

enum Read<T> {
    Cancelled,
    Next(Option<T>),
}

/// One generation's worth of streamed output.
pub struct StreamSession {
    cancellation_token: CancellationToken,
    accumulated_text: String,
    record_id: Option<i64>,
    first_chunk_consumed: bool,
    decoder: Utf8Decoder,
    lead: String,
    scroll: ScrollPolicy,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl StreamSession {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            accumulated_text: String::new(),
            record_id: None,
            first_chunk_consumed: false,
            decoder: Utf8Decoder::new(),
            lead: String::new(),
            scroll: ScrollPolicy::default(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn record_id(&self) -> Option<i64> {
        self.record_id
    }

    pub fn into_text(self) -> String {
        self.accumulated_text
    }

    /// Reads `stream` to the end, cancellation, or the first transport error.
    ///
    /// Text received before the session ends is always kept, whatever the outcome.
    pub async fn consume<S, B, E, V>(&mut self, mut stream: S, view: &mut V) -> StreamOutcome
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: fmt::Display,
        V: DocumentView + ?Sized,
    {
        let token = self.cancellation_token.clone();

        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => Read::Cancelled,
                next = stream.next() => Read::Next(next),
            };

            let outcome = match read {
                Read::Cancelled => StreamOutcome::Cancelled,
                Read::Next(None) => StreamOutcome::Completed,
                Read::Next(Some(Err(e))) => {
                    error!(error = %e, received = self.accumulated_text.len(), "documentation stream failed");
                    StreamOutcome::Failed(e.to_string())
                }
                Read::Next(Some(Ok(bytes))) => {
                    let bytes = bytes.as_ref();
                    debug!(bytes = bytes.len(), "chunk received");
                    let text = self.decoder.decode(bytes);
                    self.ingest(text, view).await;
                    continue;
                }
            };

            return self.settle(outcome, view).await;
        }
    }

    async fn ingest<V: DocumentView + ?Sized>(&mut self, text: String, view: &mut V) {
        if self.first_chunk_consumed {
            self.append(&text, view).await;
            return;
        }

        self.lead.push_str(&text);
        if may_become_marker(&self.lead) {
            return;
        }

        let text = self.resolve_lead();
        self.append(&text, view).await;
    }

    /// Runs the id-marker check on the leading text. Happens once per session.
    fn resolve_lead(&mut self) -> String {
        self.first_chunk_consumed = true;
        let lead = std::mem::take(&mut self.lead);

        match parse_id_marker(&lead) {
            Some((id, body_start)) => {
                info!(record_id = id, "documentation record created");
                self.record_id = Some(id);
                self.emit(SessionEvent::RecordId(id));
                lead[body_start..].to_string()
            }
            None => lead,
        }
    }

    async fn append<V: DocumentView + ?Sized>(&mut self, text: &str, view: &mut V) {
        if text.is_empty() {
            return;
        }

        let near_bottom = self.scroll.is_near_bottom(view);
        self.accumulated_text.push_str(text);

        if let Err(e) = view.render(&self.accumulated_text, text) {
            warn!(error = %e, "failed to render documentation chunk");
        }

        // Follow only after the render above has landed.
        tokio::task::yield_now().await;
        if near_bottom {
            view.scroll_to_bottom();
        }
    }

    async fn settle<V: DocumentView + ?Sized>(
        &mut self,
        outcome: StreamOutcome,
        view: &mut V,
    ) -> StreamOutcome {
        if outcome == StreamOutcome::Completed {
            let tail = self.decoder.finish();
            if self.first_chunk_consumed {
                self.append(&tail, view).await;
            } else {
                self.lead.push_str(&tail);
            }
        }

        if self.decoder.has_pending() {
            debug!("dropping incomplete trailing bytes");
        }

        if !self.first_chunk_consumed && !self.lead.is_empty() {
            let text = self.resolve_lead();
            self.append(&text, view).await;
        }

        info!(
            outcome = %outcome,
            record_id = ?self.record_id,
            chars = self.accumulated_text.chars().count(),
            "documentation stream ended"
        );
        self.emit(SessionEvent::Finished(outcome.clone()));
        outcome
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // Nobody listening is fine.
            let _ = events.send(event);
        }
    }
}

/// Whether the leading text could still turn out to be an id marker once more arrives.
fn may_become_marker(lead: &str) -> bool {
    lead.is_empty() || (lead.starts_with('{') && !lead.contains('\n') && lead.len() < MARKER_PROBE_LIMIT)
}
