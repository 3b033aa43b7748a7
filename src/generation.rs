// Runs one documentation generation from request to saved result

use std::sync::Arc;

use futures_util::pin_mut;
use reqwest::Response;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend_api::BackendClient;
use crate::error::ApiError;
use crate::models::GenerationRequest;
use crate::session::{GenerationState, GenerationTicket};
use crate::stream::{SessionEvent, StreamOutcome, StreamSession};
use crate::view::DocumentView;

#[derive(Debug)]
pub struct GenerationReport {
    pub outcome: StreamOutcome,
    pub record_id: Option<i64>,
    pub text: String,
}

/// A generation whose request was accepted and whose body is ready to be read.
pub struct ActiveGeneration {
    session: StreamSession,
    response: Response,
    ticket: GenerationTicket,
}

/// Sends `request` unless the source is blank, in which case nothing happens.
pub async fn start_generation(
    client: &BackendClient,
    state: &Arc<Mutex<GenerationState>>,
    request: &GenerationRequest,
) -> Result<Option<ActiveGeneration>, ApiError> {
    if request.is_blank() {
        debug!("source code is empty; nothing to generate");
        return Ok(None);
    }

    let ticket = state.lock().await.begin();
    info!(
        model = %request.model,
        bytes = request.source_code.len(),
        authenticated = client.is_authenticated(),
        "requesting documentation"
    );

    match client.generate(request).await {
        Ok(response) => Ok(Some(ActiveGeneration {
            session: StreamSession::new(ticket.cancellation_token.clone()),
            response,
            ticket,
        })),
        Err(e) => {
            state.lock().await.finish(&ticket);
            Err(e)
        }
    }
}

/// Stops whatever generation is running.
pub async fn stop_generation(state: &Arc<Mutex<GenerationState>>) {
    let mut generation_state = state.lock().await;
    if generation_state.is_running {
        info!("stopping generation");
    }
    generation_state.abort();
}

impl ActiveGeneration {
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.session = self.session.with_events(events);
        self
    }

    /// Streams the document into `view` and releases the loading state afterwards.
    pub async fn run<V: DocumentView + ?Sized>(
        self,
        state: &Arc<Mutex<GenerationState>>,
        view: &mut V,
    ) -> GenerationReport {
        let Self {
            mut session,
            response,
            ticket,
        } = self;

        let body = response.bytes_stream();
        pin_mut!(body);
        let outcome = session.consume(body, view).await;

        let record_id = session.record_id();
        {
            let mut generation_state = state.lock().await;
            if let Some(id) = record_id {
                generation_state.set_record_id(&ticket, id);
            }
            generation_state.finish(&ticket);
        }

        GenerationReport {
            outcome,
            record_id,
            text: session.into_text(),
        }
    }
}

/// Refreshes the history list whenever a session reports a new record or completes.
///
/// Ends when the session goes away. Without a token there is no history to refresh.
pub fn spawn_history_refresher(
    client: BackendClient,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut refreshes = 0;

        while let Some(event) = events.recv().await {
            let refresh = matches!(
                event,
                SessionEvent::RecordId(_) | SessionEvent::Finished(StreamOutcome::Completed)
            );
            if !refresh || !client.is_authenticated() {
                continue;
            }

            refreshes += 1;
            match client.history().await {
                Ok(entries) => info!(entries = entries.len(), "history refreshed"),
                Err(e) => warn!(error = %e, "history refresh failed"),
            }
        }

        refreshes
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelId;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CollectingView {
        text: String,
    }

    impl DocumentView for CollectingView {
        fn distance_to_bottom(&self) -> u32 {
            0
        }

        fn render(&mut self, _document: &str, appended: &str) -> io::Result<()> {
            self.text.push_str(appended);
            Ok(())
        }

        fn scroll_to_bottom(&mut self) {}
    }

    fn client_for(server: &MockServer, token: Option<&str>) -> BackendClient {
        BackendClient::new(server.uri(), Duration::from_secs(2))
            .unwrap()
            .with_token(token.map(str::to_string))
    }

    #[tokio::test]
    async fn blank_source_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let state = Arc::new(Mutex::new(GenerationState::default()));
        let request = GenerationRequest::new("   \n  ", ModelId::default());

        let started = start_generation(&client_for(&server, None), &state, &request)
            .await
            .unwrap();

        assert!(started.is_none());
        let state = state.lock().await;
        assert!(!state.is_running);
        assert!(state.cancellation_token.is_none());
    }

    #[tokio::test]
    async fn streams_document_and_clears_loading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("{\"id\": 42}\nDocs started...\n## Usage"),
            )
            .mount(&server)
            .await;

        let state = Arc::new(Mutex::new(GenerationState::default()));
        let request = GenerationRequest::new("def f(): pass", ModelId::default());
        let active = start_generation(&client_for(&server, None), &state, &request)
            .await
            .unwrap()
            .expect("generation should start");
        assert!(state.lock().await.is_running);

        let mut view = CollectingView::default();
        let report = active.run(&state, &mut view).await;

        assert_eq!(report.outcome, StreamOutcome::Completed);
        assert_eq!(report.record_id, Some(42));
        assert_eq!(report.text, "Docs started...\n## Usage");
        assert_eq!(view.text, report.text);

        let state = state.lock().await;
        assert!(!state.is_running);
        assert_eq!(state.current_record_id, Some(42));
    }

    #[tokio::test]
    async fn rejected_request_clears_loading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let state = Arc::new(Mutex::new(GenerationState::default()));
        let request = GenerationRequest::new("x = 1", ModelId::default());
        let result = start_generation(&client_for(&server, None), &state, &request).await;

        assert!(matches!(result, Err(ApiError::Status { status: 500, .. })));
        assert!(!state.lock().await.is_running);
    }

    #[tokio::test]
    async fn stop_before_reading_keeps_nothing_and_clears_loading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("text"))
            .mount(&server)
            .await;

        let state = Arc::new(Mutex::new(GenerationState::default()));
        let request = GenerationRequest::new("x = 1", ModelId::default());
        let active = start_generation(&client_for(&server, None), &state, &request)
            .await
            .unwrap()
            .unwrap();

        stop_generation(&state).await;
        assert!(!state.lock().await.is_running);

        let report = active.run(&state, &mut CollectingView::default()).await;
        assert_eq!(report.outcome, StreamOutcome::Cancelled);
        assert_eq!(report.text, "");
    }

    #[tokio::test]
    async fn refresher_fetches_history_on_record_and_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_history_refresher(client_for(&server, Some("t")), rx);
        tx.send(SessionEvent::RecordId(1)).unwrap();
        tx.send(SessionEvent::Finished(StreamOutcome::Completed)).unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn refresher_skips_cancelled_and_unauthenticated_sessions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::unbounded_channel();
        let anonymous = spawn_history_refresher(client_for(&server, None), rx);
        tx.send(SessionEvent::RecordId(1)).unwrap();
        drop(tx);
        assert_eq!(anonymous.await.unwrap(), 0);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = spawn_history_refresher(client_for(&server, Some("t")), rx);
        tx.send(SessionEvent::Finished(StreamOutcome::Cancelled)).unwrap();
        drop(tx);
        assert_eq!(cancelled.await.unwrap(), 0);
    }
}
