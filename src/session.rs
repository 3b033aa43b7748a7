// Manages documentation generation state

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Proof of ownership of the running generation, handed out by [`GenerationState::begin`].
#[derive(Clone, Debug)]
pub struct GenerationTicket {
    pub generation: u64,
    pub cancellation_token: CancellationToken,
}

pub struct GenerationState {
    pub is_running: bool,
    pub current_record_id: Option<i64>,
    pub cancellation_token: Option<CancellationToken>,
    generation: u64,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            is_running: false,
            current_record_id: None,
            cancellation_token: None,
            generation: 0,
        }
    }
}

impl GenerationState {
    /// Starts a new generation. A generation still in flight is cancelled first.
    pub fn begin(&mut self) -> GenerationTicket {
        if let Some(previous) = self.cancellation_token.take() {
            debug!(generation = self.generation, "cancelling superseded generation");
            previous.cancel();
        }

        self.generation += 1;
        let token = CancellationToken::new();
        self.is_running = true;
        self.current_record_id = None;
        self.cancellation_token = Some(token.clone());

        GenerationTicket {
            generation: self.generation,
            cancellation_token: token,
        }
    }

    /// Stops the running generation. Loading state clears right away; the
    /// read loop notices the cancellation at its next await point.
    pub fn abort(&mut self) {
        if let Some(token) = &self.cancellation_token {
            token.cancel();
        }

        self.is_running = false;
        self.cancellation_token = None;
    }

    pub fn set_record_id(&mut self, ticket: &GenerationTicket, record_id: i64) {
        if self.owns(ticket) {
            self.current_record_id = Some(record_id);
        }
    }

    /// Marks `ticket`'s generation as done, unless a newer one has replaced it.
    pub fn finish(&mut self, ticket: &GenerationTicket) {
        if !self.owns(ticket) {
            return;
        }

        self.is_running = false;
        self.cancellation_token = None;
    }

    fn owns(&self, ticket: &GenerationTicket) -> bool {
        self.generation == ticket.generation
    }
}
