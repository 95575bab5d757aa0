//! Lifecycle of the single in-flight request/response turn.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    /// Deltas are being written into the assistant placeholder.
    Streaming,
    /// The reply turned into an image request; waiting for it to settle.
    ToolPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    ToolResolved { succeeded: bool },
    Failed,
}

#[derive(Debug, Default)]
pub struct TurnState {
    phase: TurnPhase,
    stream_id: u64,
    placeholder_id: Option<String>,
    visual_id: Option<String>,
    buffer: String,
    last_outcome: Option<TurnOutcome>,
}

impl TurnState {
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    /// Events for any other stream, or arriving after the turn ended, are stale.
    pub fn is_current(&self, stream_id: u64) -> bool {
        self.is_in_flight() && self.stream_id == stream_id
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn placeholder_id(&self) -> Option<&str> {
        self.placeholder_id.as_deref()
    }

    pub fn visual_id(&self) -> Option<&str> {
        self.visual_id.as_deref()
    }

    pub fn last_outcome(&self) -> Option<TurnOutcome> {
        self.last_outcome
    }

    pub(crate) fn begin(&mut self, stream_id: u64, placeholder_id: String) {
        self.phase = TurnPhase::Streaming;
        self.stream_id = stream_id;
        self.placeholder_id = Some(placeholder_id);
        self.visual_id = None;
        self.buffer.clear();
    }

    /// Append a delta and return the full text received so far.
    pub(crate) fn push_delta(&mut self, delta: &str) -> &str {
        self.buffer.push_str(delta);
        &self.buffer
    }

    pub(crate) fn enter_tool_pending(&mut self, visual_id: String) {
        self.phase = TurnPhase::ToolPending;
        self.placeholder_id = None;
        self.visual_id = Some(visual_id);
    }

    pub(crate) fn finish(&mut self, outcome: TurnOutcome) {
        self.phase = TurnPhase::Idle;
        self.placeholder_id = None;
        self.visual_id = None;
        self.buffer.clear();
        self.last_outcome = Some(outcome);
    }

    /// Drop the turn without recording an outcome (history was purged under it).
    pub(crate) fn abandon(&mut self) {
        self.phase = TurnPhase::Idle;
        self.placeholder_id = None;
        self.visual_id = None;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_ids_only_match_while_in_flight() {
        let mut turn = TurnState::default();
        assert!(!turn.is_current(0));

        turn.begin(4, "m1".into());
        assert!(turn.is_current(4));
        assert!(!turn.is_current(3));

        turn.finish(TurnOutcome::Completed);
        assert!(!turn.is_current(4));
        assert_eq!(turn.last_outcome(), Some(TurnOutcome::Completed));
    }

    #[test]
    fn deltas_accumulate_until_the_next_turn() {
        let mut turn = TurnState::default();
        turn.begin(1, "m1".into());
        turn.push_delta("Hel");
        assert_eq!(turn.push_delta("lo"), "Hello");

        turn.begin(2, "m2".into());
        assert_eq!(turn.push_delta("x"), "x");
    }

    #[test]
    fn tool_pending_swaps_placeholder_for_visual() {
        let mut turn = TurnState::default();
        turn.begin(1, "m1".into());
        turn.enter_tool_pending("v1".into());
        assert_eq!(turn.phase(), TurnPhase::ToolPending);
        assert_eq!(turn.placeholder_id(), None);
        assert_eq!(turn.visual_id(), Some("v1"));
        assert!(turn.is_in_flight());
    }
}
