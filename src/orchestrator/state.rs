//! Per-turn state machine: `Idle → ModelGenerating → (ToolPending)* → Finalizing → Done`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    ModelGenerating,
    ToolPending,
    Finalizing,
    Done,
    /// Ended by a turn-level error.
    Failed,
}

impl TurnState {
    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (Idle, ModelGenerating) => true,
            (ModelGenerating, ToolPending | Finalizing) => true,
            // Results folded back into context re-enter generation.
            (ToolPending, ToolPending | ModelGenerating | Finalizing) => true,
            (Finalizing, Done) => true,
            (Done | Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Done | TurnState::Failed)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::ModelGenerating => "model_generating",
            TurnState::ToolPending => "tool_pending",
            TurnState::Finalizing => "finalizing",
            TurnState::Done => "done",
            TurnState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::TurnState::*;

    #[test]
    fn happy_path_with_fold() {
        let path = [Idle, ModelGenerating, ToolPending, ToolPending, ModelGenerating, Finalizing, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_are_sticky() {
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(ModelGenerating));
        assert!(ToolPending.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Finalizing));
        assert!(Done.is_terminal() && Failed.is_terminal());
        assert!(!ToolPending.is_terminal());
    }
}
