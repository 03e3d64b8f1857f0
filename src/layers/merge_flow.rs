//! Guided two-step layer merge
//!
//! `start` arms the session, the first selection picks the layer whose color
//! survives, the second selection completes the merge.

/// Where the guided merge currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeState {
    #[default]
    Idle,
    AwaitingFirst,
    AwaitingSecond {
        first: usize,
    },
}

/// Result of selecting a layer during a guided merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// No merge in progress
    Ignored,
    /// First layer recorded; waiting for the second
    First(usize),
    /// The first layer was picked again; still waiting for the second
    SameLayer(usize),
    /// Index outside the stack; state unchanged
    OutOfRange(usize),
    /// Both layers chosen; the session is idle again
    Complete { first: usize, second: usize },
}

#[derive(Debug, Clone, Default)]
pub struct MergeSession {
    state: MergeState,
}

impl MergeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Arm the session; restarting discards any pending first selection
    pub fn start(&mut self) {
        self.state = MergeState::AwaitingFirst;
    }

    /// Abandon the merge without touching anything
    pub fn cancel(&mut self) {
        self.state = MergeState::Idle;
    }

    /// Feed a layer selection from a stack of `layer_count` layers
    pub fn select_layer(&mut self, index: usize, layer_count: usize) -> Selection {
        if self.state != MergeState::Idle && index >= layer_count {
            return Selection::OutOfRange(index);
        }

        match self.state {
            MergeState::Idle => Selection::Ignored,
            MergeState::AwaitingFirst => {
                self.state = MergeState::AwaitingSecond { first: index };
                Selection::First(index)
            }
            MergeState::AwaitingSecond { first } if first == index => Selection::SameLayer(index),
            MergeState::AwaitingSecond { first } => {
                self.state = MergeState::Idle;
                Selection::Complete {
                    first,
                    second: index,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_flow() {
        let mut session = MergeSession::new();
        assert_eq!(session.state(), MergeState::Idle);

        session.start();
        assert_eq!(session.state(), MergeState::AwaitingFirst);

        assert_eq!(session.select_layer(2, 4), Selection::First(2));
        assert_eq!(session.state(), MergeState::AwaitingSecond { first: 2 });

        assert_eq!(
            session.select_layer(0, 4),
            Selection::Complete {
                first: 2,
                second: 0
            }
        );
        assert_eq!(session.state(), MergeState::Idle);
    }

    #[test]
    fn test_same_layer_rejected() {
        let mut session = MergeSession::new();
        session.start();
        session.select_layer(1, 3);
        assert_eq!(session.select_layer(1, 3), Selection::SameLayer(1));
        assert_eq!(session.state(), MergeState::AwaitingSecond { first: 1 });
    }

    #[test]
    fn test_idle_ignores_selection() {
        let mut session = MergeSession::new();
        assert_eq!(session.select_layer(0, 3), Selection::Ignored);
        assert_eq!(session.state(), MergeState::Idle);
    }

    #[test]
    fn test_cancel_from_either_state() {
        let mut session = MergeSession::new();
        session.start();
        session.cancel();
        assert_eq!(session.state(), MergeState::Idle);

        session.start();
        session.select_layer(0, 2);
        session.cancel();
        assert_eq!(session.state(), MergeState::Idle);
    }

    #[test]
    fn test_out_of_range_keeps_state() {
        let mut session = MergeSession::new();
        session.start();
        assert_eq!(session.select_layer(5, 3), Selection::OutOfRange(5));
        assert_eq!(session.state(), MergeState::AwaitingFirst);
    }
}
