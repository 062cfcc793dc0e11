//! Remote link lifecycle.

use std::fmt;

/// Connection state of the remote link.
///
/// `Idle` is the only initial state, `Open` is reachable only from
/// `Connecting`, and `Closed`/`Failed` are terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Failed(String),
}

impl LinkState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }

    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether `self -> next` is a legal transition.
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Open)
                | (Self::Connecting | Self::Open, Self::Closed | Self::Failed(_))
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> LinkState {
        LinkState::Failed("refused".into())
    }

    #[test]
    fn happy_path_transitions() {
        assert!(LinkState::Idle.can_transition_to(&LinkState::Connecting));
        assert!(LinkState::Connecting.can_transition_to(&LinkState::Open));
        assert!(LinkState::Open.can_transition_to(&LinkState::Closed));
        assert!(LinkState::Open.can_transition_to(&failed()));
        assert!(LinkState::Connecting.can_transition_to(&failed()));
    }

    #[test]
    fn open_only_from_connecting() {
        assert!(!LinkState::Idle.can_transition_to(&LinkState::Open));
        assert!(!LinkState::Closed.can_transition_to(&LinkState::Open));
        assert!(!failed().can_transition_to(&LinkState::Open));
    }

    #[test]
    fn terminal_states_are_final() {
        let states = [
            LinkState::Idle,
            LinkState::Connecting,
            LinkState::Open,
            LinkState::Closed,
            failed(),
        ];
        for terminal in [LinkState::Closed, failed()] {
            assert!(terminal.is_terminal());
            for next in &states {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn idle_cannot_fail_or_close() {
        assert!(!LinkState::Idle.can_transition_to(&LinkState::Closed));
        assert!(!LinkState::Idle.can_transition_to(&failed()));
    }

    #[test]
    fn display_includes_failure_reason() {
        assert_eq!(failed().to_string(), "failed (refused)");
        assert_eq!(LinkState::default(), LinkState::Idle);
    }
}
