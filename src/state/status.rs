use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phase of a hosted quiz session.
///
/// Transitions are validated through [`SessionStatus::validate_transition`];
/// terminal phases can never be left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Session exists and participants can join.
    Waiting,
    /// Host pressed start; the countdown to the first question is running.
    Starting,
    /// Questions are being played.
    InProgress,
    /// Host paused gameplay.
    Paused,
    /// Session completed normally; read-only from here on.
    Finished,
    /// Session was cancelled before completion; read-only from here on.
    Cancelled,
}

impl SessionStatus {
    /// Whether this phase can never be left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Finished | SessionStatus::Cancelled)
    }

    /// Whether the requested transition is allowed by the lifecycle graph.
    ///
    /// `Starting -> Waiting` is the rollback edge taken when the start
    /// countdown fails and the session must not be left stranded.
    pub fn can_transition(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Waiting, Starting) => true,
            (Starting, InProgress) => true,
            (Starting, Waiting) => true,
            (InProgress, Paused) => true,
            (Paused, InProgress) => true,
            (Waiting | Starting | InProgress, Finished) => true,
            (from, Cancelled) if !from.is_terminal() => true,
            _ => false,
        }
    }

    /// Validate a transition, producing the error surfaced to callers on refusal.
    pub fn validate_transition(self, next: SessionStatus) -> Result<(), InvalidTransition> {
        if self.can_transition(next) {
            Ok(())
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

/// Error returned when a lifecycle operation is attempted from the wrong phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// Phase the session was in when the transition was requested.
    pub from: SessionStatus,
    /// Phase the transition would have moved the session to.
    pub to: SessionStatus,
}

/// Membership state of a single participant within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    /// Joined the lobby and waiting for the game to start.
    Joined,
    /// Signalled readiness in the lobby.
    Ready,
    /// Actively answering questions.
    Playing,
    /// Finished the game; final rank has been assigned.
    Completed,
    /// Left voluntarily. Access is permanently denied.
    Left,
    /// Removed by the host. Access is permanently denied.
    Kicked,
}

impl ParticipantStatus {
    /// Whether the participant still counts towards the active player count.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ParticipantStatus::Joined | ParticipantStatus::Ready | ParticipantStatus::Playing
        )
    }

    /// Whether the participant is barred from acting on the session.
    pub fn denies_access(self) -> bool {
        matches!(self, ParticipantStatus::Left | ParticipantStatus::Kicked)
    }

    /// Whether the participant occupies a seat against the session capacity.
    ///
    /// Departed participants free their seat; rejoining reclaims it.
    pub fn holds_seat(self) -> bool {
        !self.denies_access()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_valid() {
        use SessionStatus::*;
        for (from, to) in [
            (Waiting, Starting),
            (Starting, InProgress),
            (InProgress, Paused),
            (Paused, InProgress),
            (InProgress, Finished),
        ] {
            assert!(from.can_transition(to), "{from:?} -> {to:?} should be valid");
        }
    }

    #[test]
    fn terminal_states_cannot_be_left() {
        use SessionStatus::*;
        for from in [Finished, Cancelled] {
            for to in [Waiting, Starting, InProgress, Paused, Finished, Cancelled] {
                assert!(!from.can_transition(to), "{from:?} -> {to:?} should be refused");
            }
        }
    }

    #[test]
    fn cancel_is_allowed_from_any_non_terminal_state() {
        use SessionStatus::*;
        for from in [Waiting, Starting, InProgress, Paused] {
            assert!(from.can_transition(Cancelled));
        }
    }

    #[test]
    fn paused_sessions_must_resume_before_finishing() {
        assert!(!SessionStatus::Paused.can_transition(SessionStatus::Finished));
    }

    #[test]
    fn start_failure_rolls_back_to_waiting() {
        assert!(SessionStatus::Starting.can_transition(SessionStatus::Waiting));
    }

    #[test]
    fn validate_transition_reports_both_ends() {
        let err = SessionStatus::Waiting
            .validate_transition(SessionStatus::Paused)
            .unwrap_err();
        assert_eq!(err.from, SessionStatus::Waiting);
        assert_eq!(err.to, SessionStatus::Paused);
    }

    #[test]
    fn left_and_kicked_deny_access() {
        assert!(ParticipantStatus::Left.denies_access());
        assert!(ParticipantStatus::Kicked.denies_access());
        assert!(!ParticipantStatus::Playing.denies_access());
        assert!(!ParticipantStatus::Playing.denies_access() && ParticipantStatus::Playing.is_active());
    }
}
