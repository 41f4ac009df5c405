use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Answer submission payloads and results.
pub mod answer;
/// Broadcast event envelopes and question snapshots.
pub mod events;
/// Health responses.
pub mod health;
/// Leaderboard and statistics projections.
pub mod leaderboard;
/// Session lifecycle requests and summaries.
pub mod session;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
