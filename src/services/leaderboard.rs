//! Leaderboard projection: ranked standings recomputed from participant
//! state, served through a short-TTL cache during live play.

use uuid::Uuid;

use crate::{
    dto::leaderboard::LeaderboardEntry,
    error::ServiceError,
    state::{SharedState, session::Participant, status::ParticipantStatus},
};

/// Compute ranked standings from a participant set.
///
/// Kicked participants are excluded; everyone else keeps their row, including
/// players who left mid-game. Ties on score break by cumulative response
/// time, fastest first. Ranks are a contiguous 1..N sequence.
pub fn compute(participants: &[Participant]) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&Participant> = participants
        .iter()
        .filter(|p| p.status != ParticipantStatus::Kicked)
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.total_response_ms.cmp(&b.total_response_ms))
    });

    ranked
        .into_iter()
        .enumerate()
        .map(|(index, p)| LeaderboardEntry {
            rank: index as u32 + 1,
            participant_id: p.id,
            nickname: p.nickname.clone(),
            score: p.score,
            correct_count: p.correct_count,
            streak: p.streak,
            avg_response_ms: p.average_response_ms(),
            anonymous: p.is_anonymous(),
        })
        .collect()
}

/// Project the live leaderboard, reading through the short-TTL cache.
pub async fn rank(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    if let Some(cached) = state.caches().leaderboards.get(&session_id) {
        return Ok(cached);
    }

    let store = state.require_store().await?;
    let participants = store.list_participants(session_id).await?;
    let board = compute(&participants);
    state.caches().leaderboards.put(session_id, board.clone());
    Ok(board)
}

/// Drop the cached projection so the next read recomputes from the store.
pub fn invalidate(state: &SharedState, session_id: Uuid) {
    state.caches().leaderboards.invalidate(&session_id);
}

/// Compute the final leaderboard, persist each participant's rank, and mark
/// still-active participants as completed.
///
/// Called exactly once, from `end`; later reads serve the persisted ranks.
pub async fn final_rank(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let store = state.require_store().await?;
    let participants = store.list_participants(session_id).await?;
    let board = compute(&participants);

    for entry in &board {
        let Some(mut participant) = participants
            .iter()
            .find(|p| p.id == entry.participant_id)
            .cloned()
        else {
            continue;
        };
        participant.final_rank = Some(entry.rank);
        if participant.status.is_active() {
            participant.status = ParticipantStatus::Completed;
        }
        state.persist_participant(&participant).await?;
    }

    state.caches().leaderboards.invalidate(&session_id);
    Ok(board)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(nickname: &str, score: u32, total_ms: u64) -> Participant {
        let mut p = Participant::new(Uuid::new_v4(), None, nickname.into());
        p.score = score;
        p.total_response_ms = total_ms;
        p
    }

    #[test]
    fn ordering_is_score_desc_then_latency_asc() {
        let participants = vec![
            participant("slow-high", 900, 40_000),
            participant("fast-high", 900, 10_000),
            participant("top", 1500, 60_000),
            participant("low", 100, 1_000),
        ];

        let board = compute(&participants);
        let names: Vec<&str> = board.iter().map(|entry| entry.nickname.as_str()).collect();
        assert_eq!(names, ["top", "fast-high", "slow-high", "low"]);

        let ranks: Vec<u32> = board.iter().map(|entry| entry.rank).collect();
        assert_eq!(ranks, [1, 2, 3, 4]);
    }

    #[test]
    fn kicked_participants_are_excluded() {
        let mut kicked = participant("kicked", 2000, 0);
        kicked.status = ParticipantStatus::Kicked;
        let mut left = participant("left", 500, 0);
        left.status = ParticipantStatus::Left;
        let participants = vec![kicked, left, participant("active", 800, 0)];

        let board = compute(&participants);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].nickname, "active");
        assert_eq!(board[1].nickname, "left");
    }

    #[test]
    fn empty_sessions_produce_empty_boards() {
        assert!(compute(&[]).is_empty());
    }
}
