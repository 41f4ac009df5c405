/// Idempotent answer submission and skip handling.
pub mod answer_intake;
/// OpenAPI documentation generation.
pub mod documentation;
/// Session event broadcasting helpers.
pub mod events;
/// Grading dispatch across question types.
pub mod grading;
/// Health check service.
pub mod health_service;
/// Ranked standings projector.
pub mod leaderboard;
/// Session lifecycle controller.
pub mod lifecycle;
/// Read-side projections: rosters, boards, statistics.
pub mod projections;
/// Question broadcast and answer deadlines.
pub mod question_clock;
/// Speed-bonus scoring policy.
pub mod scoring;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage reconnection supervisor.
pub mod storage_supervisor;
