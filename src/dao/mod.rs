/// Short-TTL projection cache primitives.
pub mod cache;
/// Read-only gateway to the quiz authoring subsystem.
pub mod quiz_catalog;
/// Session, participant, and answer persistence.
pub mod session_store;
/// Storage abstraction layer shared by all backends.
pub mod storage;
