use serde::Serialize;
use utoipa::ToSchema;

/// Overall service condition reported by the healthcheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    /// The session store is attached and writable.
    Ok,
    /// Running without a session store; writes are rejected until the
    /// supervisor reattaches one.
    Degraded,
}

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall condition.
    pub status: ServiceHealth,
}

impl HealthResponse {
    /// Build the payload from the engine's degraded flag.
    pub fn report(degraded: bool) -> Self {
        let status = if degraded {
            ServiceHealth::Degraded
        } else {
            ServiceHealth::Ok
        };
        Self { status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serializes_as_lowercase_tag() {
        let healthy = serde_json::to_value(HealthResponse::report(false)).unwrap();
        assert_eq!(healthy["status"], "ok");

        let degraded = serde_json::to_value(HealthResponse::report(true)).unwrap();
        assert_eq!(degraded["status"], "degraded");
    }
}
