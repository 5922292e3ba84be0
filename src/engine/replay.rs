// ── Cookielens Engine: Replayer ────────────────────────────────────────────
// Thin stateless wrapper over the host's replay primitive. One request in,
// one outcome out. Retry policy lives in the solver, not here.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::atoms::traits::ReplayTransport;
use crate::atoms::types::{ReplayOutcome, RequestTemplate};

#[derive(Clone)]
pub struct Replayer {
    transport: Arc<dyn ReplayTransport>,
}

impl Replayer {
    pub fn new(transport: Arc<dyn ReplayTransport>) -> Self {
        Replayer { transport }
    }

    /// Send one request. Network errors, timeouts, and empty bodies all
    /// collapse into `Failed(reason)` — the solver treats them uniformly.
    pub async fn replay(&self, request: &RequestTemplate) -> ReplayOutcome {
        match self.transport.send(request).await {
            Ok(response) => {
                if response.body.is_empty() {
                    return ReplayOutcome::Failed { reason: "empty response body".into() };
                }
                ReplayOutcome::Completed {
                    status: response.status,
                    body_len: response.body.len(),
                    digest: digest(&response.body),
                }
            }
            Err(e) => ReplayOutcome::Failed { reason: e.to_string() },
        }
    }
}

/// SHA-256 of a response body.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::traits::{TransportError, TransportResponse};
    use async_trait::async_trait;

    struct FixedTransport(Result<(u16, &'static [u8]), &'static str>);

    #[async_trait]
    impl ReplayTransport for FixedTransport {
        async fn send(&self, _request: &RequestTemplate) -> Result<TransportResponse, TransportError> {
            match &self.0 {
                Ok((status, body)) => Ok(TransportResponse { status: *status, body: body.to_vec() }),
                Err(reason) => Err(TransportError::Network(reason.to_string())),
            }
        }
    }

    fn any_request() -> RequestTemplate {
        RequestTemplate {
            method: "GET".into(),
            url: "https://example.com/".into(),
            headers: vec![],
            body: vec![],
        }
    }

    #[tokio::test]
    async fn replay_digests_body() {
        let replayer = Replayer::new(Arc::new(FixedTransport(Ok((200, b"hello")))));
        match replayer.replay(&any_request()).await {
            ReplayOutcome::Completed { status, body_len, digest: d } => {
                assert_eq!(status, 200);
                assert_eq!(body_len, 5);
                assert_eq!(d, digest(b"hello"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_body_is_a_failure() {
        let replayer = Replayer::new(Arc::new(FixedTransport(Ok((200, b"")))));
        assert!(replayer.replay(&any_request()).await.is_failed());
    }

    #[tokio::test]
    async fn network_error_is_a_failure() {
        let replayer = Replayer::new(Arc::new(FixedTransport(Err("connection refused"))));
        match replayer.replay(&any_request()).await {
            ReplayOutcome::Failed { reason } => assert!(reason.contains("connection refused")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
    }
}
