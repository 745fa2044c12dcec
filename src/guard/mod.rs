//! Connection guards.
//!
//! # Data Flow
//! ```text
//! new connection / instance join
//!     → guard chain, in registration order
//!     → first `false`      → AccessDenied, remaining guards skipped
//!     → domain error       → forwarded as-is
//!     → any other failure  → logged, InternalServerError
//!     → all true           → proceed
//! ```
//!
//! # Design Decisions
//! - Guards are async: authorization usually hits a token store
//! - Guards attach their result to the context payload slot for handlers
//! - One chain type serves both the router level and the instance level

use std::sync::Arc;

use async_trait::async_trait;

use crate::controller::ConnectionContext;
use crate::error::SessionError;

/// Async predicate deciding whether a connection may proceed.
#[async_trait]
pub trait Guard: Send + Sync {
    /// Return `Ok(false)` to deny access, or an error to abort with a
    /// specific status. A guard may stash data on the context payload slot
    /// for the handler to read later.
    async fn allow(&self, ctx: &ConnectionContext) -> Result<bool, SessionError>;
}

/// Evaluate `guards` in order against `ctx`.
///
/// The first `false` short-circuits to AccessDenied. Domain errors pass
/// through untouched; anything else is logged and becomes
/// InternalServerError.
pub async fn check(guards: &[Arc<dyn Guard>], ctx: &ConnectionContext) -> Result<(), SessionError> {
    for guard in guards {
        match guard.allow(ctx).await {
            Ok(true) => {}
            Ok(false) => return Err(SessionError::access_denied()),
            Err(err) if err.is_domain() => return Err(err),
            Err(err) => {
                tracing::error!(connection_id = %ctx.id(), error = %err, "guard failed");
                return Err(SessionError::internal());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::mock_context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedGuard(bool);

    #[async_trait]
    impl Guard for FixedGuard {
        async fn allow(&self, _ctx: &ConnectionContext) -> Result<bool, SessionError> {
            Ok(self.0)
        }
    }

    struct CountingGuard(Arc<AtomicUsize>);

    #[async_trait]
    impl Guard for CountingGuard {
        async fn allow(&self, _ctx: &ConnectionContext) -> Result<bool, SessionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    struct FailingGuard;

    #[async_trait]
    impl Guard for FailingGuard {
        async fn allow(&self, _ctx: &ConnectionContext) -> Result<bool, SessionError> {
            Err(anyhow::anyhow!("token store unreachable").into())
        }
    }

    #[tokio::test]
    async fn empty_chain_allows() {
        let ctx = mock_context("/x");
        assert!(check(&[], &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn first_false_short_circuits() {
        let ctx = mock_context("/x");
        let hits = Arc::new(AtomicUsize::new(0));
        let guards: Vec<Arc<dyn Guard>> = vec![
            Arc::new(FixedGuard(false)),
            Arc::new(CountingGuard(hits.clone())),
        ];

        let err = check(&guards, &ctx).await.expect_err("denied");
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn domain_error_is_forwarded() {
        struct NotFoundGuard;

        #[async_trait]
        impl Guard for NotFoundGuard {
            async fn allow(&self, _ctx: &ConnectionContext) -> Result<bool, SessionError> {
                Err(SessionError::not_found())
            }
        }

        let ctx = mock_context("/x");
        let guards: Vec<Arc<dyn Guard>> = vec![Arc::new(NotFoundGuard)];
        let err = check(&guards, &ctx).await.expect_err("error forwarded");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unrecognized_failure_becomes_internal() {
        let ctx = mock_context("/x");
        let guards: Vec<Arc<dyn Guard>> = vec![Arc::new(FailingGuard)];
        let err = check(&guards, &ctx).await.expect_err("error mapped");
        assert_eq!(err.kind(), ErrorKind::InternalServerError);
    }
}
