//! Timeout Operator
//!
//! Bounds a single handler call. The wrapped handler sees a derived context
//! carrying the deadline, and the call is abandoned once it passes.

use crate::handler::{Handler, SharedHandler};
use crate::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

pub struct Timeout {
    handler: SharedHandler,
    limit: Duration,
}

impl Timeout {
    pub fn new<H: Handler + 'static>(handler: H, limit: Duration) -> Self {
        Self {
            handler: Arc::new(handler),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

#[async_trait]
impl Handler for Timeout {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        let scoped = ctx.with_timeout(self.limit);
        let _guard = scoped.cancel_on_drop();
        tokio::select! {
            biased;
            reason = scoped.done() => Err(reason),
            res = self.handler.serve_flow(&scoped, input, output) => res,
        }
    }

    fn name(&self) -> &str {
        "timeout"
    }
}
