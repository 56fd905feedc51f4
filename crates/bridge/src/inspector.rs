//! Inspector trait - the request-sending seam
//!
//! The pause handler and the setup sequence only ever *send* commands. They
//! talk to this trait instead of `CDPClient` so tests can record and fail
//! individual requests without a socket.

use async_trait::async_trait;
use serde_json::Value;

use crate::cdp::client::{CDPClient, Result};

#[async_trait]
pub trait Inspector: Send + Sync {
    /// Send one command and wait for its result
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value>;
}

#[async_trait]
impl Inspector for CDPClient {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.send_request(method, params).await
    }
}
