//! Request metadata captured by the public tracking endpoints.

use serde::{Deserialize, Serialize};

/// `{ip, userAgent, referer}`, extracted from every tracking request and
/// attached to the `open`/`click`/`unsubscribe`/`view` event it produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}
