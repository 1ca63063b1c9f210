// SPDX-License-Identifier: PMPL-1.0-or-later
//! Scripted connection for unit tests that need exact wire responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use arango_connection::{Connection, ConnectionError, EndpointList, Request, Response};
use async_trait::async_trait;
use serde_json::Value;

use crate::client::Agency;
use crate::config::AgencyConfig;

/// One canned answer.
pub(crate) enum Reply {
    Status(u16, Value),
    Redirect(Option<&'static str>),
    Fail,
    /// Never answers.
    Hang,
    /// Panics inside `execute`.
    Panic,
}

/// Replays queued replies in order and records what was sent where.
pub(crate) struct ScriptedConnection {
    endpoints: EndpointList,
    replies: Mutex<VecDeque<Reply>>,
    pub(crate) sent: Mutex<Vec<(String, Request)>>,
}

impl ScriptedConnection {
    pub(crate) fn new(endpoint: &str, replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            endpoints: EndpointList::new([endpoint]).unwrap(),
            replies: Mutex::new(replies.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent(&self) -> Vec<(String, Request)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute(&self, request: Request) -> arango_connection::Result<Response> {
        let endpoint = self.endpoints.next();
        self.sent.lock().unwrap().push((endpoint.clone(), request));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        match reply {
            Reply::Status(status, body) => Response::new(status, endpoint).with_json(&body),
            Reply::Redirect(Some(location)) => {
                Ok(Response::new(307, endpoint).with_header("Location", location))
            }
            Reply::Redirect(None) => Ok(Response::new(307, endpoint)),
            Reply::Fail => Err(ConnectionError::Unreachable {
                endpoint,
                reason: "connection refused".to_string(),
            }),
            Reply::Hang => std::future::pending().await,
            Reply::Panic => panic!("scripted connection to {endpoint} crashed"),
        }
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.snapshot().as_ref().clone()
    }

    fn set_endpoints(&self, endpoints: Vec<String>) -> arango_connection::Result<()> {
        self.endpoints.replace(&endpoints)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// An agency over a scripted connection, plus the connection for inspection.
pub(crate) fn scripted(endpoint: &str, replies: Vec<Reply>) -> (Agency, Arc<ScriptedConnection>) {
    let conn = ScriptedConnection::new(endpoint, replies);
    (Agency::new(conn.clone()), conn)
}

/// Like [`scripted`], with a non-default client configuration.
pub(crate) fn scripted_with_config(
    endpoint: &str,
    replies: Vec<Reply>,
    config: AgencyConfig,
) -> (Agency, Arc<ScriptedConnection>) {
    let conn = ScriptedConnection::new(endpoint, replies);
    (Agency::with_config(conn.clone(), config), conn)
}
