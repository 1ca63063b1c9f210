// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-memory agency cluster.
//!
//! Simulates a set of agents sharing one store, for tests and local
//! development. Each agent endpoint has an [`AgentRole`]: the leader serves
//! reads and writes, followers answer 307 with the leader's `Location` (no
//! `Location` during an election), and agents that are down fail at the
//! transport level. Connections obtained
//! from [`InMemoryCluster::connection`] route every request by their current
//! endpoint, so the client's redirect and endpoint-replacement logic runs
//! unmodified.
//!
//! Expiry (`ttl`) is accepted but not enforced.
//!
//! # Example
//!
//! ```rust
//! use arango_agency::memory::InMemoryCluster;
//!
//! # tokio_test::block_on(async {
//! let cluster = InMemoryCluster::with_agents("http://agent-1:8531", &["http://agent-2:8531"]);
//! let follower = cluster.agency(["http://agent-2:8531"]).unwrap();
//!
//! cluster.seed(["arango", "Plan", "Version"], serde_json::json!(12));
//! let version: u64 = follower.read_key(["arango", "Plan", "Version"]).await.unwrap();
//! assert_eq!(version, 12);
//! assert_eq!(follower.endpoints(), vec!["http://agent-1:8531".to_string()]);
//! # });
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use arango_connection::{
    normalize_endpoint, Connection, ConnectionError, EndpointList, Method, Request, Response,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{Agency, READ_PATH, TRANSIENT_PATH, WRITE_PATH};
use crate::key::Key;

/// What an agent does with requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    /// Serves reads and writes.
    Leader,
    /// Redirects to the leader, or answers a bare 307 while there is none.
    Follower,
    /// Unreachable.
    Down,
}

#[derive(Debug, Default)]
struct ClusterState {
    agents: BTreeMap<String, AgentRole>,
    store: Value,
    transient: Value,
    log_index: u64,
    observers: BTreeMap<String, Vec<String>>,
    requests: Vec<(String, String)>,
}

impl ClusterState {
    fn leader(&self) -> Option<&String> {
        self.agents
            .iter()
            .find(|(_, role)| **role == AgentRole::Leader)
            .map(|(endpoint, _)| endpoint)
    }
}

/// A simulated agency cluster. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl InMemoryCluster {
    /// A cluster with no agents and an empty store.
    pub fn new() -> Self {
        let cluster = Self::default();
        {
            let mut state = cluster.lock();
            state.store = json!({});
            state.transient = json!({});
        }
        cluster
    }

    /// A cluster with one leader and the given followers.
    pub fn with_agents(leader: &str, followers: &[&str]) -> Self {
        let cluster = Self::new();
        cluster.set_role(leader, AgentRole::Leader);
        for follower in followers {
            cluster.set_role(follower, AgentRole::Follower);
        }
        cluster
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an agent or change its role. Endpoints are normalised; an
    /// unparsable endpoint is stored verbatim.
    pub fn set_role(&self, endpoint: &str, role: AgentRole) {
        let endpoint = normalize_endpoint(endpoint).unwrap_or_else(|_| endpoint.to_string());
        self.lock().agents.insert(endpoint, role);
    }

    /// Make `endpoint` the leader; the previous leader becomes a follower.
    pub fn elect(&self, endpoint: &str) {
        let endpoint = normalize_endpoint(endpoint).unwrap_or_else(|_| endpoint.to_string());
        let mut state = self.lock();
        for (agent, role) in state.agents.iter_mut() {
            if *agent == endpoint {
                *role = AgentRole::Leader;
            } else if *role == AgentRole::Leader {
                *role = AgentRole::Follower;
            }
        }
    }

    /// Current leader, if any.
    pub fn leader(&self) -> Option<String> {
        self.lock().leader().cloned()
    }

    /// A connection starting at `endpoints`.
    pub fn connection<I, S>(&self, endpoints: I) -> arango_connection::Result<ClusterConnection>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = EndpointList::new(endpoints)?;
        let name = format!("in-memory:{}", endpoints.snapshot().join(","));
        Ok(ClusterConnection {
            cluster: self.clone(),
            endpoints,
            name,
        })
    }

    /// An [`Agency`] over a fresh connection starting at `endpoints`.
    pub fn agency<I, S>(&self, endpoints: I) -> arango_connection::Result<Agency>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Agency::new(Arc::new(self.connection(endpoints)?)))
    }

    /// Store `value` at `key` directly, bypassing the protocol.
    pub fn seed(&self, key: impl Into<Key>, value: Value) {
        let key = key.into();
        set_path(&mut self.lock().store, key.segments(), value);
    }

    /// Copy of the persistent store.
    pub fn snapshot(&self) -> Value {
        self.lock().store.clone()
    }

    /// Copy of the transient store.
    pub fn transient_snapshot(&self) -> Value {
        self.lock().transient.clone()
    }

    /// Index of the last committed transaction.
    pub fn log_index(&self) -> u64 {
        self.lock().log_index
    }

    /// Callback URLs registered for `key`.
    pub fn observers(&self, key: impl Into<Key>) -> Vec<String> {
        self.lock()
            .observers
            .get(&key.into().full_key())
            .cloned()
            .unwrap_or_default()
    }

    /// Every `(endpoint, path)` served so far, in order.
    pub fn request_log(&self) -> Vec<(String, String)> {
        self.lock().requests.clone()
    }

    fn handle(&self, endpoint: &str, request: &Request) -> arango_connection::Result<Response> {
        let mut state = self.lock();
        let role = state.agents.get(endpoint).copied().unwrap_or(AgentRole::Down);
        if role == AgentRole::Down {
            return Err(ConnectionError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        state
            .requests
            .push((endpoint.to_string(), request.path.clone()));

        if role == AgentRole::Follower {
            let redirect = Response::new(307, endpoint);
            return Ok(match state.leader() {
                Some(leader) => redirect.with_header("location", format!("{leader}{}", request.path)),
                None => redirect,
            });
        }

        if request.method != Method::POST {
            return Response::new(405, endpoint).with_json(&json!({"error": true}));
        }
        let body = request.body.clone().unwrap_or(Value::Null);
        match request.path.as_str() {
            READ_PATH => match read_queries(&state.store, &body) {
                Some(trees) => Response::new(200, endpoint).with_json(&trees),
                None => bad_request(endpoint),
            },
            WRITE_PATH | TRANSIENT_PATH => {
                let transient = request.path == TRANSIENT_PATH;
                match apply_batch(&mut state, &body, transient) {
                    Some(results) => {
                        let status = if results.contains(&0) { 412 } else { 200 };
                        debug!(%endpoint, ?results, "in-memory agency write");
                        Response::new(status, endpoint).with_json(&json!({ "results": results }))
                    }
                    None => bad_request(endpoint),
                }
            }
            _ => Response::new(404, endpoint).with_json(&json!({"error": true})),
        }
    }
}

fn bad_request(endpoint: &str) -> arango_connection::Result<Response> {
    Response::new(400, endpoint).with_json(&json!({"error": true, "errorMessage": "malformed body"}))
}

/// Answer a read batch: one tree per query, each holding the requested
/// paths (and nothing else). A missing path is answered down to its deepest
/// existing ancestor.
fn read_queries(store: &Value, body: &Value) -> Option<Value> {
    let queries = body.as_array()?;
    let mut trees = Vec::with_capacity(queries.len());
    for query in queries {
        let mut tree = json!({});
        for full_key in query.as_array()? {
            let key = Key::parse(full_key.as_str()?);
            copy_path(store, &mut tree, key.segments());
        }
        trees.push(tree);
    }
    Some(Value::Array(trees))
}

fn copy_path(store: &Value, tree: &mut Value, path: &[String]) {
    let depth = (0..=path.len())
        .rev()
        .find(|&d| get_path(store, &path[..d]).is_some())
        .unwrap_or(0);
    let prefix = &path[..depth];
    match get_path(store, prefix) {
        Some(node) if depth == path.len() || !node.is_object() => {
            set_path(tree, prefix, node.clone())
        }
        _ => ensure_object(tree, prefix),
    }
}

fn ensure_object(root: &mut Value, path: &[String]) {
    if !root.is_object() {
        *root = json!({});
    }
    if let (Some((first, rest)), Value::Object(map)) = (path.split_first(), root) {
        ensure_object(map.entry(first.clone()).or_insert_with(|| json!({})), rest);
    }
}

/// Apply a write batch. Each transaction yields its log index, or 0 if a
/// precondition failed. `None` means the body is malformed; the whole batch
/// is validated first, so a malformed batch changes nothing.
fn apply_batch(state: &mut ClusterState, body: &Value, transient: bool) -> Option<Vec<u64>> {
    let batch = parse_batch(body)?;
    let mut results = Vec::with_capacity(batch.len());
    for tx in batch {
        let target = if transient {
            &state.transient
        } else {
            &state.store
        };
        if !tx
            .conditions
            .iter()
            .all(|&(key, condition)| holds(target, &Key::parse(key), condition))
        {
            results.push(0);
            continue;
        }

        for (key, operation) in tx.mutations {
            apply_operation(state, transient, &key, operation);
        }
        state.log_index += 1;
        results.push(state.log_index);
    }
    Some(results)
}

/// One validated transaction of a write batch.
struct PendingTransaction<'b> {
    mutations: Vec<(Key, Operation)>,
    conditions: Vec<(&'b String, &'b Value)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operation {
    Set(Value),
    Delete,
    Increment(i64),
    Decrement(i64),
    Push(Value),
    Erase(Value),
    Observe(String),
    Unobserve(String),
}

fn parse_batch(body: &Value) -> Option<Vec<PendingTransaction<'_>>> {
    body.as_array()?
        .iter()
        .map(|entry| {
            let parts = entry.as_array()?;
            let mutations = parts
                .first()?
                .as_object()?
                .iter()
                .map(|(key, descriptor)| Some((Key::parse(key), parse_operation(descriptor)?)))
                .collect::<Option<Vec<_>>>()?;
            let conditions = match parts.get(1) {
                Some(c) => c.as_object()?.iter().collect(),
                None => Vec::new(),
            };
            Some(PendingTransaction {
                mutations,
                conditions,
            })
        })
        .collect()
}

fn parse_operation(descriptor: &Value) -> Option<Operation> {
    let op = descriptor.get("op").and_then(Value::as_str).unwrap_or("set");
    let step = || descriptor.get("step").and_then(Value::as_i64).unwrap_or(1);
    let url = || descriptor.get("url")?.as_str().map(str::to_string);
    Some(match op {
        "set" => Operation::Set(descriptor.get("new")?.clone()),
        "delete" => Operation::Delete,
        "increment" => Operation::Increment(step()),
        "decrement" => Operation::Decrement(step()),
        "push" => Operation::Push(descriptor.get("new")?.clone()),
        "erase" => Operation::Erase(descriptor.get("val")?.clone()),
        "observe" => Operation::Observe(url()?),
        "unobserve" => Operation::Unobserve(url()?),
        _ => return None,
    })
}

fn holds(store: &Value, key: &Key, condition: &Value) -> bool {
    let current = get_path(store, key.segments());
    let Some(condition) = condition.as_object() else {
        // A bare value is shorthand for `{"old": value}`.
        return current == Some(condition);
    };
    condition.iter().all(|(name, operand)| match name.as_str() {
        "old" => current == Some(operand),
        "oldEmpty" => operand.as_bool() == Some(current.is_none()),
        "isArray" => operand.as_bool() == Some(current.map_or(false, Value::is_array)),
        _ => false,
    })
}

fn apply_operation(state: &mut ClusterState, transient: bool, key: &Key, operation: Operation) {
    let store = if transient {
        &mut state.transient
    } else {
        &mut state.store
    };
    let path = key.segments();

    match operation {
        Operation::Set(new) => set_path(store, path, new),
        Operation::Delete => remove_path(store, path),
        // Counters saturate at the i64 bounds.
        Operation::Increment(step) => update_counter(store, path, |n| n.saturating_add(step)),
        Operation::Decrement(step) => update_counter(store, path, |n| n.saturating_sub(step)),
        Operation::Push(new) => {
            let mut array = match get_path(store, path) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            array.push(new);
            set_path(store, path, Value::Array(array));
        }
        Operation::Erase(val) => {
            if let Some(Value::Array(items)) = get_path(store, path) {
                let kept: Vec<Value> = items.iter().filter(|v| **v != val).cloned().collect();
                set_path(store, path, Value::Array(kept));
            }
        }
        Operation::Observe(url) => {
            let urls = state.observers.entry(key.full_key()).or_default();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Operation::Unobserve(url) => {
            if let Some(urls) = state.observers.get_mut(&key.full_key()) {
                urls.retain(|u| *u != url);
            }
        }
    }
}

fn update_counter(store: &mut Value, path: &[String], f: impl FnOnce(i64) -> i64) {
    let current = get_path(store, path).and_then(Value::as_i64).unwrap_or(0);
    set_path(store, path, json!(f(current)));
}

fn get_path<'v>(root: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(root, |node, segment| node.get(segment.as_str()))
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *root = value;
        return;
    };
    if !root.is_object() {
        *root = json!({});
    }
    if let Value::Object(map) = root {
        set_path(map.entry(first.clone()).or_insert(Value::Null), rest, value);
    }
}

fn remove_path(root: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        *root = json!({});
        return;
    };
    let mut node = root;
    for segment in parents {
        match node.get_mut(segment.as_str()) {
            Some(child) => node = child,
            None => return,
        }
    }
    if let Some(map) = node.as_object_mut() {
        map.remove(last);
    }
}

/// A [`Connection`] into an [`InMemoryCluster`].
#[derive(Debug)]
pub struct ClusterConnection {
    cluster: InMemoryCluster,
    endpoints: EndpointList,
    name: String,
}

#[async_trait]
impl Connection for ClusterConnection {
    async fn execute(&self, request: Request) -> arango_connection::Result<Response> {
        let endpoint = self.endpoints.next();
        self.cluster.handle(&endpoint, &request)
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.snapshot().as_ref().clone()
    }

    fn set_endpoints(&self, endpoints: Vec<String>) -> arango_connection::Result<()> {
        self.endpoints.replace(&endpoints)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
