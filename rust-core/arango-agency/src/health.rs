// SPDX-License-Identifier: PMPL-1.0-or-later
//! Cluster health verification.
//!
//! Every agent gets its own probe: a read of a key that never exists. A
//! leader answers directly (key not found); a follower redirects, which
//! moves the probing client's endpoint set to the leader. Comparing the
//! endpoint set before and after the read therefore tells leaders from
//! followers without a dedicated endpoint.
//!
//! Probes run concurrently in a [`JoinSet`]; every probe is joined before the
//! results are reduced to a verdict. Dropping the future returned by
//! [`are_agents_healthy`] aborts all in-flight probes.

use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::client::Agency;
use crate::error::{AgencyError, Result};

/// Tolerances for [`are_agents_healthy`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckOptions {
    /// Accept a cluster in which no agent currently answers as leader
    /// (maintenance windows, elections in progress).
    pub allow_no_leader: bool,
    /// Accept agents that disagree about the leader endpoint, and more than
    /// one agent answering as leader (rolling upgrades).
    pub allow_different_leader_endpoints: bool,
    /// Per-agent probe timeout for every client. `None` uses each
    /// client's own [`AgencyConfig::probe_timeout`].
    ///
    /// [`AgencyConfig::probe_timeout`]: crate::config::AgencyConfig::probe_timeout
    pub probe_timeout: Option<Duration>,
}

impl HealthCheckOptions {
    /// Builder-style setter for [`allow_no_leader`](Self::allow_no_leader).
    pub fn allow_no_leader(mut self) -> Self {
        self.allow_no_leader = true;
        self
    }

    /// Builder-style setter for
    /// [`allow_different_leader_endpoints`](Self::allow_different_leader_endpoints).
    pub fn allow_different_leader_endpoints(mut self) -> Self {
        self.allow_different_leader_endpoints = true;
        self
    }

    /// Use `timeout` for every probe, overriding the clients' settings.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }
}

/// Classification of one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    /// The agent's endpoint(s) as configured on its client.
    pub endpoint: String,
    /// The agent answered the probe itself.
    pub is_leader: bool,
    /// Who the agent considers leader. `None` if it redirected without
    /// saying where to.
    pub leader_endpoint: Option<String>,
    /// The agent produced a usable answer.
    pub is_responding: bool,
    /// Why the agent is not responding.
    pub error: Option<String>,
}

impl AgentStatus {
    fn leader(endpoint: String) -> Self {
        Self {
            leader_endpoint: Some(endpoint.clone()),
            endpoint,
            is_leader: true,
            is_responding: true,
            error: None,
        }
    }

    fn follower(endpoint: String, leader_endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            is_leader: false,
            leader_endpoint,
            is_responding: true,
            error: None,
        }
    }

    fn unresponsive(endpoint: String, reason: String) -> Self {
        Self {
            endpoint,
            is_leader: false,
            leader_endpoint: None,
            is_responding: false,
            error: Some(reason),
        }
    }
}

/// Raw probe results, one entry per client in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Per-agent classification.
    pub agents: Vec<AgentStatus>,
}

impl HealthReport {
    /// Number of agents that answered as leader.
    pub fn leader_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_leader).count()
    }

    /// Reduce the report to a single verdict.
    ///
    /// 1. Any unresponsive agent fails the check.
    /// 2. Unless different leader endpoints are allowed, each agent's
    ///    leader must be the same host as the previous agent's.
    /// 3. Exactly one leader passes. Zero passes only with
    ///    `allow_no_leader`; more than one only with
    ///    `allow_different_leader_endpoints`.
    pub fn verdict(&self, options: &HealthCheckOptions) -> Result<()> {
        if let Some(agent) = self.agents.iter().find(|a| !a.is_responding) {
            return Err(AgencyError::AgentUnresponsive {
                endpoint: agent.endpoint.clone(),
                reason: agent.error.clone().unwrap_or_default(),
            });
        }

        if !options.allow_different_leader_endpoints {
            for pair in self.agents.windows(2) {
                let expected = pair[0].leader_endpoint.as_deref().unwrap_or_default();
                let actual = pair[1].leader_endpoint.as_deref().unwrap_or_default();
                if !is_same_endpoint(expected, actual) {
                    return Err(AgencyError::LeaderMismatch {
                        endpoint: pair[1].endpoint.clone(),
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }
        }

        match self.leader_count() {
            1 => Ok(()),
            0 if options.allow_no_leader => Ok(()),
            n if n > 1 && options.allow_different_leader_endpoints => Ok(()),
            count => Err(AgencyError::LeaderCount { count }),
        }
    }
}

/// True if both endpoints name the same host. Ports and schemes are
/// ignored; if either side does not parse as a URL the strings must match
/// exactly.
pub fn is_same_endpoint(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(ua), Ok(ub)) => ua.host_str() == ub.host_str(),
        _ => a == b,
    }
}

/// Probe every agent concurrently and classify the answers.
#[instrument(skip(clients), fields(agents = clients.len()))]
pub async fn probe_agents(clients: &[Agency], options: &HealthCheckOptions) -> HealthReport {
    let mut slots: Vec<Option<AgentStatus>> = vec![None; clients.len()];
    let mut probes = JoinSet::new();

    for (index, client) in clients.iter().enumerate() {
        let client = client.clone();
        let timeout = options
            .probe_timeout
            .unwrap_or(client.config().probe_timeout);
        probes.spawn(async move { (index, probe_agent(client, timeout).await) });
    }

    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((index, status)) => slots[index] = Some(status),
            Err(e) => warn!(error = %e, "agent probe task failed"),
        }
    }

    let agents = slots
        .into_iter()
        .zip(clients)
        .map(|(slot, client)| {
            slot.unwrap_or_else(|| {
                AgentStatus::unresponsive(
                    client.endpoints().join(","),
                    "probe task did not complete".to_string(),
                )
            })
        })
        .collect();

    HealthReport { agents }
}

/// Check that the agents form a healthy cluster: all responding, exactly one
/// leader, and agreement on who that is (subject to `options`).
///
/// Each element of `clients` must be bound to a single agent.
///
/// # Errors
///
/// [`AgencyError::AgentUnresponsive`], [`AgencyError::LeaderMismatch`] or
/// [`AgencyError::LeaderCount`].
pub async fn are_agents_healthy(clients: &[Agency], options: &HealthCheckOptions) -> Result<()> {
    let report = probe_agents(clients, options).await;
    let verdict = report.verdict(options);
    if let Err(e) = &verdict {
        warn!(error = %e, "agency health check failed");
    }
    verdict
}

/// Probe a single agent.
///
/// The client's endpoint set is restored afterwards, so the same handles can
/// be probed again and still each talk to their own agent.
async fn probe_agent(client: Agency, timeout: Duration) -> AgentStatus {
    let before = client.endpoints();
    let own = before.join(",");
    let sentinel = client.config().health_sentinel.clone();

    let outcome = tokio::time::timeout(timeout, client.read_value(sentinel)).await;

    let after = client.endpoints();
    let moved = before != after;
    let new_leader = moved.then(|| after.join(","));

    let status = match outcome {
        Ok(Ok(_)) => classify_answer(own, new_leader),
        Ok(Err(e)) if e.is_key_not_found() => classify_answer(own, new_leader),
        Ok(Err(e)) if e.is_redirect() => AgentStatus::follower(own, new_leader),
        Ok(Err(e)) => AgentStatus::unresponsive(own, e.to_string()),
        Err(_) => AgentStatus::unresponsive(own, format!("no answer within {timeout:?}")),
    };

    if moved {
        if let Err(e) = client.connection().set_endpoints(before) {
            warn!(endpoint = %status.endpoint, error = %e, "failed to restore agent endpoint after probe");
        }
    }

    debug!(
        endpoint = %status.endpoint,
        leader = status.is_leader,
        responding = status.is_responding,
        "agent probed"
    );
    status
}

fn classify_answer(own: String, new_leader: Option<String>) -> AgentStatus {
    match new_leader {
        None => AgentStatus::leader(own),
        Some(leader) => AgentStatus::follower(own, Some(leader)),
    }
}
