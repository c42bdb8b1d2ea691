//! AI research agent usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentUsage {
    pub plan: Plan,
    pub used: u32,
    pub limit: u32,
    pub resets_at: Option<DateTime<Utc>>,
}

impl AgentUsage {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTier {
    Pro,
    Premium,
    #[default]
    #[serde(other)]
    Free,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteAgentUsage {
    #[serde(default)]
    pub tier: RemoteTier,
    #[serde(default)]
    pub queries_used: u32,
    #[serde(default = "default_query_limit")]
    pub query_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<DateTime<Utc>>,
}

/// Free-tier allowance when the API omits it.
fn default_query_limit() -> u32 {
    10
}

pub fn to_canonical(remote: RemoteAgentUsage) -> AgentUsage {
    let plan = match remote.tier {
        RemoteTier::Free => Plan::Free,
        RemoteTier::Pro => Plan::Pro,
        RemoteTier::Premium => Plan::Premium,
    };
    AgentUsage {
        plan,
        used: remote.queries_used,
        limit: remote.query_limit,
        resets_at: remote.period_end,
    }
}

pub fn to_remote(usage: &AgentUsage) -> RemoteAgentUsage {
    let tier = match usage.plan {
        Plan::Free => RemoteTier::Free,
        Plan::Pro => RemoteTier::Pro,
        Plan::Premium => RemoteTier::Premium,
    };
    RemoteAgentUsage {
        tier,
        queries_used: usage.used,
        query_limit: usage.limit,
        period_end: usage.resets_at,
    }
}
