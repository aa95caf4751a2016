use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::health::ProviderHealth;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Error(String),
}

/// 连接池管理器广播的事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PoolEvent {
    HealthCheck {
        provider_id: String,
        health: ProviderHealth,
        timestamp: DateTime<Utc>,
    },
    ConnectionStateChanged {
        provider_id: String,
        state: ConnectionState,
        timestamp: DateTime<Utc>,
    },
}

impl PoolEvent {
    pub fn health_check(provider_id: impl Into<String>, health: ProviderHealth) -> Self {
        PoolEvent::HealthCheck {
            provider_id: provider_id.into(),
            health,
            timestamp: Utc::now(),
        }
    }

    pub fn state_changed(provider_id: impl Into<String>, state: ConnectionState) -> Self {
        PoolEvent::ConnectionStateChanged {
            provider_id: provider_id.into(),
            state,
            timestamp: Utc::now(),
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            PoolEvent::HealthCheck { provider_id, .. } => provider_id,
            PoolEvent::ConnectionStateChanged { provider_id, .. } => provider_id,
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            PoolEvent::HealthCheck { .. } => "healthCheck",
            PoolEvent::ConnectionStateChanged { .. } => "connectionStateChanged",
        }
    }
}
