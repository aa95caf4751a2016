use serde::{Deserialize, Serialize};

/// 单个连接的探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    /// 连接在池中的位置（创建顺序）
    pub index: usize,
    pub healthy: bool,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl ConnectionHealth {
    pub fn healthy(index: usize, latency_ms: f64) -> Self {
        Self {
            index,
            healthy: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn unhealthy(index: usize, latency_ms: Option<f64>, error: Option<String>) -> Self {
        Self {
            index,
            healthy: false,
            latency_ms,
            error,
        }
    }
}

/// Provider 级别的健康汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// 至少一个连接健康时为 true，没有连接时为 false
    pub is_healthy: bool,
    pub connections: Vec<ConnectionHealth>,
    /// 健康连接的平均延迟，没有健康连接时为 None
    pub average_latency_ms: Option<f64>,
}

impl ProviderHealth {
    pub fn aggregate(connections: Vec<ConnectionHealth>) -> Self {
        let healthy_latencies: Vec<f64> = connections
            .iter()
            .filter(|c| c.healthy)
            .map(|c| c.latency_ms.unwrap_or(0.0))
            .collect();

        let average_latency_ms = if healthy_latencies.is_empty() {
            None
        } else {
            Some(healthy_latencies.iter().sum::<f64>() / healthy_latencies.len() as f64)
        };

        Self {
            is_healthy: !healthy_latencies.is_empty(),
            connections,
            average_latency_ms,
        }
    }

    pub fn healthy_count(&self) -> usize {
        self.connections.iter().filter(|c| c.healthy).count()
    }
}
