use thiserror::Error;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Provider未初始化: {provider_id}")]
    ProviderNotInitialized { provider_id: String },
    #[error("连接池已关闭: {provider_id}")]
    PoolClosed { provider_id: String },
    #[error("获取连接超时: {provider_id} (等待 {timeout_ms}ms)")]
    AcquireTimeout { provider_id: String, timeout_ms: u64 },
    #[error("创建连接失败: {0}")]
    ConnectionFactory(String),
    #[error("连接错误: {0}")]
    Connection(String),
    #[error("模型后端未注册: {model_id}")]
    ModelSystemNotFound { model_id: String },
    #[error("模型后端不可用: {model_id}")]
    ModelSystemUnavailable { model_id: String },
    #[error("任务执行错误: {0}")]
    TaskExecution(String),
    #[error("任务执行超时: {task_id} (超时时间 {timeout_ms}ms)")]
    TaskTimeout { task_id: String, timeout_ms: u64 },
    #[error("操作已取消: {0}")]
    Cancelled(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    pub fn provider_not_initialized<S: Into<String>>(provider_id: S) -> Self {
        Self::ProviderNotInitialized {
            provider_id: provider_id.into(),
        }
    }
    pub fn pool_closed<S: Into<String>>(provider_id: S) -> Self {
        Self::PoolClosed {
            provider_id: provider_id.into(),
        }
    }
    pub fn model_system_not_found<S: Into<String>>(model_id: S) -> Self {
        Self::ModelSystemNotFound {
            model_id: model_id.into(),
        }
    }
    pub fn model_system_unavailable<S: Into<String>>(model_id: S) -> Self {
        Self::ModelSystemUnavailable {
            model_id: model_id.into(),
        }
    }
    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::TaskExecution(msg.into())
    }
    pub fn connection_error<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }
    pub fn factory_error<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionFactory(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    pub fn timeout_error<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(self, HubError::Internal(_) | HubError::Configuration(_))
    }
    /// 调度器本身从不重试，此标记仅供调用方决定是否重新提交
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::Connection(_)
                | HubError::ConnectionFactory(_)
                | HubError::AcquireTimeout { .. }
                | HubError::ModelSystemUnavailable { .. }
                | HubError::TaskTimeout { .. }
                | HubError::Timeout(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            HubError::ProviderNotInitialized { .. } => "请求的Provider尚未初始化",
            HubError::PoolClosed { .. } => "连接池已关闭",
            HubError::AcquireTimeout { .. } => "连接池繁忙，请稍后重试",
            HubError::ModelSystemNotFound { .. } => "请求的模型不存在",
            HubError::ModelSystemUnavailable { .. } => "模型暂不可用，请稍后重试",
            HubError::TaskTimeout { .. } | HubError::Timeout(_) => "操作超时，请稍后重试",
            HubError::ValidationError(_) => "输入数据验证失败",
            HubError::Configuration(_) => "系统配置有误",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        HubError::Internal(err.to_string())
    }
}
