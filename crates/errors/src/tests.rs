use crate::*;

#[test]
fn test_hub_error_display() {
    let error = HubError::ProviderNotInitialized {
        provider_id: "ollama".to_string(),
    };
    assert_eq!(error.to_string(), "Provider未初始化: ollama");

    let error = HubError::PoolClosed {
        provider_id: "ollama".to_string(),
    };
    assert_eq!(error.to_string(), "连接池已关闭: ollama");

    let error = HubError::AcquireTimeout {
        provider_id: "openai".to_string(),
        timeout_ms: 250,
    };
    assert_eq!(error.to_string(), "获取连接超时: openai (等待 250ms)");

    let error = HubError::ModelSystemNotFound {
        model_id: "llama3".to_string(),
    };
    assert_eq!(error.to_string(), "模型后端未注册: llama3");

    let error = HubError::TaskTimeout {
        task_id: "t-1".to_string(),
        timeout_ms: 50,
    };
    assert_eq!(error.to_string(), "任务执行超时: t-1 (超时时间 50ms)");

    let error = HubError::TaskExecution("backend exploded".to_string());
    assert_eq!(error.to_string(), "任务执行错误: backend exploded");

    let error = HubError::Configuration("Missing required field".to_string());
    assert_eq!(error.to_string(), "配置错误: Missing required field");
}

#[test]
fn test_hub_error_creation_methods() {
    let error = HubError::provider_not_initialized("p1");
    assert!(matches!(error, HubError::ProviderNotInitialized { .. }));

    let error = HubError::pool_closed("p1");
    assert!(matches!(error, HubError::PoolClosed { .. }));

    let error = HubError::model_system_not_found("m");
    assert!(matches!(error, HubError::ModelSystemNotFound { .. }));

    let error = HubError::model_system_unavailable("m");
    assert!(matches!(error, HubError::ModelSystemUnavailable { .. }));

    let error = HubError::execution_error("boom");
    assert!(matches!(error, HubError::TaskExecution(_)));

    let error = HubError::factory_error("refused");
    assert!(matches!(error, HubError::ConnectionFactory(_)));

    let error = HubError::config_error("bad");
    assert!(matches!(error, HubError::Configuration(_)));

    let error = HubError::timeout_error("slow");
    assert!(matches!(error, HubError::Timeout(_)));
}

#[test]
fn test_is_fatal() {
    assert!(HubError::Internal("Critical error".to_string()).is_fatal());
    assert!(HubError::Configuration("Invalid config".to_string()).is_fatal());

    assert!(!HubError::provider_not_initialized("p").is_fatal());
    assert!(!HubError::execution_error("Failed").is_fatal());
}

#[test]
fn test_is_retryable() {
    assert!(HubError::connection_error("reset").is_retryable());
    assert!(HubError::factory_error("refused").is_retryable());
    assert!(HubError::model_system_unavailable("m").is_retryable());
    assert!(HubError::AcquireTimeout {
        provider_id: "p".to_string(),
        timeout_ms: 10
    }
    .is_retryable());

    assert!(!HubError::provider_not_initialized("p").is_retryable());
    assert!(!HubError::model_system_not_found("m").is_retryable());
    assert!(!HubError::validation_error("Invalid input").is_retryable());
    assert!(!HubError::pool_closed("p").is_retryable());
}

#[test]
fn test_user_message() {
    assert_eq!(
        HubError::provider_not_initialized("p").user_message(),
        "请求的Provider尚未初始化"
    );
    assert_eq!(
        HubError::model_system_not_found("m").user_message(),
        "请求的模型不存在"
    );
    assert_eq!(
        HubError::timeout_error("slow").user_message(),
        "操作超时，请稍后重试"
    );
    assert_eq!(
        HubError::Internal("Critical error".to_string()).user_message(),
        "系统繁忙，请稍后重试"
    );
}

#[test]
fn test_from_conversions() {
    let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
    let error: HubError = json_err.into();
    assert!(matches!(error, HubError::Serialization(_)));

    let error: HubError = anyhow::anyhow!("wrapped").into();
    assert!(matches!(error, HubError::Internal(ref msg) if msg == "wrapped"));
}
