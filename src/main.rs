use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use modelhub::{Coordinator, EchoModelSystem, HubConfig, LocalConnectionFactory, ShutdownManager};
use modelhub_observability::{init_metrics_exporter, init_structured_logging, LoggingConfig};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("modelhub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("模型调用优先级调度与 Provider 连接池")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径搜索"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty", "compact"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);

    // 加载配置
    let mut config = HubConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("默认路径")))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    // 初始化日志系统
    let logging = LoggingConfig::from_level_and_format(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;
    init_structured_logging(logging)?;

    info!("启动 ModelHub");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    if config.observability.metrics_enabled {
        init_metrics_exporter(&config.observability.metrics_listen)?;
        info!("Prometheus 指标监听于 {}", config.observability.metrics_listen);
    }

    let coordinator = Arc::new(Coordinator::new(config.clone())?);
    register_builtin_backends(&coordinator, &config).await?;

    // 创建优雅关闭管理器
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let coordinator = Arc::clone(&coordinator);

        tokio::spawn(async move {
            if let Err(e) = coordinator.run(shutdown_rx).await {
                error!("ModelHub 运行失败: {e:#}");
            }
        })
    };

    wait_for_shutdown_signal().await;

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("ModelHub 已优雅关闭"),
        Ok(Err(e)) => error!("ModelHub 关闭时发生错误: {e}"),
        Err(_) => {
            warn!("关闭超时，强制释放资源");
            coordinator.shutdown().await;
        }
    }

    info!("ModelHub 已退出");
    Ok(())
}

/// 为配置中的模型注册 echo 后端，为每个 Provider 建立本地连接池
async fn register_builtin_backends(coordinator: &Coordinator, config: &HubConfig) -> Result<()> {
    for model_id in &config.models {
        coordinator
            .register_model_system(model_id.clone(), Arc::new(EchoModelSystem::new(model_id)))
            .await;
    }

    for provider in &config.providers {
        let factory = Arc::new(LocalConnectionFactory::new(provider.provider_id.clone()));
        coordinator
            .initialize_provider(provider.clone(), factory)
            .await
            .with_context(|| format!("初始化 Provider {} 失败", provider.provider_id))?;
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
