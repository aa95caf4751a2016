use std::sync::Arc;

use async_trait::async_trait;

use crate::HubResult;

/// 连接池借出的连接句柄，池内外共享同一个 `Arc`
pub type SharedConnection = Arc<dyn ProviderConnection>;

/// 具体 Provider 提供的连接对象，对连接池而言是不透明的
#[async_trait]
pub trait ProviderConnection: Send + Sync {
    /// 探测连接是否可用；返回 Err 与返回 false 都视为不健康
    async fn health_check(&self) -> HubResult<bool>;

    async fn disconnect(&self) -> HubResult<()>;
}

/// 每个 Provider 提供的连接工厂
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(&self) -> HubResult<SharedConnection>;
}

/// 判断两个句柄是否指向同一个连接
///
/// 只比较数据指针，忽略 trait object 的 vtable。
pub fn same_connection(a: &SharedConnection, b: &SharedConnection) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
