use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// 资源作用域的进程内唯一编号，用于日志关联。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScopeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// 绑定到单个端口对象的资源作用域。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 端口构造时创建、析构时整体释放，持有主机名缓冲等附属资源；
/// - 作用域从不在端口之间共享，服务端接受连接时只转移套接字句柄，不触碰作用域。
///
/// ## 契约 (What)
/// - 主机名缓冲一经分配只增不减：重新配置时原地覆盖，容量不收缩；
/// - `Drop` 时记录一次释放日志，之后作用域内资源全部归还。
#[derive(Debug)]
pub(crate) struct ResourceScope {
    id: ScopeId,
    host: Option<String>,
}

impl ResourceScope {
    pub(crate) fn new() -> Self {
        let id = ScopeId::next();
        tracing::trace!(scope = %id, "resource scope created");
        Self { id, host: None }
    }

    pub(crate) fn id(&self) -> ScopeId {
        self.id
    }

    /// 已配置的主机名。
    pub(crate) fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// 主机名缓冲的当前容量。
    #[cfg(test)]
    pub(crate) fn host_capacity(&self) -> usize {
        self.host.as_ref().map_or(0, String::capacity)
    }

    /// 原地覆盖主机名，必要时扩容，从不收缩。
    pub(crate) fn store_host(&mut self, host: &str) {
        match self.host.as_mut() {
            Some(buffer) => {
                buffer.clear();
                buffer.push_str(host);
            }
            None => self.host = Some(host.to_owned()),
        }
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        tracing::trace!(scope = %self.id, "resource scope released");
    }
}
