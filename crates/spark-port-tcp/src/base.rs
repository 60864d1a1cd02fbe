use crate::{
    PortConfig,
    error::{CONFIGURE, OperationKind, PortError, Precondition, codes},
    scope::ResourceScope,
    util::resolve,
};
use socket2::Socket;
use std::{io, net::SocketAddr};

/// 客户端与服务端端口共享的基础状态，以组合方式嵌入两种实现。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 地址配置、阻塞模式记账与最近错误捕获是两类端口唯一共享的行为；
/// - 所有阻塞模式切换都经由 [`PortBase::set_blocking`]，使记账标志与句柄真实状态无法分歧。
///
/// ## 契约 (What)
/// - `configure`：主机名可选，提供时原地写入作用域缓冲；端口为 `0` 表示“沿用已配置值”，
///   若此前从未配置则返回 [`Precondition::MissingPort`]，状态保持不变；
/// - `set_blocking`：仅在期望模式与记录不同时才调用底层库；
/// - `take_last_error`：读出并清零，语义为“一次性、读后即清”；
/// - **前置条件**：单个端口同一时刻只由一个线程持有（`&mut self` 保证）。
#[derive(Debug)]
pub(crate) struct PortBase {
    scope: ResourceScope,
    port: Option<u16>,
    last_error: i32,
    blocking: bool,
    config: PortConfig,
    mode_switches: u64,
}

impl PortBase {
    pub(crate) fn new(config: PortConfig) -> Self {
        Self {
            scope: ResourceScope::new(),
            port: None,
            last_error: codes::NONE,
            blocking: true,
            config,
            mode_switches: 0,
        }
    }

    pub(crate) fn with_address(host: &str, port: u16, config: PortConfig) -> Self {
        let mut base = Self::new(config);
        if !host.is_empty() {
            base.scope.store_host(host);
        }
        if port != 0 {
            base.port = Some(port);
        }
        base
    }

    /// 更新地址配置。
    pub(crate) fn configure(&mut self, host: Option<&str>, port: u16) -> Result<(), PortError> {
        if port == 0 && self.port.is_none() {
            return Err(PortError::precondition(CONFIGURE, Precondition::MissingPort));
        }
        if let Some(host) = host {
            self.set_host(host);
        }
        if port != 0 {
            self.port = Some(port);
        }
        Ok(())
    }

    /// 仅更新主机名，端口保持原值。
    pub(crate) fn set_host(&mut self, host: &str) {
        self.scope.store_host(host);
    }

    /// 解析当前配置的目标地址；未配置主机名时使用 `default_host`。
    pub(crate) fn target(&self, default_host: Option<&str>) -> Result<SocketAddr, PortError> {
        let port = self
            .port
            .ok_or_else(|| PortError::precondition(CONFIGURE, Precondition::MissingPort))?;
        let host = self
            .scope
            .host()
            .or(default_host)
            .ok_or_else(|| PortError::precondition(CONFIGURE, Precondition::MissingHost))?;
        resolve(host, port)
    }

    /// 按需切换句柄的阻塞模式。
    pub(crate) fn set_blocking(&mut self, want: bool, socket: &Socket) -> io::Result<()> {
        if self.blocking != want {
            socket.set_nonblocking(!want)?;
            self.blocking = want;
            self.mode_switches += 1;
            tracing::trace!(
                scope = %self.scope.id(),
                blocking = want,
                switches = self.mode_switches,
                "blocking mode switched"
            );
        }
        Ok(())
    }

    /// 新建或新接管的句柄总处于阻塞模式，记账随之复位。
    pub(crate) fn reset_blocking(&mut self) {
        self.blocking = true;
    }

    pub(crate) fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// 记录失败的错误码并原样返回结果。
    pub(crate) fn settle<T>(&mut self, result: Result<T, PortError>) -> Result<T, PortError> {
        if let Err(err) = &result {
            self.last_error = err.code();
        }
        result
    }

    pub(crate) fn take_last_error(&mut self) -> i32 {
        std::mem::replace(&mut self.last_error, codes::NONE)
    }

    pub(crate) fn host(&self) -> Option<&str> {
        self.scope.host()
    }

    pub(crate) fn port(&self) -> Option<u16> {
        self.port
    }

    /// 记录操作系统实际分配的端口。
    pub(crate) fn set_port(&mut self, port: u16) {
        if port != 0 {
            self.port = Some(port);
        }
    }

    pub(crate) fn scope(&self) -> &ResourceScope {
        &self.scope
    }

    pub(crate) fn config(&self) -> &PortConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn mode_switches(&self) -> u64 {
        self.mode_switches
    }
}

/// 校验公开入口显式传入的地址：主机名非空、端口非零。
pub(crate) fn check_address(op: OperationKind, host: &str, port: u16) -> Result<(), PortError> {
    if host.is_empty() {
        return Err(PortError::precondition(op, Precondition::EmptyHost));
    }
    if port == 0 {
        return Err(PortError::precondition(op, Precondition::ZeroPort));
    }
    Ok(())
}
