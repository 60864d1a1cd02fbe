use crate::{
    PortConfig, Timeout,
    base::PortBase,
    error::{ACCEPT, BIND, PortError, Precondition, timed_out},
    handle::SocketHandle,
    scope::ScopeId,
    util::{UNSPECIFIED_HOST, is_timeout, resolve, socket_timeout},
};
use socket2::SockAddr;
use std::{io, net::SocketAddr, time::Duration};

/// 服务端端口的生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// 尚未绑定。
    Unbound,
    /// 监听中，可接受连接。
    Bound,
    /// 已关闭；可重新绑定。
    Closed,
}

/// 服务端接受得到的已连接句柄，在转交给客户端端口之前的所有权凭证。
///
/// 凭证只能被消费一次：客户端端口采纳后，服务端不再保留任何对该句柄的引用。
#[derive(Debug)]
pub(crate) struct Accepted {
    handle: SocketHandle,
    peer: Option<SocketAddr>,
}

impl Accepted {
    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub(crate) fn into_handle(self) -> SocketHandle {
        self.handle
    }
}

/// 服务端端口实现：持有唯一的监听句柄，负责绑定与接受。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“监听 → 接受 → 交接句柄”收敛在一个同步对象内，调用线程即执行线程；
/// - 接受得到的句柄以 [`Accepted`] 凭证移交，服务端从不持有已接受的连接。
///
/// ## 逻辑 (How)
/// - `bind`：解析地址（未配置主机名时使用 `0.0.0.0`），创建监听套接字，
///   按配置启用 `SO_REUSEADDR`，绑定后以配置的 backlog 开始监听；
/// - `accept`：按超时选择模式。`Immediate` 切换为非阻塞并尝试一次；
///   `After(d)` 在监听句柄上写入 `SO_RCVTIMEO`；`Infinite` 清除此前写入的超时；
/// - 超时值只在与上次写入不同的情况下才触达系统调用。
///
/// ## 契约 (What)
/// - **前置条件**：`accept` 只在 [`ServerState::Bound`] 下有效，否则返回
///   [`Precondition::NotBound`]；
/// - **后置条件**：`accept` 失败不影响监听句柄，后续可继续接受；
/// - `close` 可重复调用，第二次起为无操作。
///
/// ## 注意事项 (Trade-offs)
/// - 重复 `bind` 会先关闭旧的监听句柄再创建新句柄；
/// - 部分平台的已接受套接字会继承监听句柄的非阻塞标志，这里统一复位为阻塞。
#[derive(Debug)]
pub(crate) struct ServerPort {
    base: PortBase,
    handle: Option<SocketHandle>,
    state: ServerState,
    listener_timeout: Option<Duration>,
}

impl ServerPort {
    pub(crate) fn new(config: PortConfig) -> Self {
        Self::from_base(PortBase::new(config))
    }

    pub(crate) fn with_address(host: &str, port: u16, config: PortConfig) -> Self {
        Self::from_base(PortBase::with_address(host, port, config))
    }

    fn from_base(base: PortBase) -> Self {
        Self {
            base,
            handle: None,
            state: ServerState::Unbound,
            listener_timeout: None,
        }
    }

    /// 按当前或新给定的地址绑定；`port == 0` 表示沿用已配置端口。
    pub(crate) fn bind(&mut self, host: Option<&str>, port: u16) -> Result<(), PortError> {
        let result = self.bind_configured(host, port);
        self.settle(result)
    }

    /// 绑定到操作系统分配的端口，分配结果写回端口号。
    pub(crate) fn bind_ephemeral(&mut self, host: &str) -> Result<(), PortError> {
        self.base.set_host(host);
        let result = resolve(host, 0).and_then(|addr| self.bind_addr(addr));
        self.settle(result)
    }

    fn bind_configured(&mut self, host: Option<&str>, port: u16) -> Result<(), PortError> {
        self.base.configure(host, port)?;
        let addr = self.base.target(Some(UNSPECIFIED_HOST))?;
        self.bind_addr(addr)
    }

    fn bind_addr(&mut self, addr: SocketAddr) -> Result<(), PortError> {
        if self.handle.take().is_some() {
            tracing::debug!(scope = %self.base.scope().id(), "previous listener closed before rebind");
        }
        self.state = ServerState::Unbound;
        self.listener_timeout = None;
        self.base.reset_blocking();

        let bind_error = |source| PortError::io(BIND, source);
        let handle = SocketHandle::listener_for(&addr).map_err(bind_error)?;
        let socket = handle.socket();
        let backlog = self.base.config().backlog();
        socket
            .set_reuse_address(self.base.config().reuse_address())
            .map_err(bind_error)?;
        socket.bind(&SockAddr::from(addr)).map_err(bind_error)?;
        socket.listen(backlog).map_err(bind_error)?;

        let local = handle.local_addr();
        if let Some(local) = local {
            self.base.set_port(local.port());
        }
        tracing::debug!(
            scope = %self.base.scope().id(),
            requested = %addr,
            local = ?local,
            backlog,
            "tcp listener bound"
        );
        self.handle = Some(handle);
        self.state = ServerState::Bound;
        Ok(())
    }

    /// 接受一个入站连接，产出所有权凭证。
    pub(crate) fn accept(&mut self, timeout: Timeout) -> Result<Accepted, PortError> {
        let result = self.accept_once(timeout);
        self.settle(result)
    }

    fn accept_once(&mut self, timeout: Timeout) -> Result<Accepted, PortError> {
        let handle = match (&self.handle, self.state) {
            (Some(handle), ServerState::Bound) => handle,
            _ => return Err(PortError::precondition(ACCEPT, Precondition::NotBound)),
        };
        let socket = handle.socket();
        let accept_error = |source| PortError::io(ACCEPT, source);

        let blocking = timeout.is_blocking();
        self.base
            .set_blocking(blocking, socket)
            .map_err(accept_error)?;
        if blocking {
            let wanted = socket_timeout(timeout.as_socket_timeout());
            if wanted != self.listener_timeout {
                socket.set_read_timeout(wanted).map_err(accept_error)?;
                self.listener_timeout = wanted;
            }
        }

        let (stream, peer) = loop {
            match socket.accept() {
                Ok(pair) => break pair,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if blocking && is_timeout(&err) => {
                    return Err(accept_error(timed_out(ACCEPT)));
                }
                Err(err) => return Err(accept_error(err)),
            }
        };
        if !blocking {
            stream.set_nonblocking(false).map_err(accept_error)?;
        }
        self.base
            .config()
            .apply_to_connected(&stream)
            .map_err(accept_error)?;

        let peer = peer.as_socket();
        tracing::debug!(
            scope = %self.base.scope().id(),
            peer = ?peer,
            timeout = %timeout,
            "tcp connection accepted"
        );
        Ok(Accepted {
            handle: SocketHandle::accepted(stream),
            peer,
        })
    }

    /// 关闭监听句柄；重复调用无副作用。
    pub(crate) fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(
                scope = %self.base.scope().id(),
                local = ?handle.local_addr(),
                "tcp listener closed"
            );
        }
        if self.state == ServerState::Bound {
            self.state = ServerState::Closed;
        }
        self.listener_timeout = None;
    }

    /// 记录失败并原样返回结果。
    pub(crate) fn settle<T>(&mut self, result: Result<T, PortError>) -> Result<T, PortError> {
        if let Err(err) = &result {
            tracing::debug!(
                scope = %self.base.scope().id(),
                op = %err.op(),
                code = err.code(),
                error = %err,
                "tcp server operation failed"
            );
        }
        self.base.settle(result)
    }

    pub(crate) fn take_last_error(&mut self) -> i32 {
        self.base.take_last_error()
    }

    pub(crate) fn scope_id(&self) -> ScopeId {
        self.base.scope().id()
    }

    pub(crate) fn state(&self) -> ServerState {
        self.state
    }

    pub(crate) fn is_blocking(&self) -> bool {
        self.base.is_blocking()
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.as_ref().and_then(SocketHandle::local_addr)
    }

    pub(crate) fn host(&self) -> Option<&str> {
        self.base.host()
    }

    pub(crate) fn port(&self) -> Option<u16> {
        self.base.port()
    }

    pub(crate) fn config(&self) -> &PortConfig {
        self.base.config()
    }
}
