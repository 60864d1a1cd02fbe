use crate::{
    PortConfig, Timeout,
    base::PortBase,
    error::{CONNECT, OperationKind, PortError, Precondition, RECV, SEND, peer_closed, timed_out},
    handle::{SocketHandle, SocketRole},
    scope::ScopeId,
    server::Accepted,
    util::{Deadline, is_timeout, socket_timeout},
};
use socket2::{SockAddr, Socket};
use std::{
    io::{self, Read},
    net::SocketAddr,
    ops::Range,
    time::Duration,
};

/// 客户端端口的生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortState {
    /// 未持有已连接句柄：新建、建连失败或尚未被服务端接受填充。
    Unconnected,
    /// 持有已连接句柄，可收发。
    Connected,
    /// 已显式关闭；再次 `connect` 会创建全新的句柄。
    Closed,
}

/// 收发方向，决定操作种类与需要写入的套接字超时选项。
#[derive(Clone, Copy, Debug)]
enum Direction {
    Send,
    Recv,
}

impl Direction {
    fn op(self) -> OperationKind {
        match self {
            Direction::Send => SEND,
            Direction::Recv => RECV,
        }
    }

    fn set_timeout(self, socket: &Socket, limit: Option<Duration>) -> io::Result<()> {
        match self {
            Direction::Send => socket.set_write_timeout(limit),
            Direction::Recv => socket.set_read_timeout(limit),
        }
    }

    /// 单次调用返回 `0` 字节时的错误：发送侧为写零，接收侧为对端关闭。
    fn no_progress(self) -> io::Error {
        match self {
            Direction::Send => io::Error::new(io::ErrorKind::WriteZero, "socket accepted zero bytes"),
            Direction::Recv => peer_closed(),
        }
    }
}

/// 客户端端口实现：持有至多一个套接字句柄，驱动建连与“收发至完成”的循环。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 流式套接字的单次 `send`/`recv` 可能只完成一部分，调用方真正需要的是
///   “在超时内收发满请求长度，否则明确失败并告知已完成多少”；
/// - 建连、收发与关闭都在调用线程上同步完成，没有后台任务。
///
/// ## 逻辑 (How)
/// - `connect`：更新地址配置，强制阻塞模式，解析地址后创建新句柄并带超时建连；
///   超时为 [`Timeout::Immediate`] 时改写为配置的默认建连超时；
/// - `send`/`recv`：非阻塞超时切换到非阻塞模式；其余情况切换到阻塞模式，
///   并把超时视作整个请求的截止时间，每个分片前以剩余时长刷新套接字超时；
/// - 循环累加已传输字节数，任何一次失败立即终止并把累计值放入错误。
///
/// ## 契约 (What)
/// - 成功时返回值恒等于请求长度；
/// - 失败时 [`PortError::transferred`] 不超过请求长度；
/// - 非阻塞模式下遇到“会阻塞”即失败返回，不做忙等；
/// - 阻塞模式下的“会阻塞”按超时处理；
/// - **前置条件**：收发只在 [`PortState::Connected`] 下有效，否则返回
///   [`Precondition::NotConnected`]。
///
/// ## 注意事项 (Trade-offs)
/// - 建连失败后句柄仍保留在端口内但不可用，调用方可 `close` 后重新 `connect`；
/// - 已连接时再次 `connect` 视为使用错误，需先 `close`。
#[derive(Debug)]
pub(crate) struct ClientPort {
    base: PortBase,
    handle: Option<SocketHandle>,
    state: PortState,
}

impl ClientPort {
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
            state: PortState::Unconnected,
        }
    }

    /// 建立连接；`port == 0` 表示沿用已配置端口。
    pub(crate) fn connect(
        &mut self,
        host: Option<&str>,
        port: u16,
        timeout: Timeout,
    ) -> Result<(), PortError> {
        let result = self.connect_once(host, port, timeout);
        self.settle(result)
    }

    fn connect_once(
        &mut self,
        host: Option<&str>,
        port: u16,
        timeout: Timeout,
    ) -> Result<(), PortError> {
        if self.state == PortState::Connected {
            return Err(PortError::precondition(CONNECT, Precondition::AlreadyConnected));
        }
        self.base.configure(host, port)?;
        let addr = self.base.target(None)?;
        let connect_error = |source| PortError::io(CONNECT, source);

        // 旧句柄（若有）在此释放，新句柄总从阻塞模式开始。
        let handle = self
            .handle
            .insert(SocketHandle::stream_for(&addr).map_err(connect_error)?);
        self.base.reset_blocking();

        let limit = timeout.for_connect(self.base.config().connect_timeout());
        let target = SockAddr::from(addr);
        let outcome = match limit.as_socket_timeout() {
            Some(limit) => handle.socket().connect_timeout(&target, limit),
            None => handle.socket().connect(&target),
        };
        outcome.map_err(connect_error)?;
        self.base
            .config()
            .apply_to_connected(handle.socket())
            .map_err(connect_error)?;
        handle.mark_connected();
        self.state = PortState::Connected;
        tracing::debug!(
            scope = %self.base.scope().id(),
            peer = %addr,
            local = ?handle.local_addr(),
            timeout = %limit,
            "tcp port connected"
        );
        Ok(())
    }

    /// 采纳服务端接受得到的句柄。
    ///
    /// 调用方已确认当前不持有句柄；对端地址写回主机名与端口。
    pub(crate) fn adopt(&mut self, accepted: Accepted) {
        debug_assert!(self.handle.is_none());
        let peer = accepted.peer_addr();
        if let Some(peer) = peer {
            self.base.set_host(&peer.ip().to_string());
            self.base.set_port(peer.port());
        }
        self.handle = Some(accepted.into_handle());
        self.base.reset_blocking();
        self.state = PortState::Connected;
        tracing::debug!(scope = %self.base.scope().id(), peer = ?peer, "tcp port adopted accepted connection");
    }

    /// 发送整个 `data`，返回已发送字节数。
    pub(crate) fn send(&mut self, data: &[u8], timeout: Timeout) -> Result<usize, PortError> {
        let result = self.transfer(Direction::Send, data.len(), timeout, |socket, range| {
            socket.send(&data[range])
        });
        self.settle(result)
    }

    /// 接收直至填满 `buf`，返回已接收字节数。
    pub(crate) fn recv(&mut self, buf: &mut [u8], timeout: Timeout) -> Result<usize, PortError> {
        let result = self.transfer(Direction::Recv, buf.len(), timeout, |mut socket, range| {
            socket.read(&mut buf[range])
        });
        self.settle(result)
    }

    fn transfer<F>(
        &mut self,
        direction: Direction,
        requested: usize,
        timeout: Timeout,
        mut step: F,
    ) -> Result<usize, PortError>
    where
        F: FnMut(&Socket, Range<usize>) -> io::Result<usize>,
    {
        let op = direction.op();
        let handle = match &self.handle {
            Some(handle) if self.state == PortState::Connected => handle,
            _ => return Err(PortError::precondition(op, Precondition::NotConnected)),
        };
        if requested == 0 {
            return Ok(0);
        }
        let socket = handle.socket();
        let failed = |transferred, source| PortError::Transfer {
            op,
            transferred,
            requested,
            source,
        };

        let blocking = timeout.is_blocking();
        self.base
            .set_blocking(blocking, socket)
            .map_err(|source| PortError::io(op, source))?;
        // 超出可表示范围的上限在此退化为永久阻塞。
        let deadline = Deadline::after(timeout);
        let bounded = deadline.remaining().is_some();
        if blocking && !bounded {
            direction
                .set_timeout(socket, None)
                .map_err(|source| PortError::io(op, source))?;
        }

        let max_chunk = self.base.config().max_chunk().unwrap_or(usize::MAX);
        let mut done = 0;
        while done < requested {
            if blocking && bounded {
                if deadline.expired() {
                    return Err(failed(done, timed_out(op)));
                }
                direction
                    .set_timeout(socket, socket_timeout(deadline.remaining()))
                    .map_err(|source| failed(done, source))?;
            }
            let end = requested.min(done.saturating_add(max_chunk));
            match step(socket, done..end) {
                Ok(0) => return Err(failed(done, direction.no_progress())),
                Ok(n) => {
                    done += n;
                    tracing::trace!(
                        scope = %self.base.scope().id(),
                        op = %op,
                        chunk = n,
                        done,
                        requested,
                        "tcp transfer progress"
                    );
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if blocking && is_timeout(&err) => {
                    return Err(failed(done, timed_out(op)));
                }
                Err(err) => return Err(failed(done, err)),
            }
        }
        Ok(done)
    }

    /// 释放句柄；重复调用无副作用。
    pub(crate) fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(
                scope = %self.base.scope().id(),
                peer = ?handle.peer_addr(),
                "tcp port closed"
            );
            self.state = PortState::Closed;
        }
    }

    /// 记录失败并原样返回结果。
    pub(crate) fn settle<T>(&mut self, result: Result<T, PortError>) -> Result<T, PortError> {
        if let Err(err) = &result {
            tracing::debug!(
                scope = %self.base.scope().id(),
                op = %err.op(),
                code = err.code(),
                transferred = err.transferred(),
                error = %err,
                "tcp port operation failed"
            );
        }
        self.base.settle(result)
    }

    pub(crate) fn take_last_error(&mut self) -> i32 {
        self.base.take_last_error()
    }

    /// 是否持有任何句柄（包括建连失败遗留的句柄）。
    pub(crate) fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn state(&self) -> PortState {
        self.state
    }

    pub(crate) fn scope_id(&self) -> ScopeId {
        self.base.scope().id()
    }

    pub(crate) fn role(&self) -> Option<SocketRole> {
        self.handle.as_ref().map(SocketHandle::role)
    }

    pub(crate) fn is_blocking(&self) -> bool {
        self.base.is_blocking()
    }

    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.handle.as_ref().and_then(SocketHandle::peer_addr)
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
