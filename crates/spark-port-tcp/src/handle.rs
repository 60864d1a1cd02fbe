use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr};

/// 套接字句柄的角色，三者互斥。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketRole {
    /// 已创建、尚未完成建连的客户端句柄。
    UnconnectedClient,
    /// 已连接的客户端句柄：来自主动建连或服务端接受。
    ConnectedClient,
    /// 监听中的服务端句柄。
    Listening,
}

/// 单个 TCP 端点的操作系统句柄，由且仅由一个端口对象持有。
///
/// 句柄随 `Drop` 关闭；端口通过 `Option::take` 释放它，因此重复关闭天然无副作用。
#[derive(Debug)]
pub(crate) struct SocketHandle {
    socket: Socket,
    role: SocketRole,
}

impl SocketHandle {
    /// 为目标地址的协议族创建一个未连接的流式套接字。
    pub(crate) fn stream_for(addr: &SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
        Ok(Self {
            socket,
            role: SocketRole::UnconnectedClient,
        })
    }

    /// 为监听地址创建服务端套接字。
    pub(crate) fn listener_for(addr: &SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
        Ok(Self {
            socket,
            role: SocketRole::Listening,
        })
    }

    /// 包装服务端接受得到的已连接套接字。
    pub(crate) fn accepted(socket: Socket) -> Self {
        Self {
            socket,
            role: SocketRole::ConnectedClient,
        }
    }

    pub(crate) fn mark_connected(&mut self) {
        debug_assert_eq!(self.role, SocketRole::UnconnectedClient);
        self.role = SocketRole::ConnectedClient;
    }

    pub(crate) fn role(&self) -> SocketRole {
        self.role
    }

    pub(crate) fn socket(&self) -> &Socket {
        &self.socket
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok().and_then(|addr| addr.as_socket())
    }

    pub(crate) fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket.peer_addr().ok().and_then(|addr| addr.as_socket())
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        tracing::trace!(role = ?self.role, "socket handle closed");
    }
}
