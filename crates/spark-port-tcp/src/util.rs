use crate::{
    Timeout,
    error::{PortError, RESOLVE},
};
use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
    time::{Duration, Instant},
};

/// 服务端未配置主机名时绑定的通配地址。
pub(crate) const UNSPECIFIED_HOST: &str = "0.0.0.0";

/// 套接字超时的下限：`timeval` 精度为微秒，更短的值会被内核当作“不设上限”。
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// 把剩余时长换算为可写入 `SO_RCVTIMEO`/`SO_SNDTIMEO` 的值。
pub(crate) fn socket_timeout(limit: Option<Duration>) -> Option<Duration> {
    limit.map(|left| left.max(MIN_SOCKET_TIMEOUT))
}

/// 将主机名与端口解析为可连接地址，优先选择 IPv4。
pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, PortError> {
    let resolve_error = |source: io::Error| PortError::Resolve {
        op: RESOLVE,
        host: host.to_owned(),
        port,
        source,
    };
    let mut fallback = None;
    for addr in (host, port).to_socket_addrs().map_err(resolve_error)? {
        if addr.is_ipv4() {
            return Ok(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback.ok_or_else(|| {
        resolve_error(io::Error::new(
            io::ErrorKind::NotFound,
            "resolver returned no addresses",
        ))
    })
}

/// 一次收发的整体截止时间。
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// 超出 `Instant` 可表示范围的上限按不设上限处理。
    pub(crate) fn after(timeout: Timeout) -> Self {
        Deadline(
            timeout
                .as_socket_timeout()
                .and_then(|limit| Instant::now().checked_add(limit)),
        )
    }

    /// 剩余时长；`None` 表示不设上限。
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|target| target.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }
}

/// 阻塞模式下的 `WouldBlock` 实为套接字超时到期（Unix 的 `SO_RCVTIMEO` 语义）。
pub(crate) fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
