use crate::{
    PortConfig, PortError, Precondition, Timeout,
    base::check_address,
    client::{ClientPort, PortState},
    error::{ACCEPT, BIND, CONFIGURE, CONNECT},
    handle::SocketRole,
    scope::ScopeId,
    server::{ServerPort, ServerState},
};
use std::net::SocketAddr;

/// 对外公开的 TCP 客户端端口。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为调用方提供“建连 → 收发满长度 → 关闭”的最小同步接口；
/// - 实现对象在构造时装箱一次，整个端口生命周期内地址稳定。
///
/// ## 逻辑 (How)
/// - 每个公开方法一对一转发到内部实现；
/// - 显式传入的地址在转发前校验（主机名非空、端口非零），校验失败同样记录到
///   [`TcpPort::last_error`]。
///
/// ## 契约 (What)
/// - `send`/`recv` 成功时返回值等于缓冲区长度；失败时
///   [`PortError::transferred`] 给出已完成的字节数；
/// - [`TcpPort::last_error`] 读后即清；
/// - `close` 可重复调用；端口析构时自动关闭。
///
/// ## 注意事项 (Trade-offs)
/// - 端口可以在线程间移动（`Send`），但同一时刻只允许一个线程操作，由 `&mut self` 保证。
#[derive(Debug)]
pub struct TcpPort {
    inner: Box<ClientPort>,
}

impl Default for TcpPort {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpPort {
    /// 创建未配置地址的端口。
    pub fn new() -> Self {
        Self::with_config(PortConfig::default())
    }

    /// 以指定配置创建端口。
    pub fn with_config(config: PortConfig) -> Self {
        Self {
            inner: Box::new(ClientPort::new(config)),
        }
    }

    /// 以初始地址创建端口，之后可直接调用 [`TcpPort::connect`]。
    pub fn with_address(host: &str, port: u16) -> Result<Self, PortError> {
        check_address(CONFIGURE, host, port)?;
        Ok(Self {
            inner: Box::new(ClientPort::with_address(host, port, PortConfig::default())),
        })
    }

    /// 连接到给定地址。
    ///
    /// `timeout` 为 `0` 时使用配置的默认建连超时（默认 1000 ms），负数永久等待。
    pub fn connect_to(
        &mut self,
        host: &str,
        port: u16,
        timeout: impl Into<Timeout>,
    ) -> Result<(), PortError> {
        let checked = check_address(CONNECT, host, port);
        self.inner.settle(checked)?;
        self.inner.connect(Some(host), port, timeout.into())
    }

    /// 使用此前配置的主机名与端口建连。
    pub fn connect(&mut self, timeout: impl Into<Timeout>) -> Result<(), PortError> {
        self.inner.connect(None, 0, timeout.into())
    }

    /// 发送整个 `data`。
    pub fn send(&mut self, data: &[u8], timeout: impl Into<Timeout>) -> Result<usize, PortError> {
        self.inner.send(data, timeout.into())
    }

    /// 接收直至填满 `buf`。
    pub fn recv(&mut self, buf: &mut [u8], timeout: impl Into<Timeout>) -> Result<usize, PortError> {
        self.inner.recv(buf, timeout.into())
    }

    /// 关闭连接；重复调用无副作用。
    pub fn close(&mut self) {
        self.inner.close();
    }

    /// 读取并清除最近一次失败的错误码；无错误时为 [`codes::NONE`](crate::codes::NONE)。
    pub fn last_error(&mut self) -> i32 {
        self.inner.take_last_error()
    }

    pub fn state(&self) -> PortState {
        self.inner.state()
    }

    /// 当前句柄的角色；未持有句柄时为 `None`。
    pub fn role(&self) -> Option<SocketRole> {
        self.inner.role()
    }

    /// 端口资源作用域编号，与日志中的 `scope` 字段对应。
    pub fn scope_id(&self) -> ScopeId {
        self.inner.scope_id()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state() == PortState::Connected
    }

    /// 当前句柄是否处于阻塞模式。
    pub fn is_blocking(&self) -> bool {
        self.inner.is_blocking()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    /// 已配置的主机名；接受得到的端口为对端 IP。
    pub fn host(&self) -> Option<&str> {
        self.inner.host()
    }

    pub fn port(&self) -> Option<u16> {
        self.inner.port()
    }

    pub fn config(&self) -> &PortConfig {
        self.inner.config()
    }
}

/// 对外公开的 TCP 服务端端口。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 提供“绑定 → 接受”的同步接口，接受的连接既可以填入调用方准备好的
///   [`TcpPort`]，也可以作为新端口返回。
///
/// ## 契约 (What)
/// - [`TcpServerPort::accept_into`]：目标端口必须不持有任何句柄，否则返回
///   [`Precondition::AlreadyConnected`]，目标端口保持原状；
/// - [`TcpServerPort::accept`]：返回的端口继承服务端配置；
/// - 超时：`0` 非阻塞尝试一次，正数为上限，负数永久等待。
#[derive(Debug)]
pub struct TcpServerPort {
    inner: Box<ServerPort>,
}

impl Default for TcpServerPort {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpServerPort {
    pub fn new() -> Self {
        Self::with_config(PortConfig::default())
    }

    pub fn with_config(config: PortConfig) -> Self {
        Self {
            inner: Box::new(ServerPort::new(config)),
        }
    }

    /// 以初始地址创建端口，之后可直接调用 [`TcpServerPort::bind`]。
    pub fn with_address(host: &str, port: u16) -> Result<Self, PortError> {
        check_address(CONFIGURE, host, port)?;
        Ok(Self {
            inner: Box::new(ServerPort::with_address(host, port, PortConfig::default())),
        })
    }

    /// 使用此前配置的地址绑定；未配置主机名时绑定 `0.0.0.0`。
    pub fn bind(&mut self) -> Result<(), PortError> {
        self.inner.bind(None, 0)
    }

    /// 绑定到给定地址。
    pub fn bind_to(&mut self, host: &str, port: u16) -> Result<(), PortError> {
        let checked = check_address(BIND, host, port);
        self.inner.settle(checked)?;
        self.inner.bind(Some(host), port)
    }

    /// 绑定到给定主机上由操作系统分配的端口，分配结果可由 [`TcpServerPort::port`] 读取。
    pub fn bind_ephemeral(&mut self, host: &str) -> Result<(), PortError> {
        if host.is_empty() {
            let err = PortError::precondition(BIND, Precondition::EmptyHost);
            return self.inner.settle(Err(err));
        }
        self.inner.bind_ephemeral(host)
    }

    /// 接受一个连接并填入 `target`。
    pub fn accept_into(
        &mut self,
        target: &mut TcpPort,
        timeout: impl Into<Timeout>,
    ) -> Result<(), PortError> {
        if target.inner.has_handle() {
            let err = PortError::precondition(ACCEPT, Precondition::AlreadyConnected);
            return self.inner.settle(Err(err));
        }
        let accepted = self.inner.accept(timeout.into())?;
        target.inner.adopt(accepted);
        Ok(())
    }

    /// 接受一个连接并以新端口返回。
    pub fn accept(&mut self, timeout: impl Into<Timeout>) -> Result<TcpPort, PortError> {
        let accepted = self.inner.accept(timeout.into())?;
        let mut port = TcpPort::with_config(self.inner.config().clone());
        port.inner.adopt(accepted);
        Ok(port)
    }

    /// 关闭监听；重复调用无副作用。
    pub fn close(&mut self) {
        self.inner.close();
    }

    /// 读取并清除最近一次失败的错误码。
    pub fn last_error(&mut self) -> i32 {
        self.inner.take_last_error()
    }

    pub fn state(&self) -> ServerState {
        self.inner.state()
    }

    pub fn scope_id(&self) -> ScopeId {
        self.inner.scope_id()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.state() == ServerState::Bound
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.is_blocking()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn host(&self) -> Option<&str> {
        self.inner.host()
    }

    pub fn port(&self) -> Option<u16> {
        self.inner.port()
    }

    pub fn config(&self) -> &PortConfig {
        self.inner.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;

    fn assert_send<T: Send>() {}

    #[test]
    fn ports_can_move_between_threads() {
        assert_send::<TcpPort>();
        assert_send::<TcpServerPort>();
    }

    #[test]
    fn explicit_addresses_are_validated_before_forwarding() {
        let mut port = TcpPort::new();
        let err = port.connect_to("", 80, 0).expect_err("empty host");
        assert_eq!(err.violation(), Some(Precondition::EmptyHost));
        assert_eq!(port.last_error(), codes::PRECONDITION);
        let err = port.connect_to("127.0.0.1", 0, 0).expect_err("zero port");
        assert_eq!(err.violation(), Some(Precondition::ZeroPort));
        assert_eq!(port.host(), None, "rejected address is not stored");

        let mut server = TcpServerPort::new();
        let err = server.bind_to("", 80).expect_err("empty host");
        assert_eq!(err.violation(), Some(Precondition::EmptyHost));
        let err = server.bind_ephemeral("").expect_err("empty host");
        assert_eq!(err.violation(), Some(Precondition::EmptyHost));
        assert_eq!(server.last_error(), codes::PRECONDITION);

        assert!(TcpPort::with_address("", 1).is_err());
        assert!(TcpServerPort::with_address("localhost", 0).is_err());
    }

    #[test]
    fn with_address_stores_initial_address() {
        let port = TcpPort::with_address("localhost", 9).expect("address");
        assert_eq!(port.host(), Some("localhost"));
        assert_eq!(port.port(), Some(9));
        assert_eq!(port.state(), PortState::Unconnected);
        assert!(port.is_blocking());
    }

    #[test]
    fn accepted_port_inherits_server_config() {
        let config = PortConfig::new().with_max_chunk(Some(64));
        let mut server = TcpServerPort::with_config(config.clone());
        server.bind_ephemeral("127.0.0.1").expect("bind");
        let port = server.port().expect("assigned port");

        let mut client = TcpPort::new();
        client.connect_to("127.0.0.1", port, 2000).expect("connect");
        let accepted = server.accept(2000).expect("accept");
        assert_eq!(accepted.config(), &config);
        assert!(accepted.is_connected());
        assert_eq!(accepted.host(), Some("127.0.0.1"));
        assert_eq!(accepted.peer_addr(), client.local_addr());
    }
}
