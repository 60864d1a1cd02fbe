#![doc = r#"
# spark-port-tcp

## 设计动机（Why）
- **定位**：该 crate 提供同步、可阻塞的 TCP 客户端/服务端端口，封装建连、
  绑定、接受与“收发至满长度”的循环，调用线程即执行线程。
- **架构角色**：位于操作系统套接字之上的最薄一层；地址解析、套接字创建与
  选项设置全部委托给 `socket2` 与 `std::net`。
- **设计理念**：强调“超时语义显式化”与“句柄所有权唯一”。超时以
  [`Timeout`] 表达，服务端接受的连接以一次性凭证移交给客户端端口。

## 核心契约（What）
- **超时约定**：`-1`（任意负数）永久阻塞，`0` 非阻塞尝试，正数为毫秒上限；
  唯一例外是建连，`0` 改写为配置的默认值（1000 ms）；
- **输出保障**：所有失败以 [`PortError`] 返回，收发失败携带已完成字节数；
  每个端口同时记录一次性的数值错误码，由 `last_error()` 读出并清除；
- **前置约束**：端口可在线程间移动，但同一时刻只由一个线程操作（`&mut self`）。

## 实现策略（How）
- **状态共享**：客户端与服务端以组合方式嵌入同一份基础状态，阻塞模式的切换
  只经由一个入口，仅在目标模式与记录不同时才触达系统调用；
- **收发循环**：阻塞模式下把超时视作整体截止时间，逐片刷新套接字超时；
  非阻塞模式下遇到“会阻塞”立即失败返回；
- **句柄交接**：服务端 `accept` 产出凭证，客户端端口采纳后服务端不再持有该句柄。

## 风险与考量（Trade-offs）
- **平台差异**：监听句柄上的接受超时依赖 `SO_RCVTIMEO`，在不支持该语义的平台上
  有界超时的 `accept` 会退化为阻塞等待；
- **日志**：库本身只产生 `tracing` 事件，不安装订阅者。
"#]

mod base;
mod client;
mod config;
mod error;
mod handle;
mod port;
mod scope;
mod server;
mod timeout;
mod util;

pub use client::PortState;
pub use config::{ConfigError, DEFAULT_BACKLOG, DEFAULT_CONNECT_TIMEOUT_MS, PortConfig};
pub use error::{ErrorCategory, OperationKind, PortError, Precondition, codes};
pub use handle::SocketRole;
pub use port::{TcpPort, TcpServerPort};
pub use scope::ScopeId;
pub use server::ServerState;
pub use timeout::Timeout;
