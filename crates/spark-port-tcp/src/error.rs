use std::{fmt, io};
use thiserror::Error;

/// 描述一次端口操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationKind {
    code: &'static str,
    message: &'static str,
}

impl OperationKind {
    /// 稳定错误码，形如 `spark.port.tcp.connect_failed`。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 面向日志的操作名称。
    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "spark.port.tcp.configure_failed",
    message: "tcp configure",
};
pub(crate) const RESOLVE: OperationKind = OperationKind {
    code: "spark.port.tcp.resolve_failed",
    message: "tcp resolve",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "spark.port.tcp.connect_failed",
    message: "tcp connect",
};
pub(crate) const BIND: OperationKind = OperationKind {
    code: "spark.port.tcp.bind_failed",
    message: "tcp bind",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "spark.port.tcp.accept_failed",
    message: "tcp accept",
};
pub(crate) const SEND: OperationKind = OperationKind {
    code: "spark.port.tcp.send_failed",
    message: "tcp send",
};
pub(crate) const RECV: OperationKind = OperationKind {
    code: "spark.port.tcp.recv_failed",
    message: "tcp recv",
};

const TIMEOUT_CODE: &str = "spark.port.tcp.timeout";
const PRECONDITION_CODE: &str = "spark.port.tcp.precondition";

/// `last_error()` 返回的数值错误码。
///
/// 带操作系统错误码的失败直接透传 OS 码；没有 OS 码的条件使用
/// [`LIBRARY_BASE`] 之上的库内码值。
pub mod codes {
    /// 无错误。
    pub const NONE: i32 = 0;
    /// 库内码值起点，低于该值的非零码均来自操作系统。
    pub const LIBRARY_BASE: i32 = 20_000;
    /// 前置条件被违反（缺少地址、端口状态不符等）。
    pub const PRECONDITION: i32 = LIBRARY_BASE + 1;
    /// 地址解析失败。
    pub const RESOLVE: i32 = LIBRARY_BASE + 2;
    /// 操作超时。
    pub const TIMED_OUT: i32 = LIBRARY_BASE + 3;
    /// 对端在传输完成前关闭了连接。
    pub const EOF: i32 = LIBRARY_BASE + 4;
    /// 未归类的失败。
    pub const UNKNOWN: i32 = LIBRARY_BASE + 99;
}

/// 被违反的前置条件。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Precondition {
    /// 从未配置主机名。
    MissingHost,
    /// 从未配置端口号，且本次调用也未提供。
    MissingPort,
    /// 显式传入了空主机名。
    EmptyHost,
    /// 显式传入了端口号 `0`。
    ZeroPort,
    /// 目标端口已经持有套接字句柄。
    AlreadyConnected,
    /// 端口尚未连接或已关闭。
    NotConnected,
    /// 服务端尚未绑定或已关闭。
    NotBound,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Precondition::MissingHost => "no host configured",
            Precondition::MissingPort => "no port configured",
            Precondition::EmptyHost => "host must not be empty",
            Precondition::ZeroPort => "port must not be zero",
            Precondition::AlreadyConnected => "target port already owns a socket handle",
            Precondition::NotConnected => "port is not connected",
            Precondition::NotBound => "server port is not bound",
        };
        f.write_str(text)
    }
}

/// 错误的处置分类，驱动调用方的重试策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 超时到期。
    Timeout,
    /// 对端或网络状态导致，可换新连接重试。
    Retryable,
    /// 重试无意义。
    NonRetryable,
    /// 调用方违反了使用约定。
    Precondition,
}

/// 端口操作失败。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 用一个枚举覆盖配置、解析、建连、绑定、接受与收发各阶段的失败；
/// - 收发失败携带已完成的字节数：流式套接字上的失败不一定是“全有或全无”。
///
/// ## 契约 (What)
/// - [`PortError::code`] 给出 `last_error()` 使用的数值码；
/// - [`PortError::transferred`] 给出失败前完成的字节数，非收发错误恒为 `0`；
/// - [`PortError::category`] 给出处置分类。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PortError {
    /// 调用方违反前置条件。
    #[error("{op}: {violation}")]
    Precondition {
        op: OperationKind,
        violation: Precondition,
    },
    /// 主机名与端口无法解析为可连接地址。
    #[error("{op}: could not resolve `{host}:{port}`: {source}")]
    Resolve {
        op: OperationKind,
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// 底层网络库调用失败。
    #[error("{op}: {source}")]
    Io {
        op: OperationKind,
        #[source]
        source: io::Error,
    },
    /// 收发在完成请求长度前中止。
    #[error("{op}: {transferred} of {requested} bytes transferred: {source}")]
    Transfer {
        op: OperationKind,
        transferred: usize,
        requested: usize,
        #[source]
        source: io::Error,
    },
}

impl PortError {
    pub(crate) fn precondition(op: OperationKind, violation: Precondition) -> Self {
        PortError::Precondition { op, violation }
    }

    pub(crate) fn io(op: OperationKind, source: io::Error) -> Self {
        PortError::Io { op, source }
    }

    /// 失败的操作。
    pub fn op(&self) -> OperationKind {
        match self {
            PortError::Precondition { op, .. }
            | PortError::Resolve { op, .. }
            | PortError::Io { op, .. }
            | PortError::Transfer { op, .. } => *op,
        }
    }

    /// 稳定字符串错误码。
    pub fn stable_code(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Timeout => TIMEOUT_CODE,
            ErrorCategory::Precondition => PRECONDITION_CODE,
            _ => self.op().code(),
        }
    }

    /// `last_error()` 记录的数值码，恒不为 [`codes::NONE`]。
    pub fn code(&self) -> i32 {
        match self {
            PortError::Precondition { .. } => codes::PRECONDITION,
            PortError::Resolve { source, .. } => {
                source.raw_os_error().unwrap_or(codes::RESOLVE)
            }
            PortError::Io { source, .. } | PortError::Transfer { source, .. } => io_code(source),
        }
    }

    /// 失败前已完成的字节数。
    pub fn transferred(&self) -> usize {
        match self {
            PortError::Transfer { transferred, .. } => *transferred,
            _ => 0,
        }
    }

    /// 违反的前置条件（若是）。
    pub fn violation(&self) -> Option<Precondition> {
        match self {
            PortError::Precondition { violation, .. } => Some(*violation),
            _ => None,
        }
    }

    /// 底层 IO 错误（若有）。
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            PortError::Resolve { source, .. }
            | PortError::Io { source, .. }
            | PortError::Transfer { source, .. } => Some(source),
            PortError::Precondition { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PortError::Precondition { .. } => ErrorCategory::Precondition,
            PortError::Resolve { .. } => ErrorCategory::NonRetryable,
            PortError::Io { source, .. } | PortError::Transfer { source, .. } => {
                categorize_io_error(source)
            }
        }
    }
}

/// 构造超时错误；阻塞模式下的 `WouldBlock` 也统一改写为它。
pub(crate) fn timed_out(op: OperationKind) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out", op.message))
}

/// 对端在请求长度完成前关闭连接。
pub(crate) fn peer_closed() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed by peer before transfer completed",
    )
}

fn io_code(error: &io::Error) -> i32 {
    error.raw_os_error().unwrap_or(match error.kind() {
        io::ErrorKind::TimedOut => codes::TIMED_OUT,
        io::ErrorKind::UnexpectedEof => codes::EOF,
        _ => codes::UNKNOWN,
    })
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::WouldBlock
        | ErrorKind::Interrupted
        | ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::AddrInUse
        | ErrorKind::AddrNotAvailable
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof
        | ErrorKind::WriteZero => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}
