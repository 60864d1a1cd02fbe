use std::{fmt, time::Duration};

/// 端口操作的超时语义。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以类型代替“毫秒整数 + 魔数”的约定：`-1` 永久阻塞、`0` 非阻塞尝试、正数为上限；
/// - 让 `connect` 对 `0` 的特殊改写（见 [`Timeout::for_connect`]）集中在一处。
///
/// ## 契约 (What)
/// - [`Timeout::Infinite`]：阻塞直至完成；
/// - [`Timeout::Immediate`]：非阻塞，立即返回；
/// - [`Timeout::After`]：阻塞，至多等待给定时长，时长恒大于零；
/// - [`Timeout::from_millis`] 接受任意 `i64`，负数一律视为永久阻塞。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// 永久阻塞。
    #[default]
    Infinite,
    /// 非阻塞尝试。
    Immediate,
    /// 阻塞，但至多等待给定时长。
    After(Duration),
}

impl Timeout {
    /// 按毫秒约定构造超时：负数永久阻塞，`0` 非阻塞，正数为上限。
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            m if m < 0 => Timeout::Infinite,
            0 => Timeout::Immediate,
            m => Timeout::After(Duration::from_millis(m as u64)),
        }
    }

    /// 以 `Duration` 构造；零时长等价于 [`Timeout::Immediate`]。
    pub fn from_duration(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(duration)
        }
    }

    /// 还原为毫秒约定，`Infinite` 记为 `-1`。
    pub fn as_millis(&self) -> i64 {
        match self {
            Timeout::Infinite => -1,
            Timeout::Immediate => 0,
            Timeout::After(duration) => i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// 是否需要以阻塞模式执行。
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Timeout::Immediate)
    }

    /// 套接字层面的超时设置：`None` 表示不设上限。
    ///
    /// `Immediate` 同样返回 `None`，因为非阻塞模式下内核超时不生效。
    pub fn as_socket_timeout(&self) -> Option<Duration> {
        match self {
            Timeout::After(duration) => Some(*duration),
            Timeout::Infinite | Timeout::Immediate => None,
        }
    }

    /// 建连专用的超时改写：不支持非阻塞建连，`Immediate` 被替换为 `default`。
    ///
    /// `default` 为零时退化为 1 毫秒，保证结果总是阻塞语义。
    pub fn for_connect(self, default: Duration) -> Self {
        match self {
            Timeout::Immediate => Timeout::After(default.max(Duration::from_millis(1))),
            other => other,
        }
    }
}

impl From<i32> for Timeout {
    fn from(millis: i32) -> Self {
        Timeout::from_millis(i64::from(millis))
    }
}

impl From<i64> for Timeout {
    fn from(millis: i64) -> Self {
        Timeout::from_millis(millis)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::from_duration(duration)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Infinite => f.write_str("infinite"),
            Timeout::Immediate => f.write_str("immediate"),
            Timeout::After(duration) => write!(f, "{}ms", duration.as_millis()),
        }
    }
}
