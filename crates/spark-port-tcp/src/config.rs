use serde::Deserialize;
use socket2::Socket;
use std::{fs, io, path::Path, time::Duration};
use thiserror::Error;

/// 建连超时为 `0` 时使用的默认值（毫秒）。
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;
/// 默认监听队列长度。
pub const DEFAULT_BACKLOG: i32 = 128;

/// 端口级配置项，实现对套接字行为的显式控制。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“建连默认超时”“监听复用地址”“backlog”“`SO_LINGER`”等原本散落在实现里的常量
///   收拢为一个可从配置文件加载的结构；
/// - 服务端接受的新连接继承服务端配置，保证两端关闭策略一致。
///
/// ## 核心逻辑（How）
/// - 通过 `serde` 反序列化，缺省字段回落到 [`Default`]；
/// - [`PortConfig::validate`] 在加载后统一校验数值范围；
/// - `apply_to_connected` 把连接级选项（目前为 `linger`）写入已连接的套接字。
///
/// ## 契约说明（What）
/// - `connect_timeout_ms` 必须大于零；
/// - `backlog` 必须大于零；
/// - 配置文件中的 `max_chunk_bytes = 0` 视为非法；`None` 表示单次收发不设上限；
///   构建器传入的 `Some(0)` 归一为 `None`。
///
/// ## 设计取舍与注意事项（Trade-offs）
/// - `SO_LINGER` 在不同平台的精度不同（Linux 取整到秒）；
/// - 配置只在建连/绑定时读取，运行中修改需重新建立端口。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortConfig {
    connect_timeout_ms: u64,
    reuse_address: bool,
    backlog: i32,
    linger_ms: Option<u64>,
    max_chunk_bytes: Option<usize>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PortConfig {
    /// 创建默认配置。
    pub const fn new() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reuse_address: true,
            backlog: DEFAULT_BACKLOG,
            linger_ms: None,
            max_chunk_bytes: None,
        }
    }

    /// 从 TOML 文本解析配置并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PortConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置并校验。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// 校验数值范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.backlog <= 0 {
            return Err(ConfigError::Invalid {
                field: "backlog",
                reason: "must be greater than zero",
            });
        }
        if self.max_chunk_bytes == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_chunk_bytes",
                reason: "must be greater than zero when set",
            });
        }
        Ok(())
    }

    /// 设置建连超时为 `0` 时的替代值。
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 设置监听套接字是否启用 `SO_REUSEADDR`。
    pub fn with_reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    /// 设置监听队列长度。
    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// 设置 `SO_LINGER` 超时时长。
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger_ms = linger.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// 限制单次系统调用收发的最大字节数；`Some(0)` 等同于不设上限。
    pub fn with_max_chunk(mut self, max_chunk: Option<usize>) -> Self {
        self.max_chunk_bytes = max_chunk.filter(|&n| n > 0);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reuse_address(&self) -> bool {
        self.reuse_address
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger_ms.map(Duration::from_millis)
    }

    /// 单次收发的分片上限；未经校验反序列化得到的 `0` 同样视为不设上限。
    pub fn max_chunk(&self) -> Option<usize> {
        self.max_chunk_bytes.filter(|&n| n > 0)
    }

    /// 把连接级选项写入已连接的套接字。
    pub(crate) fn apply_to_connected(&self, socket: &Socket) -> io::Result<()> {
        if let Some(linger) = self.linger() {
            socket.set_linger(Some(linger))?;
        }
        Ok(())
    }
}

/// 配置加载失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败。
    #[error("failed to read port config `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    /// TOML 语法或字段类型错误。
    #[error("failed to parse port config: {0}")]
    Parse(#[from] toml::de::Error),
    /// 数值越界。
    #[error("invalid port config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
