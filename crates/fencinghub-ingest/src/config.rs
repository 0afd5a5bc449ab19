//! 服务端配置：命令行参数，缺省时读取环境变量

use std::path::PathBuf;

use clap::Parser;

/// 默认请求体上限：照片以 base64 内嵌在 payload 中，整批可能较大
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// FencingHub 批量同步端点
#[derive(Debug, Clone, Parser)]
#[command(name = "fencinghub-ingest")]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    #[arg(long, env = "FENCINGHUB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "FENCINGHUB_PORT", default_value_t = 3000)]
    pub port: u16,

    /// 业务表与幂等账本所在的 SQLite 文件
    #[arg(long, env = "FENCINGHUB_DATABASE", default_value = "./data/fencinghub.db")]
    pub database: PathBuf,

    /// 对象存储根目录，每个 bucket 一个子目录
    #[arg(long, env = "FENCINGHUB_STORAGE_DIR", default_value = "./data/storage")]
    pub storage_dir: PathBuf,

    /// 转发 customer_* 条目时使用的应用地址
    #[arg(long, env = "FENCINGHUB_APP_URL", default_value = "http://127.0.0.1:3000")]
    pub app_url: String,

    /// 请求体上限（字节）
    #[arg(long, env = "FENCINGHUB_BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// 以 JSON 格式输出日志
    #[arg(long, env = "FENCINGHUB_LOG_JSON")]
    pub log_json: bool,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
