//! 协议常量

/// 发件箱持久化存储的名称（页面与 worker 通过同一名称打开同一个库）
pub const OUTBOX_STORE_NAME: &str = "fencinghub-outbox";

/// 后台同步注册使用的 tag
pub const SYNC_TAG: &str = "fencinghub-sync";

/// 批量同步端点路径
pub const SYNC_BATCH_PATH: &str = "/api/sync/batch";

/// 页面打开期间的周期同步间隔（秒）
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10 * 60;

/// payload 中内嵌照片列表的字段名
pub const PHOTOS_FIELD: &str = "photos";
