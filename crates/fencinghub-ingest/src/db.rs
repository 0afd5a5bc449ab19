//! SQLite 连接初始化：pragmas + refinery 内置迁移

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use std::path::Path;

use rusqlite::Connection;

use crate::error::{IngestError, Result};

const INGEST_PRAGMAS: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA busy_timeout=5000;
PRAGMA foreign_keys=ON;
";

pub fn init_db(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(INGEST_PRAGMAS.trim())
        .map_err(|e| IngestError::Database(format!("设置 PRAGMA 失败: {}", e)))?;
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| IngestError::Database(format!("执行 migration 失败: {}", e)))?;
    Ok(())
}

/// 打开（必要时创建）数据库文件并完成初始化
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;
    init_db(&mut conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    init_db(&mut conn)?;
    Ok(conn)
}
