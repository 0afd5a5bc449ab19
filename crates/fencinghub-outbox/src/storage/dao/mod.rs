//! 数据访问层 (DAO) - 每张表一个专门的操作模块

pub mod dead_letter;
pub mod outbox;

pub use dead_letter::{DeadLetter, DeadLetterDao};
pub use outbox::OutboxDao;

use rusqlite::Connection;

/// DAO 工厂 - 统一创建各种 DAO 实例
pub struct DaoFactory;

impl DaoFactory {
    pub fn outbox_dao(conn: &Connection) -> OutboxDao<'_> {
        OutboxDao::new(conn)
    }

    pub fn dead_letter_dao(conn: &Connection) -> DeadLetterDao<'_> {
        DeadLetterDao::new(conn)
    }
}
