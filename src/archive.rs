//! SQLite-backed chat history archive (C9).
//!
//! Mirrors the teacher's `db::history` query style: a thin wrapper around a
//! `SqlitePool`, raw SQL with `query_as`/`bind`, no query-builder layer.

use sqlx::SqlitePool;

use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    Join,
    Part,
    Mode,
    Topic,
    Notice,
    Privmsg,
    ServerMsg,
}

impl LogType {
    fn to_i64(self) -> i64 {
        match self {
            LogType::Join => 0,
            LogType::Part => 1,
            LogType::Mode => 2,
            LogType::Topic => 3,
            LogType::Notice => 4,
            LogType::Privmsg => 5,
            LogType::ServerMsg => 6,
        }
    }

    fn from_i64(value: i64) -> Self {
        match value {
            0 => LogType::Join,
            1 => LogType::Part,
            2 => LogType::Mode,
            3 => LogType::Topic,
            4 => LogType::Notice,
            5 => LogType::Privmsg,
            _ => LogType::ServerMsg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub time: i64,
    pub nickname: String,
    pub log_type: LogType,
    pub message: String,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    #[sqlx(rename = "logTime")]
    log_time: i64,
    nickname: Option<String>,
    #[sqlx(rename = "logType")]
    log_type: i64,
    message: Option<String>,
}

impl From<LogRow> for LogLine {
    fn from(row: LogRow) -> Self {
        LogLine {
            time: row.log_time,
            nickname: row.nickname.unwrap_or_default(),
            log_type: LogType::from_i64(row.log_type),
            message: row.message.unwrap_or_default(),
        }
    }
}

pub struct Archive {
    pool: SqlitePool,
}

impl Archive {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS Log (
                idx INTEGER PRIMARY KEY AUTOINCREMENT,
                userId TEXT NOT NULL,
                serverName TEXT NOT NULL,
                channel TEXT NOT NULL,
                logTime INTEGER NOT NULL,
                nickname TEXT,
                logType INTEGER NOT NULL,
                message TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS LogIndex ON Log (userId, serverName, channel, logTime DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert(
        &self,
        user_id: &str,
        server_name: &str,
        channel: &str,
        line: &LogLine,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO Log (userId, serverName, channel, logTime, nickname, logType, message)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(server_name)
        .bind(channel)
        .bind(line.time)
        .bind(&line.nickname)
        .bind(line.log_type.to_i64())
        .bind(&line.message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch log lines with `logTime` in `[begin, end)`, oldest first.
    pub async fn fetch_range(
        &self,
        user_id: &str,
        server_name: &str,
        channel: &str,
        begin: i64,
        end: i64,
    ) -> Result<Vec<LogLine>, DbError> {
        if begin >= end {
            return Ok(Vec::new());
        }

        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT logTime, nickname, logType, message FROM Log
             WHERE userId = ? AND serverName = ? AND channel = ?
               AND logTime >= ? AND logTime < ?
             ORDER BY idx ASC",
        )
        .bind(user_id)
        .bind(server_name)
        .bind(channel)
        .bind(begin)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LogLine::from).collect())
    }

    /// Fetch up to `count` log lines immediately before `end` (inclusive iff
    /// `include_end`), returned oldest first.
    pub async fn fetch_last(
        &self,
        user_id: &str,
        server_name: &str,
        channel: &str,
        end: i64,
        count: u32,
        include_end: bool,
    ) -> Result<Vec<LogLine>, DbError> {
        let sql = if include_end {
            "SELECT logTime, nickname, logType, message FROM Log
             WHERE userId = ? AND serverName = ? AND channel = ? AND logTime <= ?
             ORDER BY idx DESC LIMIT ?"
        } else {
            "SELECT logTime, nickname, logType, message FROM Log
             WHERE userId = ? AND serverName = ? AND channel = ? AND logTime < ?
             ORDER BY idx DESC LIMIT ?"
        };

        let mut rows: Vec<LogRow> = sqlx::query_as(sql)
            .bind(user_id)
            .bind(server_name)
            .bind(channel)
            .bind(end)
            .bind(i64::from(count))
            .fetch_all(&self.pool)
            .await?;

        rows.reverse();
        Ok(rows.into_iter().map(LogLine::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_archive() -> Archive {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let archive = Archive::new(pool);
        archive.ensure_schema().await.unwrap();
        archive
    }

    #[tokio::test]
    async fn range_fetch_is_ordered_and_half_open() {
        let archive = memory_archive().await;
        for t in [10, 20, 30] {
            archive
                .insert(
                    "u1",
                    "s1",
                    "#chan",
                    &LogLine {
                        time: t,
                        nickname: "n".into(),
                        log_type: LogType::Privmsg,
                        message: format!("msg-{t}"),
                    },
                )
                .await
                .unwrap();
        }

        let lines = archive.fetch_range("u1", "s1", "#chan", 10, 30).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "msg-10");
        assert_eq!(lines[1].message, "msg-20");
    }

    #[tokio::test]
    async fn begin_not_before_end_yields_empty() {
        let archive = memory_archive().await;
        let lines = archive.fetch_range("u1", "s1", "#chan", 30, 10).await.unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn fetch_last_returns_chronological_order() {
        let archive = memory_archive().await;
        for t in [1, 2, 3, 4, 5] {
            archive
                .insert(
                    "u1",
                    "s1",
                    "#chan",
                    &LogLine {
                        time: t,
                        nickname: "n".into(),
                        log_type: LogType::Privmsg,
                        message: format!("m{t}"),
                    },
                )
                .await
                .unwrap();
        }

        let lines = archive.fetch_last("u1", "s1", "#chan", 5, 3, true).await.unwrap();
        assert_eq!(
            lines.iter().map(|l| l.message.clone()).collect::<Vec<_>>(),
            vec!["m3", "m4", "m5"]
        );

        let lines = archive.fetch_last("u1", "s1", "#chan", 5, 3, false).await.unwrap();
        assert_eq!(
            lines.iter().map(|l| l.message.clone()).collect::<Vec<_>>(),
            vec!["m2", "m3", "m4"]
        );
    }
}
