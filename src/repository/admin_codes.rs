//! Redis-backed store for admin verification codes
//!
//! Each entry lives under `admin_code:{email}` as JSON. The key TTL is the
//! purge horizon; the entry's own `expires_at` is checked by the caller.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};

use crate::{
    error::{AppError, AppResult},
    models::admin_code::AdminVerificationCode,
};

use super::AdminCodeStore;

/// Counts a wrong guess against the entry still holding ARGV[1] and drops it
/// at ARGV[2] attempts. Returns nil when the entry is gone or was replaced.
static RECORD_FAILED_ATTEMPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return false
end
local entry = cjson.decode(raw)
if entry.code ~= ARGV[1] then
    return false
end
entry.attempts = entry.attempts + 1
if entry.attempts >= tonumber(ARGV[2]) then
    redis.call('DEL', KEYS[1])
else
    redis.call('SET', KEYS[1], cjson.encode(entry), 'KEEPTTL')
end
return entry.attempts
"#,
    )
});

fn key(email: &str) -> String {
    format!("admin_code:{}", email)
}

fn redis_error(context: &str, err: redis::RedisError) -> AppError {
    AppError::Unavailable(format!("{}: {}", context, err))
}

#[derive(Clone)]
pub struct RedisAdminCodeStore {
    conn: ConnectionManager,
    purge_after_seconds: u64,
}

impl RedisAdminCodeStore {
    /// Connect and check the server answers
    pub async fn connect(url: &str, purge_after_seconds: u64) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_error("Failed to connect to Redis", e))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| redis_error("Redis connection test failed", e))?;

        Ok(Self {
            conn,
            purge_after_seconds,
        })
    }

    fn encode(entry: &AdminVerificationCode) -> AppResult<String> {
        serde_json::to_string(entry)
            .map_err(|e| AppError::Internal(format!("Failed to encode admin code: {}", e)))
    }
}

#[async_trait]
impl AdminCodeStore for RedisAdminCodeStore {
    async fn upsert(&self, entry: &AdminVerificationCode) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let value = Self::encode(entry)?;

        conn.set_ex::<_, _, ()>(key(&entry.email), value, self.purge_after_seconds)
            .await
            .map_err(|e| redis_error("Failed to store admin code", e))
    }

    async fn find(&self, email: &str) -> AppResult<Option<AdminVerificationCode>> {
        let mut conn = self.conn.clone();

        let stored: Option<String> = conn
            .get(key(email))
            .await
            .map_err(|e| redis_error("Failed to read admin code", e))?;

        match stored {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                AppError::Internal(format!("Corrupted admin code entry for {}: {}", email, e))
            }),
            None => Ok(None),
        }
    }

    async fn remove(&self, email: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();

        let removed: i64 = conn
            .del(key(email))
            .await
            .map_err(|e| redis_error("Failed to delete admin code", e))?;

        Ok(removed > 0)
    }

    async fn record_failed_attempt(
        &self,
        email: &str,
        issued_code: &str,
        max_attempts: u32,
    ) -> AppResult<Option<u32>> {
        let mut conn = self.conn.clone();

        let attempts: Option<u32> = RECORD_FAILED_ATTEMPT
            .key(key(email))
            .arg(issued_code)
            .arg(max_attempts)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("Failed to update admin code", e))?;

        Ok(attempts)
    }
}
