use crate::domain::ports::CoordinationBackend;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use std::time::Duration;

/// Deletes the key only while it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Coordination backend on a shared Redis instance.
///
/// Holds one multiplexed connection; clones share it.
#[derive(Clone)]
pub struct RedisCoordinator {
    connection: MultiplexedConnection,
    release: Script,
}

impl RedisCoordinator {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            connection,
            release: Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl CoordinationBackend for RedisCoordinator {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut connection = self.connection.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut connection)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_owner(&self, key: &str, token: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        let deleted: i64 = self
            .release
            .key(key)
            .arg(token)
            .invoke_async(&mut connection)
            .await?;
        Ok(deleted == 1)
    }
}
