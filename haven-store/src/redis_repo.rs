use async_trait::async_trait;
use haven_core::repository::{AvailabilityCache, CacheKey};
use haven_core::CoreResult;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::storage_error;

/// Stores the flag only if the hotel's epoch is still the caller's.
/// KEYS: epoch, entry, key set. ARGV: epoch, flag, ttl ms.
const PUT_IF_CURRENT: &str = r#"
    local current = tonumber(redis.call("GET", KEYS[1]) or "0")
    if current ~= tonumber(ARGV[1]) then
        return 0
    end
    redis.call("SET", KEYS[2], ARGV[2], "PX", ARGV[3])
    redis.call("SADD", KEYS[3], KEYS[2])
    redis.call("PEXPIRE", KEYS[3], ARGV[3])
    return 1
"#;

/// Advances the epoch and drops every entry recorded in the key set.
/// KEYS: epoch, key set.
const INVALIDATE_HOTEL: &str = r#"
    redis.call("INCR", KEYS[1])
    local removed = 0
    for _, key in ipairs(redis.call("SMEMBERS", KEYS[2])) do
        removed = removed + redis.call("DEL", key)
    end
    redis.call("DEL", KEYS[2])
    return removed
"#;

/// Availability cache in Redis, shared by every API instance.
#[derive(Clone)]
pub struct RedisAvailabilityCache {
    client: redis::Client,
    timeout: Duration,
}

impl RedisAvailabilityCache {
    pub fn new(connection_string: &str, timeout: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, timeout })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> CoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(storage_error(op, e)),
            Err(_) => Err(storage_error(op, "timed out")),
        }
    }

    async fn connection(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.bounded("redis connect", self.client.get_multiplexed_async_connection())
            .await
    }
}

fn epoch_key(hotel_id: &str) -> String {
    format!("availability:{}:epoch", hotel_id)
}

fn key_set(hotel_id: &str) -> String {
    format!("availability:{}:keys", hotel_id)
}

fn encode_flag(available: bool) -> &'static str {
    if available {
        "1"
    } else {
        "0"
    }
}

fn decode_flag(raw: &str) -> Option<bool> {
    match raw {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl AvailabilityCache for RedisAvailabilityCache {
    async fn get(&self, key: &CacheKey) -> CoreResult<Option<bool>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = self.bounded("redis get", conn.get(key.render())).await?;
        Ok(raw.as_deref().and_then(decode_flag))
    }

    async fn epoch(&self, hotel_id: &str) -> CoreResult<u64> {
        let mut conn = self.connection().await?;
        let raw: Option<u64> = self.bounded("redis get epoch", conn.get(epoch_key(hotel_id))).await?;
        Ok(raw.unwrap_or(0))
    }

    async fn put(&self, key: &CacheKey, available: bool, ttl: Duration, epoch: u64) -> CoreResult<bool> {
        let mut conn = self.connection().await?;
        let script = redis::Script::new(PUT_IF_CURRENT);
        let mut invocation = script.key(epoch_key(&key.hotel_id));
        invocation
            .key(key.render())
            .key(key_set(&key.hotel_id))
            .arg(epoch)
            .arg(encode_flag(available))
            .arg(ttl.as_millis().max(1) as u64);

        let stored: i64 = self.bounded("redis put", invocation.invoke_async(&mut conn)).await?;
        Ok(stored == 1)
    }

    async fn invalidate(&self, hotel_id: &str) -> CoreResult<usize> {
        let mut conn = self.connection().await?;
        let script = redis::Script::new(INVALIDATE_HOTEL);
        let mut invocation = script.key(epoch_key(hotel_id));
        invocation.key(key_set(hotel_id));

        let removed: i64 = self.bounded("redis invalidate", invocation.invoke_async(&mut conn)).await?;
        debug!(hotel_id, removed, "Redis availability entries dropped");
        Ok(removed.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_core::StayDates;

    #[test]
    fn test_key_layout() {
        let key = CacheKey::new("h1", StayDates::parse("2024-06-01", "2024-06-05").unwrap());
        assert_eq!(key.render(), "availability:h1:2024-06-01:2024-06-05");
        assert_eq!(epoch_key("h1"), "availability:h1:epoch");
        assert_eq!(key_set("h1"), "availability:h1:keys");
    }

    #[test]
    fn test_flag_encoding() {
        assert_eq!(decode_flag(encode_flag(true)), Some(true));
        assert_eq!(decode_flag(encode_flag(false)), Some(false));
        assert_eq!(decode_flag("yes"), None);
    }
}
