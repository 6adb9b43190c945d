use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns `true` while the caller is under `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}
