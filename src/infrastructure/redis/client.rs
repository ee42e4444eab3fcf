use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, aio::MultiplexedConnection};
use tracing::info;

use crate::infrastructure::ports::{JobIdUpdate, TaskStore};
use crate::modules::analysis::model::VideoTask;

// Rewrites job_id in place and keeps the key's TTL. Returns 1 when written,
// 0 when the key is gone, or the job id already stored when it differs.
const SET_JOB_ID_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local task = cjson.decode(raw)
local current = task['job_id']
if current ~= nil and current ~= cjson.null and current ~= ARGV[1] then
    return current
end
task['job_id'] = ARGV[1]
redis.call('SET', KEYS[1], cjson.encode(task), 'KEEPTTL')
return 1
"#;

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(connection_string)?;

        // Test connection
        let _conn = client.get_multiplexed_async_connection().await?;

        info!("✅ Connected to Redis");
        Ok(Self { client })
    }

    pub async fn get_conn(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn task_key(key: &str) -> String {
        format!("video_task:{}", key)
    }
}

#[async_trait]
impl TaskStore for RedisService {
    async fn put_if_absent(&self, key: &str, task: &VideoTask, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let payload = serde_json::to_string(task)?;

        // SET NX answers OK on insert and nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::task_key(key))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<VideoTask>> {
        let mut conn = self.get_conn().await?;
        let raw: Option<String> = conn.get(Self::task_key(key)).await?;

        raw.map(|r| {
            serde_json::from_str(&r).map_err(|e| anyhow!("Corrupt task record for {}: {}", key, e))
        })
        .transpose()
    }

    async fn set_job_id(&self, key: &str, job_id: &str) -> Result<JobIdUpdate> {
        let mut conn = self.get_conn().await?;

        let reply: redis::Value = Script::new(SET_JOB_ID_SCRIPT)
            .key(Self::task_key(key))
            .arg(job_id)
            .invoke_async(&mut conn)
            .await?;

        match reply {
            redis::Value::Int(1) => Ok(JobIdUpdate::Updated),
            redis::Value::Int(_) => Ok(JobIdUpdate::Missing),
            other => {
                let existing: String = redis::from_redis_value(&other)?;
                Ok(JobIdUpdate::Conflict(existing))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: i64 = conn.del(Self::task_key(key)).await?;
        Ok(())
    }
}
