//! Redis-backed queue with visibility timeouts.
//!
//! Layout per queue (`{prefix}:{name}`):
//! - `:ready`     ZSET    message id -> epoch millis at which it is receivable
//! - `:messages`  HASH    message id -> JSON envelope (body + attributes)
//! - `:leases`    HASH    message id -> lease token of the current delivery
//! - `:receives`  HASH    message id -> delivery count
//! - `:dlq`       STREAM  dead-lettered messages
//!
//! Receiving pushes the score forward by the visibility timeout and issues a
//! fresh lease, so a message whose consumer dies reappears on its own. A
//! message already delivered `max_receive_count` times is moved to `:dlq`
//! instead. All state changes run as Lua scripts and are atomic per call.

use crate::dead_letter::{DeadLetter, DeadLetterReason};
use crate::error::QueueError;
use crate::message::{QueueMessage, parse_receipt, receipt_handle};
use crate::queue::{Queue, QueueProducer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use redis::Script;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

// Type alias for Redis stream entries
type StreamEntries = Vec<(String, Vec<(String, String)>)>;

type LeasedRows = (Vec<(String, String, String, u32)>, Vec<(String, u32)>);

static RECEIVE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local now = tonumber(ARGV[1])
local max_receives = tonumber(ARGV[5])
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', now, 'LIMIT', 0, tonumber(ARGV[2]))
local out = {}
local dead = {}
for i, id in ipairs(ids) do
  local envelope = redis.call('HGET', KEYS[2], id)
  if not envelope then
    redis.call('ZREM', KEYS[1], id)
  else
    local received = tonumber(redis.call('HGET', KEYS[4], id) or '0')
    if max_receives > 0 and received >= max_receives then
      redis.call('XADD', KEYS[5], 'MAXLEN', '~', ARGV[6], '*',
        'message_id', id, 'envelope', envelope, 'receive_count', tostring(received),
        'reason', 'receive_limit', 'dead_lettered_at', ARGV[1])
      redis.call('ZREM', KEYS[1], id)
      redis.call('HDEL', KEYS[2], id)
      redis.call('HDEL', KEYS[3], id)
      redis.call('HDEL', KEYS[4], id)
      table.insert(dead, {id, received})
    else
      local lease = ARGV[4] .. '-' .. i
      redis.call('ZADD', KEYS[1], now + tonumber(ARGV[3]), id)
      redis.call('HSET', KEYS[3], id, lease)
      local count = redis.call('HINCRBY', KEYS[4], id, 1)
      table.insert(out, {id, envelope, lease, count})
    end
  end
end
return {out, dead}
"#,
    )
});

static DELETE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('HGET', KEYS[3], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('HDEL', KEYS[4], ARGV[1])
return 1
"#,
    )
});

static CHANGE_VISIBILITY_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('ZADD', KEYS[1], 'XX', tonumber(ARGV[3]), ARGV[1])
return 1
"#,
    )
});

/// Hands a leased message back as if it had never been received.
static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
  return 0
end
redis.call('ZADD', KEYS[1], 'XX', tonumber(ARGV[3]), ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HINCRBY', KEYS[3], ARGV[1], -1)
return 1
"#,
    )
});

static DEAD_LETTER_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('HGET', KEYS[3], ARGV[1]) ~= ARGV[2] then
  return 0
end
local envelope = redis.call('HGET', KEYS[2], ARGV[1]) or ''
local received = redis.call('HGET', KEYS[4], ARGV[1]) or '0'
redis.call('XADD', KEYS[5], 'MAXLEN', '~', ARGV[4], '*',
  'message_id', ARGV[1], 'envelope', envelope, 'receive_count', received,
  'reason', ARGV[3], 'dead_lettered_at', ARGV[5])
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[3], ARGV[1])
redis.call('HDEL', KEYS[4], ARGV[1])
return 1
"#,
    )
});

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    body: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    sent_at: i64,
}

struct Keys {
    ready: String,
    messages: String,
    leases: String,
    receives: String,
    dead_letters: String,
}

#[derive(Clone)]
pub struct RedisQueue {
    redis: ConnectionManager,
    name: String,
    visibility_timeout: Duration,
    poll_interval: Duration,
    max_receive_count: u32,
    dead_letter_max_len: u64,
    keys: Arc<Keys>,
}

impl RedisQueue {
    pub fn new(redis: ConnectionManager, prefix: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        let base = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}:{name}")
        };
        Self {
            redis,
            name,
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            max_receive_count: 0,
            dead_letter_max_len: 10_000,
            keys: Arc::new(Keys {
                ready: format!("{base}:ready"),
                messages: format!("{base}:messages"),
                leases: format!("{base}:leases"),
                receives: format!("{base}:receives"),
                dead_letters: format!("{base}:dlq"),
            }),
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// How often an empty long poll re-checks Redis.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Dead-letter a message on the receive after its `count`th delivery;
    /// 0 keeps it forever.
    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = count;
        self
    }

    /// Approximate cap on the dead-letter stream (`XADD MAXLEN ~`).
    pub fn with_dead_letter_max_len(mut self, max_len: u64) -> Self {
        self.dead_letter_max_len = max_len;
        self
    }

    /// Messages not yet deleted, visible or not.
    pub async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.redis.clone();
        let depth: u64 = redis::cmd("ZCARD")
            .arg(&self.keys.ready)
            .query_async(&mut conn)
            .await?;
        Ok(depth)
    }

    pub async fn dead_letter_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.redis.clone();
        let depth: u64 = redis::cmd("XLEN")
            .arg(&self.keys.dead_letters)
            .query_async(&mut conn)
            .await?;
        Ok(depth)
    }

    /// Up to `count` dead-lettered messages, oldest first.
    pub async fn dead_letters(&self, count: usize) -> Result<Vec<DeadLetter>, QueueError> {
        let mut conn = self.redis.clone();
        let entries: StreamEntries = redis::cmd("XRANGE")
            .arg(&self.keys.dead_letters)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        Ok(entries
            .into_iter()
            .filter_map(|(_, fields)| dead_letter_from_fields(fields.into_iter().collect()))
            .collect())
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Lease visible messages on a detached task.
    ///
    /// If the returned receiver is dropped before the result arrives, the
    /// task hands the leased messages back, so a cancelled receive never
    /// hides messages until their visibility timeout.
    fn spawn_lease(
        &self,
        max_messages: usize,
    ) -> oneshot::Receiver<Result<Vec<QueueMessage>, QueueError>> {
        let (tx, rx) = oneshot::channel();
        let queue = self.clone();
        tokio::spawn(async move {
            let leased = queue.lease_visible(max_messages).await;
            if let Err(Ok(batch)) = tx.send(leased) {
                queue.release(batch).await;
            }
        });
        rx
    }

    async fn lease_visible(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut conn = self.redis.clone();
        let (rows, dead): LeasedRows = RECEIVE_SCRIPT
            .key(&self.keys.ready)
            .key(&self.keys.messages)
            .key(&self.keys.leases)
            .key(&self.keys.receives)
            .key(&self.keys.dead_letters)
            .arg(Self::now_millis())
            .arg(max_messages)
            .arg(self.visibility_timeout.as_millis() as u64)
            .arg(Uuid::new_v4().to_string())
            .arg(self.max_receive_count)
            .arg(self.dead_letter_max_len)
            .invoke_async(&mut conn)
            .await?;

        for (message_id, receive_count) in dead {
            warn!(
                queue = %self.name,
                %message_id,
                receive_count,
                "Receive limit reached, moved message to dead-letter queue"
            );
            crate::metrics::record_dead_lettered(&self.name, DeadLetterReason::ReceiveLimit);
        }

        let now = Self::now_millis();
        let mut batch = Vec::with_capacity(rows.len());
        for (id, envelope, lease, receive_count) in rows {
            match serde_json::from_str::<Envelope>(&envelope) {
                Ok(envelope) => {
                    debug!(
                        message_id = %id,
                        receive_count,
                        age_ms = now - envelope.sent_at,
                        "Leased message"
                    );
                    batch.push(QueueMessage {
                        receipt_handle: receipt_handle(&id, &lease),
                        id,
                        body: envelope.body,
                        attributes: envelope.attributes,
                        receive_count,
                    });
                }
                Err(e) => {
                    warn!(queue = %self.name, message_id = %id, error = %e, "Undecodable envelope");
                    let reason = DeadLetterReason::MalformedEnvelope;
                    if let Err(e) = self.dead_letter(&id, &lease, reason).await {
                        error!(
                            queue = %self.name,
                            message_id = %id,
                            error = %e,
                            "Failed to dead-letter undecodable envelope"
                        );
                    }
                }
            }
        }
        Ok(batch)
    }

    async fn dead_letter(
        &self,
        id: &str,
        lease: &str,
        reason: DeadLetterReason,
    ) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let moved: i32 = DEAD_LETTER_SCRIPT
            .key(&self.keys.ready)
            .key(&self.keys.messages)
            .key(&self.keys.leases)
            .key(&self.keys.receives)
            .key(&self.keys.dead_letters)
            .arg(id)
            .arg(lease)
            .arg(reason.as_ref())
            .arg(self.dead_letter_max_len)
            .arg(Self::now_millis())
            .invoke_async(&mut conn)
            .await?;

        if moved == 1 {
            crate::metrics::record_dead_lettered(&self.name, reason);
            warn!(
                queue = %self.name,
                message_id = %id,
                %reason,
                "Moved message to dead-letter queue"
            );
            Ok(())
        } else {
            Err(QueueError::StaleReceipt {
                message_id: id.to_string(),
            })
        }
    }

    async fn release(&self, batch: Vec<QueueMessage>) {
        let mut conn = self.redis.clone();
        let now = Self::now_millis();
        for message in &batch {
            let Ok((id, lease)) = parse_receipt(&message.receipt_handle) else {
                continue;
            };
            let released: Result<i32, _> = RELEASE_SCRIPT
                .key(&self.keys.ready)
                .key(&self.keys.leases)
                .key(&self.keys.receives)
                .arg(id)
                .arg(lease)
                .arg(now)
                .invoke_async(&mut conn)
                .await;
            if let Err(e) = released {
                warn!(
                    queue = %self.name,
                    message_id = %id,
                    error = %e,
                    "Failed to release message from cancelled receive"
                );
            }
        }
        debug!(queue = %self.name, count = batch.len(), "Released messages from cancelled receive");
    }
}

fn dead_letter_from_fields(mut fields: HashMap<String, String>) -> Option<DeadLetter> {
    let id = fields.remove("message_id")?;
    let raw = fields.remove("envelope").unwrap_or_default();
    let (body, attributes) = match serde_json::from_str::<Envelope>(&raw) {
        Ok(envelope) => (envelope.body, envelope.attributes),
        Err(_) => (raw, HashMap::new()),
    };
    let dead_lettered_at = fields
        .get("dead_lettered_at")
        .and_then(|millis| millis.parse().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default();

    Some(DeadLetter {
        id,
        body,
        attributes,
        receive_count: fields
            .get("receive_count")
            .and_then(|count| count.parse().ok())
            .unwrap_or_default(),
        reason: fields
            .get("reason")
            .and_then(|reason| DeadLetterReason::from_str(reason).ok())
            .unwrap_or(DeadLetterReason::ReceiveLimit),
        dead_lettered_at,
    })
}

#[async_trait]
impl Queue for RedisQueue {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(queue = %self.name))]
    async fn receive(
        &self,
        max_messages: usize,
        wait_secs: u32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(u64::from(wait_secs));
        loop {
            let batch = self
                .spawn_lease(max_messages)
                .await
                .map_err(|_| QueueError::Interrupted(self.name.clone()))??;
            if !batch.is_empty() || max_messages == 0 {
                debug!(count = batch.len(), "Received messages");
                return Ok(batch);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            tokio::time::sleep_until((now + self.poll_interval).min(deadline)).await;
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let (id, lease) = parse_receipt(receipt_handle)?;
        let mut conn = self.redis.clone();
        let deleted: i32 = DELETE_SCRIPT
            .key(&self.keys.ready)
            .key(&self.keys.messages)
            .key(&self.keys.leases)
            .key(&self.keys.receives)
            .arg(id)
            .arg(lease)
            .invoke_async(&mut conn)
            .await?;

        if deleted == 1 {
            Ok(())
        } else {
            Err(QueueError::StaleReceipt {
                message_id: id.to_string(),
            })
        }
    }

    async fn change_visibility(
        &self,
        receipt_handle: &str,
        timeout_secs: u32,
    ) -> Result<(), QueueError> {
        let (id, lease) = parse_receipt(receipt_handle)?;
        let visible_at = Self::now_millis() + i64::from(timeout_secs) * 1000;
        let mut conn = self.redis.clone();
        let changed: i32 = CHANGE_VISIBILITY_SCRIPT
            .key(&self.keys.ready)
            .key(&self.keys.leases)
            .arg(id)
            .arg(lease)
            .arg(visible_at)
            .invoke_async(&mut conn)
            .await?;

        if changed == 1 {
            Ok(())
        } else {
            Err(QueueError::StaleReceipt {
                message_id: id.to_string(),
            })
        }
    }
}

#[async_trait]
impl QueueProducer for RedisQueue {
    async fn send(
        &self,
        body: String,
        attributes: HashMap<String, String>,
    ) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let now = Self::now_millis();
        let envelope = serde_json::to_string(&Envelope {
            body,
            attributes,
            sent_at: now,
        })?;

        let mut conn = self.redis.clone();
        redis::pipe()
            .atomic()
            .hset(&self.keys.messages, &id, envelope)
            .ignore()
            .zadd(&self.keys.ready, &id, now)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue = %self.name, message_id = %id, "Message sent");
        Ok(id)
    }
}
