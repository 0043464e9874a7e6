//! Redis-backed namespace store
//!
//! # Key schema
//!
//! ```text
//! {prefix}:node:{name}            HASH  {parent, link?, expiry?}
//! {prefix}:node:{name}:children   SET   child names
//! {prefix}:parent:{parent}        SET   names whose parent is {parent}
//! ```
//!
//! The parent index is written together with the node hash on insert; the
//! children set is written only by `set_children` and `set_link`.

use super::connection::{RedisConfig, RedisPool};
use crate::error::StoreError;
use crate::store::NamespaceStore;
use crate::types::MetricNode;

use async_trait::async_trait;
use redis::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const FIELD_PARENT: &str = "parent";
const FIELD_LINK: &str = "link";
const FIELD_EXPIRY: &str = "expiry";

/// Default key prefix
pub const DEFAULT_KEY_PREFIX: &str = "ns";

/// Builds the Redis keys for a given prefix
#[derive(Debug, Clone)]
pub struct KeySchema {
    prefix: String,
}

impl KeySchema {
    /// Schema rooted at `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Hash holding the node record
    pub fn node(&self, name: &str) -> String {
        format!("{}:node:{}", self.prefix, name)
    }

    /// Set holding the recorded children
    pub fn children(&self, name: &str) -> String {
        format!("{}:node:{}:children", self.prefix, name)
    }

    /// Secondary index on parent name
    pub fn parent(&self, parent: &str) -> String {
        format!("{}:parent:{}", self.prefix, parent)
    }
}

impl Default for KeySchema {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

/// [`NamespaceStore`] over a Redis server
pub struct RedisNamespaceStore {
    pool: RedisPool,
    keys: KeySchema,
}

impl RedisNamespaceStore {
    /// Connect using `config` and the default key prefix
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        Self::with_prefix(config, DEFAULT_KEY_PREFIX).await
    }

    /// Connect using `config` with all keys under `prefix`
    pub async fn with_prefix(
        config: RedisConfig,
        prefix: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let pool = RedisPool::new(config).await?;
        Ok(Self {
            pool,
            keys: KeySchema::new(prefix),
        })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    async fn run_pipeline(&self, pipe: redis::Pipeline) -> Result<Vec<Value>, StoreError> {
        self.pool
            .execute(|mut conn| {
                let pipe = pipe.clone();
                async move { pipe.query_async::<Vec<Value>>(&mut conn).await }
            })
            .await
    }

    async fn write_pipeline(&self, pipe: redis::Pipeline) -> Result<(), StoreError> {
        self.pool
            .execute(|mut conn| {
                let pipe = pipe.clone();
                async move { pipe.query_async::<()>(&mut conn).await }
            })
            .await
    }
}

/// Turn a node hash and its children set into a [`MetricNode`]
///
/// An empty hash means the record does not exist.
fn decode_node(
    name: &str,
    hash: &Value,
    children: &Value,
) -> Result<Option<MetricNode>, StoreError> {
    let corrupted = |reason: String| StoreError::CorruptedRecord {
        name: name.to_string(),
        reason,
    };

    let fields: HashMap<String, String> =
        redis::from_redis_value(hash).map_err(|e| corrupted(e.to_string()))?;
    if fields.is_empty() {
        return Ok(None);
    }
    let children: BTreeSet<String> =
        redis::from_redis_value(children).map_err(|e| corrupted(e.to_string()))?;

    let parent_name = fields
        .get(FIELD_PARENT)
        .cloned()
        .ok_or_else(|| corrupted("missing parent field".to_string()))?;
    let expiry = match fields.get(FIELD_EXPIRY) {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| corrupted(format!("expiry '{}' is not an integer", raw)))?,
        ),
        None => None,
    };

    Ok(Some(MetricNode {
        name: name.to_string(),
        parent_name,
        children,
        link_target: fields.get(FIELD_LINK).cloned(),
        expiry,
    }))
}

#[async_trait]
impl NamespaceStore for RedisNamespaceStore {
    fn store_id(&self) -> &str {
        "redis-namespace-v1"
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<MetricNode>, StoreError> {
        let mut nodes = self.get_by_names(&[name.to_string()]).await?;
        Ok(nodes.pop())
    }

    async fn get_by_parent(&self, parent: &str) -> Result<Vec<MetricNode>, StoreError> {
        let key = self.keys.parent(parent);
        let names: Vec<String> = self
            .pool
            .execute(|mut conn| {
                let key = key.clone();
                async move {
                    redis::cmd("SMEMBERS")
                        .arg(&key)
                        .query_async::<Vec<String>>(&mut conn)
                        .await
                }
            })
            .await?;

        if names.is_empty() {
            return Ok(Vec::new());
        }
        self.get_by_names(&names).await
    }

    async fn get_by_names(&self, names: &[String]) -> Result<Vec<MetricNode>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for name in names {
            pipe.cmd("HGETALL").arg(self.keys.node(name));
            pipe.cmd("SMEMBERS").arg(self.keys.children(name));
        }
        let values = self.run_pipeline(pipe).await?;
        if values.len() != names.len() * 2 {
            return Err(StoreError::CommandFailed(format!(
                "expected {} replies, got {}",
                names.len() * 2,
                values.len()
            )));
        }

        let mut nodes = Vec::with_capacity(names.len());
        for (name, pair) in names.iter().zip(values.chunks(2)) {
            if let Some(node) = decode_node(name, &pair[0], &pair[1])? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    async fn insert(&self, node: &MetricNode) -> Result<(), StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET")
            .arg(self.keys.node(&node.name))
            .arg(FIELD_PARENT)
            .arg(&node.parent_name)
            .ignore();
        if let Some(expiry) = node.expiry {
            pipe.cmd("HSET")
                .arg(self.keys.node(&node.name))
                .arg(FIELD_EXPIRY)
                .arg(expiry)
                .ignore();
        }
        pipe.cmd("SADD")
            .arg(self.keys.parent(&node.parent_name))
            .arg(&node.name)
            .ignore();

        self.write_pipeline(pipe).await?;
        debug!(name = %node.name, "Inserted namespace node");
        Ok(())
    }

    async fn set_children(
        &self,
        name: &str,
        children: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        let key = self.keys.children(name);
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("DEL").arg(&key).ignore();
        if !children.is_empty() {
            pipe.cmd("SADD").arg(&key).arg(children.iter().collect::<Vec<_>>()).ignore();
        }
        self.write_pipeline(pipe).await
    }

    async fn set_link(
        &self,
        name: &str,
        target: &str,
        children: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        let node_key = self.keys.node(name);
        let exists: bool = self
            .pool
            .execute(|mut conn| {
                let key = node_key.clone();
                async move { redis::cmd("EXISTS").arg(&key).query_async::<bool>(&mut conn).await }
            })
            .await?;
        if !exists {
            return Err(StoreError::CommandFailed(format!(
                "set_link on missing record '{}'",
                name
            )));
        }

        let children_key = self.keys.children(name);
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET").arg(&node_key).arg(FIELD_LINK).arg(target).ignore();
        pipe.cmd("DEL").arg(&children_key).ignore();
        if !children.is_empty() {
            pipe.cmd("SADD")
                .arg(&children_key)
                .arg(children.iter().collect::<Vec<_>>())
                .ignore();
        }
        self.write_pipeline(pipe).await
    }

    async fn delete_many(&self, names: &[String]) -> Result<(), StoreError> {
        if names.is_empty() {
            return Ok(());
        }

        let mut lookup = redis::pipe();
        for name in names {
            lookup.cmd("HGET").arg(self.keys.node(name)).arg(FIELD_PARENT);
        }
        let parents = self.run_pipeline(lookup).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (name, parent) in names.iter().zip(parents.iter()) {
            let parent: Option<String> =
                redis::from_redis_value(parent).map_err(|e| StoreError::CorruptedRecord {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            pipe.cmd("DEL")
                .arg(self.keys.node(name))
                .arg(self.keys.children(name))
                .ignore();
            if let Some(parent) = parent {
                pipe.cmd("SREM").arg(self.keys.parent(&parent)).arg(name).ignore();
            }
        }
        self.write_pipeline(pipe).await?;
        debug!(count = names.len(), "Deleted namespace nodes");
        Ok(())
    }
}
