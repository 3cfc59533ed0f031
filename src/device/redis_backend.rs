//! Redis device directory backend.
//!
//! Layout (all keys under the configured prefix):
//! - `{prefix}:device:{type}:{id}` JSON-encoded [`Device`]
//! - `{prefix}:devices` set of every device member (`{type}:{id}`)
//! - `{prefix}:user:{user_id}` set of the user's device members
//! - `{prefix}:org:{organization_id}` set of entitled device members
//!
//! Organization updates for a device set commit through one script that
//! compares every device against the value it was planned from, so the set is
//! written as a whole or not at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use crate::redis::RedisPool;

use super::backend::{DirectoryBackend, DirectoryBackendType, DirectoryError};
use super::{Device, DeviceKey, DeviceType};

/// Attempts before a contended organization update gives up
const MAX_UPDATE_ATTEMPTS: usize = 5;

lazy_static! {
    /// KEYS: device keys, then the organization set.
    /// ARGV: `add` or `remove`, then per device: expected JSON, new JSON, set member.
    /// Returns 0 without writing if any device no longer matches.
    static ref UPDATE_ORGANIZATION: Script = Script::new(
        r#"
local n = #KEYS - 1
local org_key = KEYS[n + 1]
for i = 1, n do
  if redis.call('GET', KEYS[i]) ~= ARGV[3 * i - 1] then
    return 0
  end
end
for i = 1, n do
  redis.call('SET', KEYS[i], ARGV[3 * i])
  if ARGV[1] == 'add' then
    redis.call('SADD', org_key, ARGV[3 * i + 1])
  else
    redis.call('SREM', org_key, ARGV[3 * i + 1])
  end
end
return 1
"#
    );
}

/// One device write of a planned organization update
#[derive(Debug)]
struct OrganizationWrite {
    key: String,
    expected: String,
    updated: String,
    member: String,
    changed: bool,
}

pub struct RedisDirectoryBackend {
    pool: Arc<RedisPool>,
}

impl RedisDirectoryBackend {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, DirectoryError> {
        Ok(self.pool.get_connection().await?)
    }

    async fn on_error(&self, error: DirectoryError) -> DirectoryError {
        if let DirectoryError::Redis(ref e) = error {
            self.pool.reset_on_error(e).await;
        }
        error
    }

    fn device_key(&self, key: &DeviceKey) -> String {
        self.pool.key(&[
            "device",
            &key.device_type.code().to_string(),
            &key.device_id,
        ])
    }

    fn all_key(&self) -> String {
        self.pool.key(&["devices"])
    }

    fn user_key(&self, user_id: &str) -> String {
        self.pool.key(&["user", user_id])
    }

    fn org_key(&self, organization_id: &str) -> String {
        self.pool.key(&["org", organization_id])
    }

    async fn load(
        &self,
        conn: &mut MultiplexedConnection,
        key: &DeviceKey,
    ) -> Result<Option<Device>, DirectoryError> {
        let raw: Option<String> = conn.get(self.device_key(key)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(DirectoryError::from))
            .transpose()
    }

    async fn load_members(
        &self,
        conn: &mut MultiplexedConnection,
        set_key: String,
    ) -> Result<Vec<Device>, DirectoryError> {
        let members: BTreeSet<String> = conn.smembers(set_key).await?;
        let keys = members
            .iter()
            .map(|m| parse_member(m))
            .collect::<Result<Vec<_>, _>>()?;

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.get(self.device_key(key));
        }
        let values: Vec<Option<String>> = pipe.query_async(conn).await?;

        let mut devices = Vec::with_capacity(values.len());
        for json in values.into_iter().flatten() {
            devices.push(serde_json::from_str(&json)?);
        }
        Ok(devices)
    }

    async fn upsert_inner(&self, device: Device) -> Result<(), DirectoryError> {
        let mut conn = self.connection().await?;
        let key = device.key();
        let member = key.to_string();
        let previous = self.load(&mut conn, &key).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();

        if let Some(previous) = previous {
            if previous.user_id != device.user_id {
                pipe.srem(self.user_key(&previous.user_id), &member).ignore();
            }
            for org in previous.organization_ids.difference(&device.organization_ids) {
                pipe.srem(self.org_key(org), &member).ignore();
            }
        }

        pipe.set(self.device_key(&key), serde_json::to_string(&device)?)
            .ignore()
            .sadd(self.all_key(), &member)
            .ignore()
            .sadd(self.user_key(&device.user_id), &member)
            .ignore();
        for org in &device.organization_ids {
            pipe.sadd(self.org_key(org), &member).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn remove_inner(&self, key: &DeviceKey) -> Result<bool, DirectoryError> {
        let mut conn = self.connection().await?;
        let Some(device) = self.load(&mut conn, key).await? else {
            return Ok(false);
        };
        let member = key.to_string();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.device_key(key))
            .ignore()
            .srem(self.all_key(), &member)
            .ignore()
            .srem(self.user_key(&device.user_id), &member)
            .ignore();
        for org in &device.organization_ids {
            pipe.srem(self.org_key(org), &member).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(true)
    }

    async fn load_raw(
        &self,
        conn: &mut MultiplexedConnection,
        keys: &[DeviceKey],
    ) -> Result<Vec<Option<String>>, DirectoryError> {
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(self.device_key(key));
        }
        Ok(pipe.query_async(conn).await?)
    }

    /// Plan the writes adding or removing the organization on every stored device
    fn plan_organization_update(
        &self,
        keys: &[DeviceKey],
        raw: Vec<Option<String>>,
        organization_id: &str,
        add: bool,
    ) -> Result<Vec<OrganizationWrite>, DirectoryError> {
        let mut writes = Vec::with_capacity(keys.len());
        for (key, expected) in keys.iter().zip(raw) {
            let Some(expected) = expected else {
                continue;
            };
            let mut device: Device = serde_json::from_str(&expected)?;
            let changed = if add {
                device.organization_ids.insert(organization_id.to_string())
            } else {
                device.organization_ids.remove(organization_id)
            };
            writes.push(OrganizationWrite {
                key: self.device_key(key),
                expected,
                updated: serde_json::to_string(&device)?,
                member: key.to_string(),
                changed,
            });
        }
        Ok(writes)
    }

    async fn update_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
        add: bool,
    ) -> Result<usize, DirectoryError> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection().await?;
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let raw = self.load_raw(&mut conn, &keys).await?;
            let writes = self.plan_organization_update(&keys, raw, organization_id, add)?;
            if writes.is_empty() {
                return Ok(0);
            }

            let mut invocation = UPDATE_ORGANIZATION.prepare_invoke();
            for write in &writes {
                invocation.key(&write.key);
            }
            invocation
                .key(self.org_key(organization_id))
                .arg(if add { "add" } else { "remove" });
            for write in &writes {
                invocation
                    .arg(&write.expected)
                    .arg(&write.updated)
                    .arg(&write.member);
            }

            let applied: i32 = invocation.invoke_async(&mut conn).await?;
            if applied == 1 {
                return Ok(writes.iter().filter(|w| w.changed).count());
            }
            tracing::debug!(
                attempt = attempt,
                organization_id = %organization_id,
                "Devices changed during organization update, retrying"
            );
        }

        Err(DirectoryError::Contended(format!(
            "organization {} update gave up after {} attempts",
            organization_id, MAX_UPDATE_ATTEMPTS
        )))
    }
}

/// Parse a set member of the form `{type}:{id}`
fn parse_member(member: &str) -> Result<DeviceKey, DirectoryError> {
    let (code, id) = member
        .split_once(':')
        .ok_or_else(|| DirectoryError::Corrupt(member.to_string()))?;
    let code: u8 = code
        .parse()
        .map_err(|_| DirectoryError::Corrupt(member.to_string()))?;
    let device_type = DeviceType::try_from(code).map_err(DirectoryError::Corrupt)?;
    Ok(DeviceKey::new(id, device_type))
}

#[async_trait]
impl DirectoryBackend for RedisDirectoryBackend {
    fn backend_type(&self) -> DirectoryBackendType {
        DirectoryBackendType::Redis
    }

    async fn upsert(&self, device: Device) -> Result<(), DirectoryError> {
        match self.upsert_inner(device).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn remove(&self, key: &DeviceKey) -> Result<bool, DirectoryError> {
        match self.remove_inner(key).await {
            Ok(existed) => Ok(existed),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn get(&self, key: &DeviceKey) -> Result<Option<Device>, DirectoryError> {
        let mut conn = self.connection().await?;
        match self.load(&mut conn, key).await {
            Ok(device) => Ok(device),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn add_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<usize, DirectoryError> {
        match self.update_organization(keys, organization_id, true).await {
            Ok(n) => Ok(n),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn remove_organization(
        &self,
        keys: &[DeviceKey],
        organization_id: &str,
    ) -> Result<usize, DirectoryError> {
        match self.update_organization(keys, organization_id, false).await {
            Ok(n) => Ok(n),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn find_all(&self) -> Result<Vec<Device>, DirectoryError> {
        let mut conn = self.connection().await?;
        match self.load_members(&mut conn, self.all_key()).await {
            Ok(devices) => Ok(devices),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Device>, DirectoryError> {
        let mut conn = self.connection().await?;
        match self.load_members(&mut conn, self.user_key(user_id)).await {
            Ok(devices) => Ok(devices),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn find_by_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Device>, DirectoryError> {
        let mut conn = self.connection().await?;
        match self.load_members(&mut conn, self.org_key(organization_id)).await {
            Ok(devices) => Ok(devices),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn count(&self) -> Result<usize, DirectoryError> {
        let mut conn = self.connection().await?;
        let count: usize = conn.scard(self.all_key()).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_parse_member() {
        let key = parse_member("1:abc:def").unwrap();
        assert_eq!(key.device_type, DeviceType::IOS);
        assert_eq!(key.device_id, "abc:def");
        assert_eq!(key.to_string(), "1:abc:def");

        assert!(parse_member("no-separator").is_err());
        assert!(parse_member("99:abc").is_err());
    }

    #[test]
    fn test_key_layout() {
        let pool = Arc::new(RedisPool::new(&RedisConfig::default()).unwrap());
        let backend = RedisDirectoryBackend::new(pool);
        let key = DeviceKey::new("I1_D1", DeviceType::Android);

        assert_eq!(backend.device_key(&key), "ara:push:device:0:I1_D1");
        assert_eq!(backend.user_key("I1_U1"), "ara:push:user:I1_U1");
        assert_eq!(backend.org_key("I1_O1"), "ara:push:org:I1_O1");
        assert_eq!(backend.all_key(), "ara:push:devices");
    }

    fn stored_device(id: &str, organizations: &[&str]) -> String {
        let device = Device {
            id: id.to_string(),
            device_type: DeviceType::IOS,
            push_token: Some("token".to_string()),
            user_id: "U1".to_string(),
            identifier: None,
            installation_id: None,
            organization_ids: organizations.iter().map(|o| o.to_string()).collect(),
            updated_at: chrono::Utc::now(),
        };
        serde_json::to_string(&device).unwrap()
    }

    #[test]
    fn test_plan_organization_update() {
        let pool = Arc::new(RedisPool::new(&RedisConfig::default()).unwrap());
        let backend = RedisDirectoryBackend::new(pool);
        let keys = vec![
            DeviceKey::new("D1", DeviceType::IOS),
            DeviceKey::new("D2", DeviceType::IOS),
            DeviceKey::new("gone", DeviceType::IOS),
        ];
        let d1 = stored_device("D1", &[]);
        let d2 = stored_device("D2", &["O1"]);
        let raw = vec![Some(d1.clone()), Some(d2.clone()), None];

        let writes = backend
            .plan_organization_update(&keys, raw.clone(), "O1", true)
            .unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].key, "ara:push:device:1:D1");
        assert_eq!(writes[0].member, "1:D1");
        assert_eq!(writes[0].expected, d1);
        assert!(writes[0].changed);
        assert!(!writes[1].changed);
        let updated: Device = serde_json::from_str(&writes[0].updated).unwrap();
        assert!(updated.organization_ids.contains("O1"));

        let writes = backend
            .plan_organization_update(&keys, raw, "O1", false)
            .unwrap();
        assert_eq!(writes.iter().filter(|w| w.changed).count(), 1);
        assert_eq!(writes[1].expected, d2);
        let updated: Device = serde_json::from_str(&writes[1].updated).unwrap();
        assert!(updated.organization_ids.is_empty());
    }
}
