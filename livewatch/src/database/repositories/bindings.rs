//! Sources of the binding roster the scheduler polls.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::Result;
use crate::database::DbPool;
use crate::database::models::CreatorBindingDbModel;
use crate::database::time::now_ms;
use crate::domain::Binding;

#[async_trait]
pub trait BindingSource: Send + Sync {
    /// Snapshot of every binding that should currently be polled.
    async fn load_active(&self) -> Result<Vec<Binding>>;
}

/// Reads enabled rows of `creator_bindings`.
pub struct SqlxBindingSource {
    pool: DbPool,
}

impl SqlxBindingSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a binding. Used by seeding and tests; the monitor never writes here.
    pub async fn upsert(&self, binding: &Binding, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO creator_bindings (creator_id, platform, account_ref, tier, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(creator_id, platform) DO UPDATE SET
                account_ref = excluded.account_ref,
                tier = excluded.tier,
                enabled = excluded.enabled
            "#,
        )
        .bind(&binding.creator_id)
        .bind(binding.platform.as_str())
        .bind(&binding.account_ref)
        .bind(binding.tier.as_str())
        .bind(enabled)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BindingSource for SqlxBindingSource {
    async fn load_active(&self) -> Result<Vec<Binding>> {
        let rows = sqlx::query_as::<_, CreatorBindingDbModel>(
            "SELECT * FROM creator_bindings WHERE enabled = 1 ORDER BY creator_id, platform",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut bindings = Vec::with_capacity(rows.len());
        for row in rows {
            let id = format!("{}/{}", row.creator_id, row.platform);
            match row.into_binding() {
                Ok(binding) => bindings.push(binding),
                Err(e) => tracing::warn!(binding = %id, error = %e, "Skipping invalid binding row"),
            }
        }
        Ok(bindings)
    }
}

/// A fixed roster that can be swapped at runtime.
#[derive(Debug, Default)]
pub struct StaticBindingSource {
    bindings: RwLock<Vec<Binding>>,
}

impl StaticBindingSource {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self {
            bindings: RwLock::new(bindings),
        }
    }

    pub fn set(&self, bindings: Vec<Binding>) {
        *self.bindings.write() = bindings;
    }
}

#[async_trait]
impl BindingSource for StaticBindingSource {
    async fn load_active(&self) -> Result<Vec<Binding>> {
        Ok(self.bindings.read().clone())
    }
}
