use sqlx::FromRow;

use crate::domain::{Binding, Tier};
use crate::{Error, Result};

#[derive(Debug, Clone, FromRow)]
pub struct CreatorBindingDbModel {
    pub creator_id: String,
    pub platform: String,
    pub account_ref: String,
    pub tier: String,
    pub enabled: bool,
    /// Unix epoch milliseconds (UTC).
    pub created_at: i64,
}

impl CreatorBindingDbModel {
    pub fn into_binding(self) -> Result<Binding> {
        let platform = self
            .platform
            .parse()
            .map_err(|_| Error::validation(format!("unknown platform '{}'", self.platform)))?;
        let tier = Tier::parse(&self.tier)
            .ok_or_else(|| Error::validation(format!("unknown tier '{}'", self.tier)))?;
        Ok(Binding::new(self.creator_id, platform, self.account_ref, tier))
    }
}
