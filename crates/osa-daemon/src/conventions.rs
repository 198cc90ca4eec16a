//! Config-backed convention store.
//!
//! Conventions on this node are declared in the layered config; the store
//! resolves them entirely in memory.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use osa_config::AppConfig;
use osa_handlers::ports::{Convention, ConventionStore};
use osa_types::Srn;

pub struct ConfigConventionStore {
    by_srn: BTreeMap<String, Convention>,
}

impl ConfigConventionStore {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut by_srn = BTreeMap::new();
        for (srn_text, entry) in &config.conventions {
            let srn: Srn = srn_text.parse()?;
            by_srn.insert(
                srn_text.clone(),
                Convention {
                    srn,
                    hooks: entry.hooks.clone(),
                },
            );
        }
        Ok(Self { by_srn })
    }

    pub fn conventions(&self) -> impl Iterator<Item = &Convention> {
        self.by_srn.values()
    }
}

#[async_trait]
impl ConventionStore for ConfigConventionStore {
    async fn get(&self, srn: &Srn) -> Result<Option<Convention>> {
        Ok(self.by_srn.get(&srn.to_string()).cloned())
    }
}
