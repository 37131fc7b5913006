//! Per-partner settings.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::id::PartnerId;
use crate::port::outbound::partner::PartnerConfig;

/// One `[[partners]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PartnerSettings {
    pub id: String,
    /// Keep the partner out of initialization and routing.
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl PartnerSettings {
    pub fn partner_id(&self) -> PartnerId {
        PartnerId::new(self.id.clone())
    }

    /// Set-up payload for the adapter.
    pub fn to_partner_config(&self) -> PartnerConfig {
        PartnerConfig {
            partner: self.partner_id(),
            credentials: self.credentials.clone(),
        }
    }
}
