//! Scenario files describing the simulated collaborators.
//!
//! ```toml
//! [card]
//! can = "123123"
//! pin = "123456"
//! pin_retries = 3
//! tag_lost_on_signature = 2
//!
//! [idp]
//! paired_profiles = ["Anna"]
//!
//! [idp.failure]
//! stage = "after_handshake"
//! status = 400
//! body = '{"gematik_code":"2020"}'
//!
//! [secure_element]
//! fail_key_generation = false
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub card: CardScenario,
    pub idp: IdpScenario,
    pub secure_element: SecureElementScenario,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CardScenario {
    /// No card ever enters the field.
    pub absent: bool,
    /// Delay before the card is discovered.
    #[serde(with = "humantime_serde")]
    pub discovery_delay: Option<Duration>,
    pub can: String,
    pub pin: String,
    /// PIN attempts left before the card blocks, at most 3.
    pub pin_retries: u8,
    /// Hex-encoded certificate; a fixed dummy if unset.
    pub certificate: Option<String>,
    /// 1-based signature on which the tag leaves the field.
    pub tag_lost_on_signature: Option<usize>,
}

impl Default for CardScenario {
    fn default() -> Self {
        Self {
            absent: false,
            discovery_delay: None,
            can: "123123".to_string(),
            pin: "123456".to_string(),
            pin_retries: 3,
            certificate: None,
            tag_lost_on_signature: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdpScenario {
    /// Latency of every remote call.
    #[serde(with = "humantime_serde")]
    pub latency: Option<Duration>,
    /// Profiles with a paired secure-element key.
    pub paired_profiles: Vec<String>,
    pub failure: Option<IdpFailure>,
    pub insurance_conflict: Option<InsuranceConflict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    BeforeHandshake,
    AfterHandshake,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdpFailure {
    pub stage: FailureStage,
    pub status: u16,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsuranceConflict {
    #[serde(default)]
    pub in_active_profile: bool,
    pub profile_name: String,
    pub insurance_identifier: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecureElementScenario {
    pub fail_key_generation: bool,
    /// Biometrics are locked out or the key was invalidated.
    pub user_not_authenticated: bool,
}
