//! Frequency-capping policy types and resolution.
//!
//! Merchants author capping rules in two places: per campaign
//! (`targetRules.enhancedTriggers.frequency_capping`) and store-wide
//! (`settings.frequencyCapping`). Both arrive as loosely-typed JSON from
//! the admin app; they are parsed exactly once here into versioned structs
//! and merged into one effective [`FrequencyPolicy`] per decision request.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Campaign-level frequency-capping rules (version 1).
///
/// All fields optional; an absent field means "unbounded" for that
/// dimension. Unknown fields in the source JSON are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrequencyRules {
    /// Configuration schema version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Max displays per (visitor, campaign, session).
    pub max_displays_per_session: Option<u32>,
    /// Max displays per (visitor, campaign) per UTC calendar day.
    pub max_displays_per_day: Option<u32>,
    /// Max displays per (visitor, campaign), lifetime.
    pub max_displays_per_visitor: Option<u32>,
    /// Minimum seconds between two displays to the same visitor.
    pub cooldown_seconds: Option<u32>,
}

impl FrequencyRules {
    /// Extract rules from a campaign's raw `targetRules` document.
    ///
    /// Returns `Ok(None)` when the document has no frequency-capping block;
    /// errors only when the block is present but malformed.
    pub fn from_target_rules(raw: &serde_json::Value) -> Result<Option<Self>> {
        let Some(block) = raw
            .get("enhancedTriggers")
            .and_then(|t| t.get("frequency_capping"))
        else {
            return Ok(None);
        };

        if block.is_null() {
            return Ok(None);
        }

        let rules: Self = serde_json::from_value(block.clone())
            .map_err(|e| Error::policy_malformed(format!("campaign frequency rules: {}", e)))?;
        Ok(Some(rules))
    }
}

/// Store-wide frequency-capping settings (version 1).
///
/// The store side carries the same per-campaign dimensions plus a
/// cross-campaign session ceiling no campaign can exceed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalFrequencyRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub max_displays_per_session: Option<u32>,
    pub max_displays_per_day: Option<u32>,
    pub max_displays_per_visitor: Option<u32>,
    pub cooldown_seconds: Option<u32>,
    /// Store-wide displays per session across ALL campaigns.
    pub max_displays_per_session_all_campaigns: Option<u32>,
}

impl GlobalFrequencyRules {
    /// Extract rules from a store's raw `settings` document.
    pub fn from_store_settings(raw: &serde_json::Value) -> Result<Option<Self>> {
        let Some(block) = raw.get("frequencyCapping") else {
            return Ok(None);
        };

        if block.is_null() {
            return Ok(None);
        }

        let rules: Self = serde_json::from_value(block.clone())
            .map_err(|e| Error::policy_malformed(format!("store frequency settings: {}", e)))?;
        Ok(Some(rules))
    }
}

/// Popup template kind, as carried on the campaign's `templateType`.
///
/// Some kinds are inherently one-shot: showing an announcement banner twice
/// to the same visitor is a merchant-facing bug regardless of configuration,
/// so those kinds declare a forced lifetime cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// One-shot announcement banner.
    Announcement,
    /// Email capture form.
    Newsletter,
    /// Discount / coupon offer.
    Discount,
    /// Gamified spin-to-win wheel.
    SpinToWin,
    /// Exit-intent offer.
    ExitIntent,
    /// Anything else.
    Standard,
}

impl TemplateKind {
    /// Parse the admin app's free-form template type string.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.contains("announcement") {
            Self::Announcement
        } else if lower.contains("newsletter") || lower.contains("email") {
            Self::Newsletter
        } else if lower.contains("discount") || lower.contains("coupon") {
            Self::Discount
        } else if lower.contains("spin") {
            Self::SpinToWin
        } else if lower.contains("exit") {
            Self::ExitIntent
        } else {
            Self::Standard
        }
    }

    /// Lifetime cap this template kind forces, if any.
    ///
    /// Declared per kind, never computed from configuration.
    pub fn forced_visitor_cap(&self) -> Option<u32> {
        match self {
            Self::Announcement => Some(1),
            _ => None,
        }
    }
}

impl Default for TemplateKind {
    fn default() -> Self {
        Self::Standard
    }
}

/// Effective frequency-capping policy for one decision request.
///
/// Derived per campaign+store, never persisted and never cached beyond the
/// surrounding request. `None` means "unbounded" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyPolicy {
    pub max_per_session: Option<u32>,
    pub max_per_day: Option<u32>,
    pub max_per_visitor: Option<u32>,
    pub cooldown_seconds: Option<u32>,
    /// Store-wide per-session ceiling across all campaigns.
    pub global_session_max: Option<u32>,
}

impl FrequencyPolicy {
    /// Fully unbounded policy.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The documented conservative fallback for malformed configuration:
    /// one display per session, everything else unbounded. Blocks abuse of
    /// a broken config without killing a legitimate campaign outright.
    pub fn conservative_default() -> Self {
        Self {
            max_per_session: Some(1),
            ..Self::default()
        }
    }

    /// True when no dimension is configured.
    pub fn is_unbounded(&self) -> bool {
        self.max_per_session.is_none()
            && self.max_per_day.is_none()
            && self.max_per_visitor.is_none()
            && self.cooldown_seconds.is_none()
            && self.global_session_max.is_none()
    }
}

/// Per-dimension merge: the tighter of two optional caps.
///
/// `None` is treated as unbounded, so a campaign cap can never loosen a
/// store cap and vice versa.
fn min_cap(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) => Some(x),
        (None, y) => y,
    }
}

/// Merge campaign rules, store settings, and the template override into one
/// effective policy.
///
/// Pure and idempotent: same inputs, same output, no side effects.
pub fn resolve(
    campaign: Option<&FrequencyRules>,
    store: Option<&GlobalFrequencyRules>,
    template: TemplateKind,
) -> FrequencyPolicy {
    let mut policy = FrequencyPolicy {
        max_per_session: min_cap(
            campaign.and_then(|c| c.max_displays_per_session),
            store.and_then(|s| s.max_displays_per_session),
        ),
        max_per_day: min_cap(
            campaign.and_then(|c| c.max_displays_per_day),
            store.and_then(|s| s.max_displays_per_day),
        ),
        max_per_visitor: min_cap(
            campaign.and_then(|c| c.max_displays_per_visitor),
            store.and_then(|s| s.max_displays_per_visitor),
        ),
        cooldown_seconds: {
            // Cooldown is a floor, not a ceiling: the stricter value is the LARGER one.
            let c = campaign.and_then(|c| c.cooldown_seconds);
            let s = store.and_then(|s| s.cooldown_seconds);
            match (c, s) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (Some(x), None) => Some(x),
                (None, y) => y,
            }
        },
        global_session_max: store.and_then(|s| s.max_displays_per_session_all_campaigns),
    };

    if let Some(forced) = template.forced_visitor_cap() {
        policy.max_per_visitor = min_cap(Some(forced), policy.max_per_visitor);
    }

    policy
}

/// Resolve from the raw JSON documents the admin app hands over.
///
/// Parses both sides through the typed structs; errors propagate so the
/// caller can fall back to [`FrequencyPolicy::conservative_default`] and
/// count the malformed config. Untyped JSON never travels past this point.
pub fn resolve_raw(
    target_rules: Option<&serde_json::Value>,
    store_settings: Option<&serde_json::Value>,
    template_type: Option<&str>,
) -> Result<FrequencyPolicy> {
    let campaign = match target_rules {
        Some(raw) => FrequencyRules::from_target_rules(raw)?,
        None => None,
    };
    let store = match store_settings {
        Some(raw) => GlobalFrequencyRules::from_store_settings(raw)?,
        None => None,
    };
    let template = template_type.map(TemplateKind::parse).unwrap_or_default();

    Ok(resolve(campaign.as_ref(), store.as_ref(), template))
}
