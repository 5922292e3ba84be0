// ── Cookielens Atoms: Classification Types ─────────────────────────────────
// Entities moved through the classifier pipeline and the cookie store.
// Plain data only; persistence and wire handling live in engine/.

use serde::{Deserialize, Serialize};

use crate::atoms::constants::DEFAULT_CONFIDENCE;

// ── Category / privacy / source enums ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CookieCategory {
    Essential,
    Analytics,
    Advertising,
    Functional,
    Performance,
    SocialMedia,
    Security,
    Personalization,
    Unknown,
}

impl CookieCategory {
    /// Stable text form used in the store and in LM replies.
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieCategory::Essential => "Essential",
            CookieCategory::Analytics => "Analytics",
            CookieCategory::Advertising => "Advertising",
            CookieCategory::Functional => "Functional",
            CookieCategory::Performance => "Performance",
            CookieCategory::SocialMedia => "SocialMedia",
            CookieCategory::Security => "Security",
            CookieCategory::Personalization => "Personalization",
            CookieCategory::Unknown => "Unknown",
        }
    }

    /// Tolerant parse: unrecognized or missing input maps to `Unknown`.
    pub fn parse(s: &str) -> CookieCategory {
        match s.trim().to_ascii_lowercase().as_str() {
            "essential" | "necessary" => CookieCategory::Essential,
            "analytics" => CookieCategory::Analytics,
            "advertising" | "marketing" => CookieCategory::Advertising,
            "functional" => CookieCategory::Functional,
            "performance" => CookieCategory::Performance,
            "socialmedia" | "social media" | "social" => CookieCategory::SocialMedia,
            "security" => CookieCategory::Security,
            "personalization" | "personalisation" => CookieCategory::Personalization,
            _ => CookieCategory::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivacyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Low => "Low",
            PrivacyLevel::Medium => "Medium",
            PrivacyLevel::High => "High",
            PrivacyLevel::Critical => "Critical",
        }
    }

    /// Tolerant parse; defaults to `Medium`.
    pub fn parse(s: &str) -> PrivacyLevel {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => PrivacyLevel::Low,
            "high" => PrivacyLevel::High,
            "critical" => PrivacyLevel::Critical,
            _ => PrivacyLevel::Medium,
        }
    }
}

/// Where a descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorSource {
    Ai,
    Manual,
    Imported,
    Pattern,
}

impl DescriptorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorSource::Ai => "ai",
            DescriptorSource::Manual => "manual",
            DescriptorSource::Imported => "imported",
            DescriptorSource::Pattern => "pattern",
        }
    }

    pub fn parse(s: &str) -> DescriptorSource {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => DescriptorSource::Manual,
            "imported" => DescriptorSource::Imported,
            "pattern" => DescriptorSource::Pattern,
            _ => DescriptorSource::Ai,
        }
    }
}

// ── Descriptor ─────────────────────────────────────────────────────────────

/// Classification record about one cookie name, independent of any analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub vendor: String,
    pub category: CookieCategory,
    pub purpose: String,
    pub privacy: PrivacyLevel,
    pub third_party: bool,
    pub typical_expiration: String,
    pub common_domains: Vec<String>,
    pub notes: String,
    /// Classification confidence in `[0, 1]`.
    pub confidence: f64,
    pub source: DescriptorSource,
    /// RFC-3339 timestamps.
    pub created_at: String,
    pub updated_at: String,
}

impl Descriptor {
    /// A blank descriptor for `name`, ready to be filled in.
    pub fn unknown(name: impl Into<String>) -> Descriptor {
        let now = chrono::Utc::now().to_rfc3339();
        Descriptor {
            name: name.into(),
            vendor: String::new(),
            category: CookieCategory::Unknown,
            purpose: String::new(),
            privacy: PrivacyLevel::Medium,
            third_party: false,
            typical_expiration: String::new(),
            common_domains: Vec::new(),
            notes: String::new(),
            confidence: DEFAULT_CONFIDENCE,
            source: DescriptorSource::Ai,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

// ── Tasks ──────────────────────────────────────────────────────────────────

/// Submission priority. `Manual` (bulk history replays and editor actions)
/// outranks `Auto` (passive traffic capture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskPriority {
    Manual,
    Auto,
}

/// One unit of classification work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyTask {
    pub cookie_name: String,
    pub domain: String,
    pub priority: TaskPriority,
    /// Skip the store check exactly once and re-ask the LM.
    pub force_refresh: bool,
    /// RFC-3339 submission timestamp.
    pub submitted_at: String,
}

impl ClassifyTask {
    pub fn new(cookie_name: impl Into<String>, domain: impl Into<String>, priority: TaskPriority) -> Self {
        ClassifyTask {
            cookie_name: cookie_name.into(),
            domain: domain.into(),
            priority,
            force_refresh: false,
            submitted_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Deduplication identity: tasks with equal identity collapse to one.
    pub fn identity(&self) -> String {
        format!("{}|{}", self.cookie_name, self.domain)
    }
}
