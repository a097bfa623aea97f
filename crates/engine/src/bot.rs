//! Bot and validity heuristics.
//!
//! Two tiers with different costs and consequences:
//! - the synchronous screen (`is_obvious_bot`) runs before the counter
//!   increment so crawlers cannot exhaust legitimate caps;
//! - the full classification (`classify`) runs in the spawned event task
//!   and only flags the impression for analytics exclusion.
//!
//! Flagged events are always written, never dropped.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use regex::RegexSet;
use std::collections::HashMap;
use woothee::parser::Parser;

/// Known bot user-agent fragments, beyond what woothee classifies.
const BOT_UA_PATTERNS: &[&str] = &[
    r"(?i)bot\b",
    r"(?i)crawl",
    r"(?i)spider",
    r"(?i)scrape",
    r"(?i)headless",
    r"(?i)phantomjs",
    r"(?i)lighthouse",
    r"(?i)pingdom",
    r"(?i)curl/",
    r"(?i)wget/",
    r"(?i)python-requests",
];

/// Visitor ids shorter than this cannot come from the storefront SDK,
/// which issues 16+ character identifiers.
const MIN_VISITOR_ID_LEN: usize = 8;

/// Per-key display count within a fixed sliding window.
struct VelocityWindow {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Tracks recent display velocity per visitor and per IP.
struct VelocityTracker {
    window: Duration,
    entries: Mutex<HashMap<String, VelocityWindow>>,
}

impl VelocityTracker {
    fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::seconds(window_secs as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record one display for `key`; returns the count within the current
    /// window including this one.
    fn observe(&self, key: &str, now: DateTime<Utc>) -> u32 {
        let mut entries = self.entries.lock();

        // Opportunistic prune so the map cannot grow without bound.
        if entries.len() > 100_000 {
            let window = self.window;
            entries.retain(|_, w| now - w.started_at <= window);
        }

        let entry = entries.entry(key.to_string()).or_insert(VelocityWindow {
            started_at: now,
            count: 0,
        });

        if now - entry.started_at > self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        entry.count += 1;
        entry.count
    }
}

/// Lightweight bot/validity filter.
pub struct BotFilter {
    parser: Parser,
    patterns: RegexSet,
    velocity: VelocityTracker,
    velocity_max: u32,
}

impl BotFilter {
    pub fn new(velocity_window_secs: u64, velocity_max: u32) -> Self {
        Self {
            parser: Parser::new(),
            patterns: RegexSet::new(BOT_UA_PATTERNS).expect("bot UA patterns are valid regexes"),
            velocity: VelocityTracker::new(velocity_window_secs),
            velocity_max,
        }
    }

    /// Cheap pre-increment screen: UA-identified crawlers and junk visitor
    /// ids. No I/O, no velocity state.
    pub fn is_obvious_bot(&self, visitor_id: &str, user_agent: Option<&str>) -> bool {
        if !Self::visitor_id_plausible(visitor_id) {
            return true;
        }

        let Some(ua) = user_agent else {
            return false;
        };
        if ua.is_empty() {
            return false;
        }

        if self.patterns.is_match(ua) {
            return true;
        }

        matches!(self.parser.parse(ua), Some(result) if result.category == "crawler")
    }

    /// Record a display for velocity tracking; returns the larger of the
    /// visitor-keyed and IP-keyed counts in the current window.
    pub fn observe(&self, visitor_id: &str, ip_address: Option<&str>, now: DateTime<Utc>) -> u32 {
        let by_visitor = self.velocity.observe(visitor_id, now);
        let by_ip = match ip_address {
            Some(ip) if !ip.is_empty() => self.velocity.observe(ip, now),
            _ => 0,
        };
        by_visitor.max(by_ip)
    }

    /// Full classification for the durable record.
    pub fn classify(&self, visitor_id: &str, user_agent: Option<&str>, velocity: u32) -> bool {
        self.is_obvious_bot(visitor_id, user_agent) || velocity > self.velocity_max
    }

    /// Device category from the user agent, when the storefront did not
    /// supply one. woothee categories map to our convention:
    /// pc → desktop, smartphone/mobilephone → mobile, crawler → bot.
    pub fn device_type(&self, user_agent: Option<&str>) -> &'static str {
        let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
            return "unknown";
        };

        match self.parser.parse(ua) {
            Some(result) => match result.category {
                "pc" => "desktop",
                "smartphone" | "mobilephone" => "mobile",
                "crawler" => "bot",
                "appliance" => "other",
                _ => "unknown",
            },
            None => "unknown",
        }
    }

    fn visitor_id_plausible(visitor_id: &str) -> bool {
        visitor_id.len() >= MIN_VISITOR_ID_LEN
            && visitor_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}
