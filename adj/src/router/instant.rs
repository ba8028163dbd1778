//! Tier 0 - instant answers
//!
//! A fixed table of strict, anchored regexes mapped to answer generators.
//! Patterns are full-intent matches so short words cannot fire inside
//! longer ones ("time" must never fire for "uptime").

use std::sync::LazyLock;

use chrono::{FixedOffset, Local, Utc};
use regex::Regex;

use crate::manifest::Manifest;

/// Fixed product identity used by the greeting generator
const GREETING: &str = "Hello! I'm Adjutant, your automation assistant. \
                        I can run commands, watch your mail and calendar, and schedule tasks. \
                        Ask me what I can do to see the full list.";

/// What kind of instant answer a pattern produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstantKind {
    Time,
    Date,
    Greeting,
    Capabilities,
}

struct InstantPattern {
    regex: Regex,
    kind: InstantKind,
}

static PATTERNS: LazyLock<Vec<InstantPattern>> = LazyLock::new(|| {
    let table: &[(&str, InstantKind)] = &[
        (
            r"^(?:what time is it|what's the time|what is the time|current time|time)(?:\s+in\s+(?P<city>[a-z][a-z .]*?))?\s*\??$",
            InstantKind::Time,
        ),
        (
            r"^(?:what day is it|what date is it|what's the date|what is the date|today's date|current date)\s*\??$",
            InstantKind::Date,
        ),
        (
            r"^(?:hello|hi|hey|good morning|good afternoon|good evening|howdy)[!. ]*$",
            InstantKind::Greeting,
        ),
        (
            r"^(?:what can you do|what are your capabilities|capabilities|list capabilities|help)\s*\??$",
            InstantKind::Capabilities,
        ),
    ];
    table
        .iter()
        .map(|(pattern, kind)| InstantPattern {
            regex: Regex::new(pattern).expect("instant pattern compiles"),
            kind: *kind,
        })
        .collect()
});

/// Fixed city -> UTC offset table, in minutes
///
/// Good enough for a spoken answer; no DST database on purpose.
const CITY_OFFSETS: &[(&str, i32)] = &[
    ("london", 0),
    ("paris", 60),
    ("berlin", 60),
    ("madrid", 60),
    ("rome", 60),
    ("athens", 120),
    ("moscow", 180),
    ("dubai", 240),
    ("mumbai", 330),
    ("delhi", 330),
    ("singapore", 480),
    ("beijing", 480),
    ("hong kong", 480),
    ("tokyo", 540),
    ("seoul", 540),
    ("sydney", 600),
    ("auckland", 720),
    ("new york", -300),
    ("boston", -300),
    ("toronto", -300),
    ("chicago", -360),
    ("denver", -420),
    ("san francisco", -480),
    ("los angeles", -480),
    ("seattle", -480),
    ("honolulu", -600),
];

/// Match an input against the instant table and generate the answer
///
/// The input is matched case-insensitively and trimmed. The capabilities
/// answer renders the manifest's skill and tool indexes when a manifest
/// is loaded.
pub fn match_instant(input: &str, manifest: Option<&Manifest>) -> Option<String> {
    let normalized = input.trim().to_lowercase();

    for pattern in PATTERNS.iter() {
        let Some(captures) = pattern.regex.captures(&normalized) else {
            continue;
        };
        let answer = match pattern.kind {
            InstantKind::Time => {
                let city = captures.name("city").map(|m| m.as_str().trim());
                time_answer(city)
            }
            InstantKind::Date => date_answer(),
            InstantKind::Greeting => GREETING.to_string(),
            InstantKind::Capabilities => capabilities_answer(manifest),
        };
        return Some(answer);
    }
    None
}

fn time_answer(city: Option<&str>) -> String {
    match city.and_then(city_offset) {
        Some((name, offset_minutes)) => {
            let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or(FixedOffset::east_opt(0).unwrap());
            let now = Utc::now().with_timezone(&offset);
            format!(
                "The current time in {} is {}",
                title_case(name),
                now.format("%A %H:%M")
            )
        }
        None => {
            let now = Local::now();
            format!("The current time is {}", now.format("%A %H:%M"))
        }
    }
}

fn date_answer() -> String {
    let now = Local::now();
    format!("Today is {}", now.format("%A, %B %e, %Y"))
}

fn capabilities_answer(manifest: Option<&Manifest>) -> String {
    let Some(manifest) = manifest else {
        return "I can run shell commands and look up my own capabilities; \
                the full capability index has not been generated yet."
            .to_string();
    };

    let mut lines = vec!["Here's what I can do.".to_string(), String::new(), "Skills:".to_string()];
    if manifest.skill_index.is_empty() {
        lines.push("  (none registered)".to_string());
    }
    for (name, description) in &manifest.skill_index {
        lines.push(format!("  - {name}: {description}"));
    }
    lines.push(String::new());
    lines.push("Tools:".to_string());
    for (name, description) in &manifest.tool_index {
        lines.push(format!("  - {name}: {description}"));
    }
    lines.join("\n")
}

fn city_offset(city: &str) -> Option<(&'static str, i32)> {
    CITY_OFFSETS
        .iter()
        .find(|(name, _)| *name == city)
        .map(|(name, offset)| (*name, *offset))
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
