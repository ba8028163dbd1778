//! Synonym normalization table
//!
//! A fixed bidirectional table: the canonical term and each alternative
//! all normalize to the canonical key, so "make a file" and "create a
//! file" produce the same token stream.

use std::collections::HashMap;
use std::sync::LazyLock;

const GROUPS: &[(&str, &[&str])] = &[
    ("create", &["make", "build", "generate", "new", "add", "compose"]),
    ("delete", &["remove", "erase", "drop", "trash", "discard"]),
    ("show", &["display", "list", "view", "print", "see"]),
    ("find", &["search", "locate", "lookup", "query", "grep"]),
    ("send", &["deliver", "dispatch", "transmit"]),
    ("run", &["execute", "launch", "invoke"]),
    ("update", &["modify", "change", "edit", "revise"]),
    ("check", &["verify", "inspect", "test"]),
    ("get", &["fetch", "retrieve", "download", "pull", "grab"]),
    ("stop", &["halt", "kill", "terminate", "cancel"]),
    ("open", &["load", "start"]),
    ("message", &["sms", "text", "dm"]),
    ("mail", &["email", "inbox"]),
    ("schedule", &["calendar", "appointment", "meeting", "event"]),
    ("remind", &["reminder", "alert", "notify"]),
    ("file", &["document", "doc"]),
    ("folder", &["directory", "dir"]),
];

static CANONICAL: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (canonical, alternatives) in GROUPS {
        map.insert(*canonical, *canonical);
        for alternative in *alternatives {
            map.insert(*alternative, *canonical);
        }
    }
    map
});

/// Normalize a lowercase token to its canonical synonym, if it has one
pub fn canonical(token: &str) -> Option<&'static str> {
    CANONICAL.get(token).copied()
}
