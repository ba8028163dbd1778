//! Tier 1 - bash shortcuts
//!
//! Fixed pattern -> command mappings from the manifest. Multi-word
//! alternatives match by substring containment; single-word alternatives
//! need a whole-word hit so "free" cannot fire inside "freedom".

use std::collections::BTreeMap;

/// Find the first bash shortcut whose pattern matches the input
pub fn match_shortcut<'a>(input: &str, bash_commands: &'a BTreeMap<String, String>) -> Option<&'a str> {
    let input_lower = input.trim().to_lowercase();
    let words: Vec<&str> = input_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    for (pattern, command) in bash_commands {
        for alternative in pattern.split('|').map(str::trim).filter(|a| !a.is_empty()) {
            let hit = if alternative.contains(' ') {
                input_lower.contains(alternative)
            } else {
                words.contains(&alternative)
            };
            if hit {
                return Some(command);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            "uptime|how long running|system uptime".to_string(),
            "uptime".to_string(),
        );
        map.insert("disk space|disk usage".to_string(), "df -h".to_string());
        map.insert("free memory|memory usage".to_string(), "free -h".to_string());
        map
    }

    #[test]
    fn test_single_word_needs_word_boundary() {
        let commands = commands();
        assert_eq!(match_shortcut("uptime", &commands), Some("uptime"));
        assert_eq!(match_shortcut("show uptime please", &commands), Some("uptime"));
        // "uptime" inside another word must not fire
        assert_eq!(match_shortcut("uptimes are great", &commands), None);
    }

    #[test]
    fn test_multi_word_substring() {
        let commands = commands();
        assert_eq!(match_shortcut("how much disk space is left", &commands), Some("df -h"));
        assert_eq!(match_shortcut("how long running", &commands), Some("uptime"));
    }

    #[test]
    fn test_multi_word_partial_does_not_fire() {
        let commands = commands();
        assert_eq!(match_shortcut("disk is spinning", &commands), None);
    }

    #[test]
    fn test_case_insensitive() {
        let commands = commands();
        assert_eq!(match_shortcut("Disk Space?", &commands), Some("df -h"));
    }

    #[test]
    fn test_no_match() {
        let commands = commands();
        assert_eq!(match_shortcut("write a poem", &commands), None);
    }
}
