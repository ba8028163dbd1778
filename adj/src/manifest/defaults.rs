//! Bundled default tables
//!
//! Used on first boot before a model-generated manifest exists, and as
//! the fallback when manifest generation returns unparseable output.

use std::collections::BTreeMap;

use super::{AgentType, Category, PromptTier};

fn category(id: &str, patterns: &[&str], agent_type: AgentType, prompt_tier: PromptTier) -> Category {
    let mut category = Category {
        id: id.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        tools: vec![],
        skills: vec![],
        agent_type,
        prompt_tier,
    };
    category.normalize_tools();
    category
}

/// The bundled category set
pub fn default_categories() -> Vec<Category> {
    vec![
        category(
            "file_operations",
            &[
                "create file|new file|make a file",
                "read file|open file|show file|cat",
                "write file|save file|edit file",
                "delete file|remove file",
                "list files|list directory|folder contents",
            ],
            AgentType::React,
            PromptTier::Minimal,
        ),
        category(
            "shell_command",
            &["run command|execute|run script", "install|update package"],
            AgentType::React,
            PromptTier::Minimal,
        ),
        category(
            "messaging",
            &["send sms|send text|text message", "send message|reply to"],
            AgentType::React,
            PromptTier::Standard,
        ),
        category(
            "email",
            &["send email|compose email|mail to", "check email|unread mail|inbox"],
            AgentType::React,
            PromptTier::Standard,
        ),
        category(
            "calendar",
            &[
                "schedule meeting|add event|calendar entry",
                "upcoming events|my schedule|agenda",
            ],
            AgentType::React,
            PromptTier::Standard,
        ),
        category(
            "reminders",
            &["remind me|set reminder|set a timer", "every day at|every week|recurring"],
            AgentType::React,
            PromptTier::Standard,
        ),
        category(
            "web_search",
            &["search for|look up|google", "find information about|what is the latest"],
            AgentType::React,
            PromptTier::Standard,
        ),
        category(
            "weather",
            &["weather|forecast|temperature outside", "will it rain|is it cold"],
            AgentType::React,
            PromptTier::Minimal,
        ),
        category(
            "system_info",
            &[
                "disk space|memory usage|cpu usage",
                "battery|network status|ip address",
            ],
            AgentType::React,
            PromptTier::Minimal,
        ),
        category(
            "notes",
            &["take a note|write down|jot down", "my notes|show notes"],
            AgentType::React,
            PromptTier::Minimal,
        ),
        category(
            "coding",
            &[
                "write code|fix bug|refactor",
                "run tests|build project|review code",
            ],
            AgentType::PlanExecute,
            PromptTier::Full,
        ),
        category(
            "research",
            &["research|compare|investigate|analyze|deep dive"],
            AgentType::Reflection,
            PromptTier::Full,
        ),
    ]
}

/// The bundled bash-shortcut table: intent pattern -> safe command
pub fn default_bash_commands() -> BTreeMap<String, String> {
    let entries = [
        ("uptime|how long running|system uptime", "uptime"),
        ("disk space|disk usage|free space", "df -h"),
        ("memory usage|free memory|ram usage", "free -h 2>/dev/null || vm_stat"),
        ("ip address|my ip|local ip", "hostname -I 2>/dev/null || ipconfig getifaddr en0"),
        ("top processes|cpu hogs|busiest processes", "ps aux | sort -nrk 3 | head -11"),
        ("kernel version|os version", "uname -a"),
        ("current directory|where am i", "pwd"),
        ("who is logged in|logged in users", "who"),
    ];
    entries
        .into_iter()
        .map(|(pattern, command)| (pattern.to_string(), command.to_string()))
        .collect()
}

/// Documentation-only instant-answer table: pattern -> answer type
pub fn default_instant_answers() -> BTreeMap<String, String> {
    let entries = [
        ("what time is it|current time|time in", "time"),
        ("what day is it|what date is it|today's date", "date"),
        ("hello|hi|hey|good morning|good evening", "greeting"),
        ("what can you do|capabilities|help", "capabilities"),
    ];
    entries
        .into_iter()
        .map(|(pattern, answer_type)| (pattern.to_string(), answer_type.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CAPABILITY_TOOL, SHELL_TOOL};

    #[test]
    fn test_default_categories_carry_required_tools() {
        for category in default_categories() {
            assert_eq!(category.tools.first().map(String::as_str), Some(SHELL_TOOL), "{}", category.id);
            assert_eq!(
                category.tools.last().map(String::as_str),
                Some(CAPABILITY_TOOL),
                "{}",
                category.id
            );
        }
    }

    #[test]
    fn test_default_category_count_in_band() {
        let count = default_categories().len();
        assert!((10..=20).contains(&count));
    }

    #[test]
    fn test_default_patterns_are_lowercase() {
        for category in default_categories() {
            for alternative in category.alternatives() {
                assert_eq!(alternative, alternative.to_lowercase());
            }
        }
    }

    #[test]
    fn test_bash_commands_include_uptime() {
        let commands = default_bash_commands();
        let key = commands.keys().find(|k| k.contains("uptime")).unwrap();
        assert_eq!(commands.get(key).unwrap(), "uptime");
    }
}
