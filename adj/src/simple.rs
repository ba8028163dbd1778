//! Simple-task agent - on-device execute-and-format
//!
//! The cheap path for bash-only requests: ask the small model for at most
//! two commands, run them, and ask the small model to format the output.
//! Anything that smells larger than that bails out to the main agent, and
//! a fixed danger list keeps destructive commands from ever running.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::LazyLock;

use eyre::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::capability::{CAPABILITY_TOOL, SHELL_TOOL, Skill};
use crate::exec::{ShellResult, ShellRunner};
use crate::ledger::Purpose;
use crate::manifest::{AgentType, PromptTier};
use crate::model::ModelFabric;
use crate::router::RouteAnalysis;

/// Output budget for the plain path; one byte more bails out
pub const MAX_OUTPUT_CHARS: usize = 4_000;

/// Output budget for the skill-parameterized path
const SKILL_MAX_OUTPUT_CHARS: usize = 20_000;

/// Maximum commands per plan
const MAX_COMMANDS: usize = 2;

const PLAN_INSTRUCTIONS: &str = "Output only bash commands, one per line, max 2. \
                                 No commentary, no markdown, no explanations.";

const PLAN_VERBATIM_INSTRUCTIONS: &str = "The commands below are already filled in. \
                                          Output them verbatim, one per line, max 2. \
                                          No commentary, no markdown.";

const FORMAT_INSTRUCTIONS: &str = "Format the command output as a direct answer for the user. \
                                   Prefer markdown. Preserve numbers and key data exactly.";

const EXTRACT_INSTRUCTIONS: &str = "Reply with the requested value only. \
                                    No quotes, no punctuation, no explanation.";

/// Commands that must never run, regardless of what the model emits
static DANGER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Destructive rm: recursive or force flags, or sudo rm of any kind
        r"\brm\s+(-\w*\s+)*-\w*[rf]",
        r"\bsudo\s+rm\b",
        // Filesystem creation and raw block-device writes
        r"\bmkfs\b",
        r"\bdd\b[^|]*\bof=/dev/(sd|hd|disk|nvme)",
        r">\s*/dev/(sd|hd|disk|nvme)",
        // The classic fork bomb
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        // World-writable root
        r"\bchmod\b.*777\s+/(\s|$)",
        // Disk formatting
        r"^\s*format\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("danger pattern compiles"))
    .collect()
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Z_][A-Z0-9_]*)\}\}|\$\{([A-Z_][A-Z0-9_]*)\}|\{([A-Z_][A-Z0-9_]*)\}")
        .expect("placeholder pattern compiles")
});

/// Commands whose arguments are URLs, for placeholder encoding
const URL_COMMANDS: &[&str] = &["curl", "wget", "http", "https", "open"];

/// What the simple path produced
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleOutcome {
    /// A finished, user-facing answer
    Answered(String),
    /// Too big or too risky for this path; the main agent should take over
    Escalate(String),
}

/// The on-device execute-and-format agent
pub struct SimpleTaskAgent {
    fabric: Arc<ModelFabric>,
    runner: ShellRunner,
}

impl SimpleTaskAgent {
    pub fn new(fabric: Arc<ModelFabric>, runner: ShellRunner) -> Self {
        Self { fabric, runner }
    }

    /// Whether an analysis qualifies for this path
    ///
    /// The tool set must be the shell alone or shell plus capability
    /// lookup, and the analysis must read as simple work: a reactive
    /// agent with at most a standard prompt.
    pub fn eligible(analysis: &RouteAnalysis) -> bool {
        let core: Vec<&str> = analysis
            .tools
            .iter()
            .map(String::as_str)
            .filter(|t| *t != CAPABILITY_TOOL)
            .collect();
        core == [SHELL_TOOL]
            && analysis.agent_type == AgentType::React
            && matches!(analysis.prompt_tier, PromptTier::Minimal | PromptTier::Standard)
    }

    /// Plain path: plan commands from the request, execute, format
    pub async fn run(&self, input: &str) -> Result<SimpleOutcome> {
        let prompt = format!("Commands that answer this request: {input}");
        let plan = self
            .fabric
            .call(&prompt, 256, Purpose::Planning, Some(PLAN_INSTRUCTIONS))
            .await?;

        let commands = parse_commands(&plan);
        if commands.is_empty() {
            return Ok(SimpleOutcome::Escalate("planner produced no usable commands".to_string()));
        }

        self.execute_and_format(input, &commands, MAX_OUTPUT_CHARS, false).await
    }

    /// Skill path: substitute placeholders, then run the procedure
    pub async fn run_skill(&self, input: &str, skill: &Skill) -> Result<SimpleOutcome> {
        let Some(instructions) = &skill.instructions else {
            return self.run(input).await;
        };

        let substituted = self.substitute_placeholders(input, instructions).await?;
        let plan = self
            .fabric
            .call(&substituted, 256, Purpose::Planning, Some(PLAN_VERBATIM_INSTRUCTIONS))
            .await?;

        let commands: Vec<String> = parse_commands(&plan)
            .into_iter()
            .filter(|command| {
                let clean = !PLACEHOLDER.is_match(command);
                if !clean {
                    warn!(command, "Rejecting command with unsubstituted placeholder");
                }
                clean
            })
            .collect();
        if commands.is_empty() {
            return Ok(SimpleOutcome::Escalate("skill produced no usable commands".to_string()));
        }

        self.execute_and_format(input, &commands, SKILL_MAX_OUTPUT_CHARS, true).await
    }

    async fn execute_and_format(
        &self,
        input: &str,
        commands: &[String],
        max_output: usize,
        shrink_large_stdout: bool,
    ) -> Result<SimpleOutcome> {
        let mut results: Vec<ShellResult> = Vec::with_capacity(commands.len());
        let mut combined = 0usize;

        for command in commands {
            info!(command, "Simple agent executing");
            let mut result = self.runner.run(command).await?;

            if result.exit_code != 0 && !result.stderr.trim().is_empty() {
                return Ok(SimpleOutcome::Escalate(format!(
                    "`{}` failed with exit {}: {}",
                    command,
                    result.exit_code,
                    result.stderr.trim()
                )));
            }

            if shrink_large_stdout && result.stdout.len() > MAX_OUTPUT_CHARS {
                result.stdout = self.shrink_stdout(command, &result.stdout).await;
            }

            combined += result.stdout.len() + result.stderr.len();
            if combined > max_output {
                return Ok(SimpleOutcome::Escalate(format!(
                    "output exceeded {max_output} chars; handing off to the main agent"
                )));
            }
            results.push(result);
        }

        let transcript: String = results
            .iter()
            .map(|r| format!("$ {}\n{}", r.command, r.stdout.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!("Request: {input}\n\nCommand output:\n{transcript}");
        let answer = self
            .fabric
            .call(&prompt, 512, Purpose::Formatting, Some(FORMAT_INSTRUCTIONS))
            .await?;
        Ok(SimpleOutcome::Answered(answer))
    }

    /// Reduce one oversized stdout back under the plain budget
    async fn shrink_stdout(&self, command: &str, stdout: &str) -> String {
        let context = format!("stdout of `{command}`");
        match self.fabric.summarize(stdout, &context, 512).await {
            Ok(summary) if summary.len() < MAX_OUTPUT_CHARS => summary,
            _ => {
                let mut cut = MAX_OUTPUT_CHARS - 20;
                while cut > 0 && !stdout.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}\n[... truncated ...]", &stdout[..cut])
            }
        }
    }

    /// Fill `{{NAME}}` / `${NAME}` / `{NAME}` placeholders from the input
    async fn substitute_placeholders(&self, input: &str, instructions: &str) -> Result<String> {
        let names: BTreeSet<String> = PLACEHOLDER
            .captures_iter(instructions)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
            .map(|m| m.as_str().to_string())
            .collect();

        let mut substituted = String::new();
        let mut values: Vec<(String, String)> = Vec::new();
        for name in names {
            let prompt = format!(
                "From this request, extract the value for {name}: {input}"
            );
            let value = self
                .fabric
                .call(&prompt, 64, Purpose::Extraction, Some(EXTRACT_INSTRUCTIONS))
                .await?;
            let value = value.trim().trim_matches(['"', '\'']).to_string();
            debug!(name, value, "Extracted skill parameter");
            values.push((name, value));
        }

        for line in instructions.lines() {
            let url_context = is_url_context(line);
            let mut filled = line.to_string();
            for (name, value) in &values {
                let value = if url_context {
                    value.replace(' ', "%20")
                } else {
                    value.clone()
                };
                filled = filled
                    .replace(&format!("{{{{{name}}}}}"), &value)
                    .replace(&format!("${{{name}}}"), &value)
                    .replace(&format!("{{{name}}}"), &value);
            }
            substituted.push_str(&filled);
            substituted.push('\n');
        }
        Ok(substituted)
    }
}

/// Whether a procedure line consumes its arguments as URLs
fn is_url_context(line: &str) -> bool {
    if line.contains("http://") || line.contains("https://") {
        return true;
    }
    line.split_whitespace()
        .next()
        .map(|command| URL_COMMANDS.contains(&command))
        .unwrap_or(false)
}

/// Parse a model plan into clean commands
///
/// Strips code fences, numbering, bullets, and backticks; drops comment
/// lines; rejects anything on the danger list; caps the count.
pub fn parse_commands(plan: &str) -> Vec<String> {
    let mut commands = Vec::new();

    for raw in plan.lines() {
        let mut line = raw.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }

        // Numbering like "1." / "2)" and leading bullets
        if let Some(stripped) = strip_numbering(line) {
            line = stripped;
        }
        line = line.trim_start_matches(['-', '*']).trim();
        let line = line.trim_matches('`').trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        if is_dangerous(line) {
            warn!(command = line, "Rejecting dangerous command");
            continue;
        }

        commands.push(line.to_string());
        if commands.len() == MAX_COMMANDS {
            break;
        }
    }
    commands
}

fn strip_numbering(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() < line.len() && (rest.starts_with('.') || rest.starts_with(')')) {
        Some(rest[1..].trim_start())
    } else {
        None
    }
}

/// Whether a command matches the fixed danger list
pub fn is_dangerous(command: &str) -> bool {
    DANGER_PATTERNS.iter().any(|pattern| pattern.is_match(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::fake_fabric;
    use std::time::Duration;

    fn agent(replies: Vec<Result<String, String>>) -> SimpleTaskAgent {
        let (fabric, _) = fake_fabric(replies);
        SimpleTaskAgent::new(
            Arc::new(fabric),
            ShellRunner::new(Duration::from_secs(5), std::env::temp_dir()),
        )
    }

    #[test]
    fn test_eligible_shell_only() {
        let mut analysis = RouteAnalysis::fallback();
        assert!(SimpleTaskAgent::eligible(&analysis));

        analysis.tools = vec![SHELL_TOOL.to_string()];
        assert!(SimpleTaskAgent::eligible(&analysis));
    }

    #[test]
    fn test_not_eligible_with_extra_tools() {
        let mut analysis = RouteAnalysis::fallback();
        analysis.tools.push("fetch".to_string());
        assert!(!SimpleTaskAgent::eligible(&analysis));
    }

    #[test]
    fn test_not_eligible_for_planner_work() {
        let mut analysis = RouteAnalysis::fallback();
        analysis.agent_type = AgentType::PlanExecute;
        assert!(!SimpleTaskAgent::eligible(&analysis));

        let mut analysis = RouteAnalysis::fallback();
        analysis.prompt_tier = PromptTier::Full;
        assert!(!SimpleTaskAgent::eligible(&analysis));
    }

    #[test]
    fn test_parse_commands_strips_decoration() {
        let plan = "```bash\n1. `echo hello`\n- echo world\n# a comment\n// another\n```";
        assert_eq!(parse_commands(plan), vec!["echo hello", "echo world"]);
    }

    #[test]
    fn test_parse_commands_caps_at_two() {
        let plan = "echo a\necho b\necho c";
        assert_eq!(parse_commands(plan).len(), 2);
    }

    #[test]
    fn test_danger_list() {
        assert!(is_dangerous("rm -rf /"));
        assert!(is_dangerous("rm -r ~/things"));
        assert!(is_dangerous("sudo rm important.txt"));
        assert!(is_dangerous("mkfs.ext4 /dev/sda1"));
        assert!(is_dangerous("dd if=/dev/zero of=/dev/sda"));
        assert!(is_dangerous(":(){ :|:& };:"));
        assert!(is_dangerous("chmod -R 777 /"));
        assert!(is_dangerous("format c:"));

        assert!(!is_dangerous("rm notes.txt"));
        assert!(!is_dangerous("ls -la"));
        assert!(!is_dangerous("echo hello > /tmp/x"));
        assert!(!is_dangerous("dd if=in of=out.img"));
    }

    #[test]
    fn test_parse_rejects_dangerous() {
        let plan = "rm -rf /\necho safe";
        assert_eq!(parse_commands(plan), vec!["echo safe"]);
    }

    #[tokio::test]
    async fn test_run_happy_path() {
        // Reply 1: the plan; reply 2: the formatted answer
        let agent = agent(vec![
            Ok("echo hello".to_string()),
            Ok("The output is: hello".to_string()),
        ]);

        let outcome = agent.run("say hello").await.unwrap();
        assert_eq!(outcome, SimpleOutcome::Answered("The output is: hello".to_string()));
    }

    #[tokio::test]
    async fn test_run_escalates_on_command_failure() {
        let agent = agent(vec![Ok("ls /definitely/not/a/path/anywhere".to_string())]);

        let outcome = agent.run("list it").await.unwrap();
        assert!(matches!(outcome, SimpleOutcome::Escalate(_)));
    }

    #[tokio::test]
    async fn test_run_escalates_on_oversized_output() {
        let agent = agent(vec![Ok("yes | head -5000".to_string())]);

        let outcome = agent.run("spam please").await.unwrap();
        let SimpleOutcome::Escalate(reason) = outcome else {
            panic!("expected escalation");
        };
        assert!(reason.contains("4000"));
    }

    #[tokio::test]
    async fn test_run_escalates_on_empty_plan() {
        let agent = agent(vec![Ok("# nothing but comments".to_string())]);

        let outcome = agent.run("do something").await.unwrap();
        assert!(matches!(outcome, SimpleOutcome::Escalate(_)));
    }

    #[tokio::test]
    async fn test_skill_substitution_and_url_encoding() {
        // Replies: extraction of CITY, then the verbatim plan, then format
        let agent = agent(vec![
            Ok("new york".to_string()),
            Ok("echo 'https://wttr.in/new%20york?format=3'".to_string()),
            Ok("It is sunny".to_string()),
        ]);
        let skill = Skill {
            name: "weather".to_string(),
            description: "weather lookup".to_string(),
            keywords: vec![],
            instructions: Some("curl -s 'https://wttr.in/{{CITY}}?format=3'".to_string()),
        };

        let outcome = agent.run_skill("weather in new york", &skill).await.unwrap();
        assert_eq!(outcome, SimpleOutcome::Answered("It is sunny".to_string()));
    }

    #[tokio::test]
    async fn test_skill_rejects_unsubstituted_placeholder() {
        let agent = agent(vec![
            Ok("value".to_string()),
            Ok("curl 'https://example.com/{{OTHER}}'".to_string()),
        ]);
        let skill = Skill {
            name: "x".to_string(),
            description: String::new(),
            keywords: vec![],
            instructions: Some("curl 'https://example.com/{{NAME}}'".to_string()),
        };

        let outcome = agent.run_skill("whatever", &skill).await.unwrap();
        assert!(matches!(outcome, SimpleOutcome::Escalate(_)));
    }

    #[tokio::test]
    async fn test_substitute_placeholders_forms() {
        let agent = agent(vec![Ok("alpha".to_string())]);
        let out = agent
            .substitute_placeholders("input", "echo {{NAME}} ${NAME} {NAME}")
            .await
            .unwrap();
        assert_eq!(out.trim(), "echo alpha alpha alpha");
    }

    #[test]
    fn test_is_url_context() {
        assert!(is_url_context("curl -s example.com"));
        assert!(is_url_context("echo https://example.com/{{X}}"));
        assert!(!is_url_context("echo {{X}}"));
    }
}
