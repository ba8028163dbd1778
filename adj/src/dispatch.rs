//! Dispatcher - routes a request and drives the cheapest capable path
//!
//! Early-exit routes resolve directly; bash-only analyses run through the
//! simple-task agent; everything else is handed to the main agent, which
//! lives outside this core, as a structured escalation answer. This is
//! the `run_task` surface the daemon, scheduler, and event router share.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, info};

use crate::capability::CapabilityRegistry;
use crate::exec::ShellRunner;
use crate::model::ModelFabric;
use crate::router::{RouteResult, Router};
use crate::simple::{SimpleOutcome, SimpleTaskAgent};

/// Marker prefixing answers that need the full agent
pub const ESCALATION_PREFIX: &str = "[escalate]";

/// The boundary the daemon loop and scheduler consume
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run a natural-language directive to a final answer string
    async fn run_task(&self, input: &str) -> Result<String>;
}

/// The default task runner
pub struct Dispatcher {
    router: Router,
    fabric: Option<Arc<ModelFabric>>,
    simple: Option<SimpleTaskAgent>,
    registry: Arc<CapabilityRegistry>,
    runner: ShellRunner,
}

impl Dispatcher {
    pub fn new(
        router: Router,
        fabric: Option<Arc<ModelFabric>>,
        registry: Arc<CapabilityRegistry>,
        runner: ShellRunner,
    ) -> Self {
        let simple = fabric
            .as_ref()
            .map(|fabric| SimpleTaskAgent::new(fabric.clone(), runner.clone()));
        Self {
            router,
            fabric,
            simple,
            registry,
            runner,
        }
    }

    /// Route without executing; the interactive layer uses this directly
    pub async fn route(&self, input: &str) -> RouteResult {
        self.router.route(input).await
    }

    /// Whether an answer is an escalation to the main agent
    pub fn is_escalation(answer: &str) -> bool {
        answer.starts_with(ESCALATION_PREFIX)
    }

    fn escalation(&self, route: &RouteResult, reason: &str) -> String {
        let detail = route
            .analysis()
            .map(|a| {
                format!(
                    " tools={:?} agent={:?} tier={:?} confidence={:.2}",
                    a.tools, a.agent_type, a.prompt_tier, a.confidence
                )
            })
            .unwrap_or_default();
        format!("{ESCALATION_PREFIX} {reason}.{detail}")
    }
}

#[async_trait]
impl TaskRunner for Dispatcher {
    async fn run_task(&self, input: &str) -> Result<String> {
        let route = self.router.route(input).await;

        if route.is_early_exit() {
            debug!(input, "Early-exit route");
            return route.resolve(&self.runner).await;
        }

        let Some(analysis) = route.analysis() else {
            return Ok(self.escalation(&route, "unroutable input"));
        };

        let model_ready = match &self.fabric {
            Some(fabric) => fabric.is_available().await,
            None => false,
        };

        if model_ready && SimpleTaskAgent::eligible(analysis) {
            if let Some(simple) = &self.simple {
                // A matched skill with an embedded procedure takes the
                // parameterized path
                let skill = analysis
                    .skills
                    .iter()
                    .filter_map(|name| self.registry.skill(name))
                    .find(|skill| skill.instructions.is_some());

                let outcome = match skill {
                    Some(skill) => simple.run_skill(input, skill).await,
                    None => simple.run(input).await,
                };

                match outcome {
                    Ok(SimpleOutcome::Answered(answer)) => {
                        info!(input, "Simple agent answered");
                        return Ok(answer);
                    }
                    Ok(SimpleOutcome::Escalate(reason)) => {
                        return Ok(self.escalation(&route, &reason));
                    }
                    Err(e) => {
                        return Ok(self.escalation(&route, &format!("simple agent error: {e}")));
                    }
                }
            }
        }

        Ok(self.escalation(&route, "request needs the full agent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, default_bash_commands, default_categories};
    use crate::model::testing::fake_fabric;
    use std::time::Duration;

    fn manifest() -> Manifest {
        let mut manifest = Manifest::empty();
        manifest.categories = default_categories();
        manifest.bash_commands = default_bash_commands();
        manifest
    }

    fn shell_runner() -> ShellRunner {
        ShellRunner::new(Duration::from_secs(5), std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_instant_route_resolves() {
        let dispatcher = Dispatcher::new(
            Router::new(Some(manifest())),
            None,
            Arc::new(CapabilityRegistry::with_builtins()),
            shell_runner(),
        );

        let answer = dispatcher.run_task("what time is it").await.unwrap();
        assert!(answer.contains("current time"));
    }

    #[tokio::test]
    async fn test_shortcut_route_resolves() {
        let dispatcher = Dispatcher::new(
            Router::new(Some(manifest())),
            None,
            Arc::new(CapabilityRegistry::with_builtins()),
            shell_runner(),
        );

        let answer = dispatcher.run_task("uptime").await.unwrap();
        assert!(!answer.is_empty());
        assert!(!Dispatcher::is_escalation(&answer));
    }

    #[tokio::test]
    async fn test_no_model_escalates_cached_route() {
        let dispatcher = Dispatcher::new(
            Router::new(Some(manifest())),
            None,
            Arc::new(CapabilityRegistry::with_builtins()),
            shell_runner(),
        );

        let answer = dispatcher.run_task("create a file called notes.txt").await.unwrap();
        assert!(Dispatcher::is_escalation(&answer));
    }

    #[tokio::test]
    async fn test_simple_agent_runs_eligible_route() {
        // Replies: tier-3b never fires (tier 2 hits); plan, then format
        let (fabric, _) = fake_fabric(vec![
            Ok("echo created".to_string()),
            Ok("Done: created".to_string()),
        ]);
        let fabric = Arc::new(fabric);
        let dispatcher = Dispatcher::new(
            Router::new(Some(manifest())).with_fabric(fabric.clone()),
            Some(fabric),
            Arc::new(CapabilityRegistry::with_builtins()),
            shell_runner(),
        );

        let answer = dispatcher.run_task("create a file called notes.txt").await.unwrap();
        assert_eq!(answer, "Done: created");
    }

    #[tokio::test]
    async fn test_simple_agent_escalation_is_answer_not_error() {
        let (fabric, _) = fake_fabric(vec![Ok("ls /definitely/not/a/real/path".to_string())]);
        let fabric = Arc::new(fabric);
        let dispatcher = Dispatcher::new(
            Router::new(Some(manifest())).with_fabric(fabric.clone()),
            Some(fabric),
            Arc::new(CapabilityRegistry::with_builtins()),
            shell_runner(),
        );

        let answer = dispatcher.run_task("create a file called notes.txt").await.unwrap();
        assert!(Dispatcher::is_escalation(&answer));
    }
}
