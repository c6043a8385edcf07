use crate::console::{ConsolePartner, StdinSource};
use crate::session::run_script;
use parley_config::{Config, Script};
use parley_conversation::{ConversationManager, TimeoutScheduler};
use parley_scheduler::TokioScheduler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Input parameters for the Run command strategy.
#[derive(Debug, Clone)]
pub struct RunInput {
    /// Script path or name
    pub script: PathBuf,
    /// Fallback timeout in seconds for questions without one (0 disables)
    pub timeout_secs: Option<u64>,
}

/// Strategy for running a wizard script on the terminal.
///
/// Prompts go to stdout, replies are read from stdin, and the final record
/// is printed as JSON once the conversation ends.
#[derive(Debug, Clone, Copy)]
pub struct RunStrategy;

impl super::CommandStrategy for RunStrategy {
    type Input = RunInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load_or_default()?;
        let path = config.resolve_script(&input.script);
        let script = Script::load(&path)?;
        info!("Loaded script '{}' from {}", script.name, path.display());

        let fallback = match input.timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => config.timeouts.duration(),
        };

        let scheduler = Arc::new(TokioScheduler::current()?);
        let manager = ConversationManager::with_scheduler(scheduler.clone());
        let partner = Arc::new(ConsolePartner::new());
        let mut replies = StdinSource::spawn();

        let report = run_script(&manager, partner, &script, fallback, &mut replies).await;
        scheduler.shutdown();

        println!("{}", serde_json::to_string_pretty(&report?)?);
        Ok(())
    }
}
