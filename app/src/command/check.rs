use parley_config::{Config, END, Script};
use std::path::PathBuf;

/// Input parameters for the Check command strategy.
#[derive(Debug, Clone)]
pub struct CheckInput {
    /// Script path or name
    pub script: PathBuf,
}

/// Strategy for validating a wizard script without running it.
#[derive(Debug, Clone, Copy)]
pub struct CheckStrategy;

impl super::CommandStrategy for CheckStrategy {
    type Input = CheckInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load_or_default()?;
        let path = config.resolve_script(&input.script);
        let script = Script::load(&path)?;

        println!("✅ {} is valid", path.display());
        println!();
        println!("Script: {}", script.name);
        println!("Questions: {}", script.questions.len());
        for question in &script.questions {
            let timeout = script
                .timeout_for(question)
                .or_else(|| config.timeouts.duration())
                .map_or_else(|| "none".to_string(), |after| format!("{after:?}"));
            println!("  - {} (timeout: {timeout})", question.id);
            if let Some(validator) = &question.validator {
                println!(
                    "      validator: {} ({:?} on failure)",
                    validator.rule.as_str(),
                    validator.on_fail
                );
            }
            for branch in &question.branches {
                let target = if branch.goto == END {
                    "end of script"
                } else {
                    branch.goto.as_str()
                };
                println!("      '{}' -> {target}", branch.answer);
            }
        }

        Ok(())
    }
}
