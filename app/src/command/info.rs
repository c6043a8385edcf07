use parley_config::Config;
use tracing::info;

/// Strategy for displaying the effective configuration.
///
/// Shows where the config file lives, whether it exists, and the values
/// `parley run` will use (defaults fill in whatever the file leaves out).
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config_path = Config::config_path()?;
        let config = Config::load_or_default()?;
        info!("Showing configuration from {}", config_path.display());

        println!("=== parley Configuration ===\n");

        println!("Config File:");
        println!("  Path: {}", config_path.display());
        if config_path.exists() {
            println!("  Status: Found");
        } else {
            println!("  Status: Not found (defaults in use, run 'parley init')");
        }
        println!();

        println!("Timeouts:");
        match config.timeouts.duration() {
            Some(after) => println!("  Default: {after:?}"),
            None => println!("  Default: disabled"),
        }
        println!();

        println!("Logging:");
        println!("  Filter: {}", config.log.filter);
        println!();

        println!("Scripts:");
        match &config.scripts_dir {
            Some(dir) => println!("  Directory: {}", dir.display()),
            None => println!("  Directory: (not set - paths are used as given)"),
        }

        Ok(())
    }
}
