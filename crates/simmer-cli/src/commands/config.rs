use clap::Subcommand;
use simmer_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration as JSON
    Show,
    /// Print the configuration file path
    Path,
    /// Write the default configuration to disk
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("Configuration reset to defaults");
        }
    }
    Ok(())
}
