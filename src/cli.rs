use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "homestead")]
#[command(version)]
#[command(about = "Resumable provisioning for single-host container homelabs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the provisioning pipeline (resumes where it left off)
    Install(InstallArgs),

    /// Run a single step by name or index
    Step(StepArgs),

    /// Show provisioning status: steps, markers, configuration
    Status,

    /// Read and write persisted configuration entries
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Inspect and clear completion markers
    #[command(subcommand)]
    Marker(MarkerCommand),

    /// List and select application stacks
    #[command(subcommand)]
    Stacks(StacksCommand),

    /// Synthesize and start units for selected stacks (skips the pipeline)
    Deploy(DeployArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Install
// ============================================================================

#[derive(Parser)]
pub struct InstallArgs {
    /// Quick mode: full sequence without the VPN step
    #[arg(long)]
    pub quick: bool,

    /// Only run specific steps (comma-separated names or indexes)
    #[arg(long)]
    pub only: Option<String>,

    /// Skip specific steps (comma-separated names or indexes)
    #[arg(long)]
    pub skip: Option<String>,

    /// Stacks to select when none are persisted (comma-separated)
    #[arg(long)]
    pub stacks: Option<String>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// What to do when a step fails
    #[arg(long, value_enum, default_value = "prompt")]
    pub on_failure: FailureMode,

    /// List the pipeline steps and exit
    #[arg(long)]
    pub list_steps: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailureMode {
    /// Ask the operator (falls back to abort when not a terminal)
    Prompt,
    /// Stop at the first failure
    Abort,
    /// Continue with the remaining steps
    KeepGoing,
}

// ============================================================================
// Step
// ============================================================================

#[derive(Parser)]
pub struct StepArgs {
    /// Step name (e.g. "storage") or 1-based index
    pub step: String,

    /// Clear the step's completion marker first to force re-execution
    #[arg(short, long)]
    pub force: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Stacks to select when none are persisted (comma-separated)
    #[arg(long)]
    pub stacks: Option<String>,
}

// ============================================================================
// Config / Marker
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print one configuration value
    Get { key: String },

    /// Set a configuration value
    Set { key: String, value: String },

    /// List all configuration entries
    List,

    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
pub enum MarkerCommand {
    /// List completion markers
    List,

    /// Remove a marker so its step runs again
    Clear { name: String },
}

// ============================================================================
// Stacks / Deploy
// ============================================================================

#[derive(Subcommand)]
pub enum StacksCommand {
    /// Show the catalog, discovered stack directories and the selection
    List,

    /// Choose stacks to deploy (interactive without --stacks)
    Select {
        /// Comma-separated stack names
        #[arg(long)]
        stacks: Option<String>,
    },
}

#[derive(Parser)]
pub struct DeployArgs {
    /// Deploy a single stack instead of the whole selection
    pub stack: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
