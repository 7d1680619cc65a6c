//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;

use apkdeploy::util::shell::ColorChoice;

/// apkdeploy - install Android packages on every connected device
#[derive(Parser)]
#[command(name = "apkdeploy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,

    /// Path to the adb executable
    #[arg(long, global = true, env = "APKDEPLOY_ADB", value_name = "PATH")]
    pub adb: Option<PathBuf>,

    /// Extra configuration file, applied over the global and project files
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages on the connected devices
    Install(InstallArgs),

    /// Show the capability profile of connected devices
    Profile(ProfileArgs),

    /// Show which files would be installed, without installing
    Resolve(ResolveArgs),

    /// Check that adb and the optional tools are reachable
    Doctor,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct InstallArgs {
    /// Packages to install (.apk, .xapk, .apkm, .apks, .aab, or an unpacked xapk directory)
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Only install on the device with this serial
    #[arg(short, long, value_name = "SERIAL")]
    pub device: Option<String>,

    /// Answer yes to every confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Never fall back to a backup and keep-data reinstall
    #[arg(long)]
    pub no_recovery: bool,
}

#[derive(Args)]
pub struct ProfileArgs {
    /// Only profile the device with this serial
    #[arg(short, long, value_name = "SERIAL")]
    pub device: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Package to resolve
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Only resolve for the device with this serial
    #[arg(short, long, value_name = "SERIAL")]
    pub device: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_flags() {
        let cli = Cli::try_parse_from([
            "apkdeploy",
            "-q",
            "install",
            "app.xapk",
            "game.apkm",
            "--device",
            "emulator-5554",
            "--no-recovery",
        ])
        .unwrap();
        assert!(cli.global.quiet);
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.paths.len(), 2);
                assert_eq!(args.device.as_deref(), Some("emulator-5554"));
                assert!(args.no_recovery);
                assert!(!args.yes);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_install_requires_a_path() {
        assert!(Cli::try_parse_from(["apkdeploy", "install"]).is_err());
    }
}
