use clap::{Parser, Subcommand};
use toolver::Shell;

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: ToolverCommand,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Only print errors
    #[clap(short, long, global = true, conflicts_with = "verbose")]
    pub(crate) quiet: bool,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum ToolverCommand {
    /// Downloads and installs a version. Partial versions (`20`, `2.13.x`) resolve to the newest match
    Install {
        tool: String,
        /// Version, optionally with a distribution suffix: `21-tem`, `17-corretto`
        version: String,
        /// Activate the version after installing it
        #[clap(long = "use")]
        activate: bool,
        /// Install even when the published checksum cannot be fetched
        #[clap(long)]
        skip_checksum: bool,
    },
    /// Switches the active version of an installed tool
    Use {
        tool: String,
        version: String,
        /// Also write the tool's environment to the user environment and shell startup file
        #[clap(long)]
        persist: bool,
    },
    /// Removes an installed version. Removes the `current` alias if the version is active
    Uninstall {
        tool: String,
        version: String,
    },
    /// Lists installed versions. Defaults to all tools
    List {
        tool: Option<String>,
        /// List versions available for download instead
        #[clap(long, requires = "tool")]
        remote: bool,
    },
    /// Prints the active version. Defaults to all tools
    Current {
        tool: Option<String>,
    },
    /// Prints the install directory of the active version
    Which {
        tool: String,
    },
    /// Prints shell statements exporting the environment of every active tool
    Env {
        /// Output syntax: posix, powershell or cmd. Defaults to the current shell
        #[clap(long)]
        shell: Option<Shell>,
    },
    /// Detects versions declared by project files in the current directory and its parents
    Detect {
        #[clap(long)]
        json: bool,
        /// Install missing versions and activate each detected one
        #[clap(long)]
        apply: bool,
    },
    /// Prints the startup line that loads active tools into new shells
    Init {
        /// posix, powershell or cmd. Defaults to the current shell
        shell: Option<Shell>,
        /// Add the line to the shell startup file instead of printing it
        #[clap(long)]
        install: bool,
    },
    /// Checks the install root, active versions, dependencies and shell integration
    Doctor {
        #[clap(long)]
        json: bool,
    },
}
