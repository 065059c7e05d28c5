use crate::cert::Template;
use crate::chain::DEFAULT_NODE_URL;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dpki")]
#[command(version)]
#[command(about = "Distributed PKI toolkit: CA directory, certificate requests and a development node")]
#[command(long_about = None)]
pub struct Cli {
    /// Node RPC URL
    #[arg(long, env = "DPKI_NODE", default_value = DEFAULT_NODE_URL)]
    pub node: String,

    /// Node home directory (default: ~/.local/share/dpki/node)
    #[arg(long, env = "DPKI_HOME")]
    pub home: Option<PathBuf>,

    /// Interface language, `ru` or `en` (default: system locale)
    #[arg(long, env = "DPKI_LANG")]
    pub lang: Option<String>,

    /// Enable verbose logging (repeat for more verbosity: -v INFO, -vv DEBUG, -vvv TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output raw tab-separated values (no formatting)
    #[arg(short, long)]
    pub raw: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Certificate authority directory
    Ca {
        #[command(subcommand)]
        command: CaCommands,
    },
    /// Create a certificate request and send it to the node
    Request {
        /// Certificate subject (distinguished) name
        subject: String,
        /// CA that should issue the certificate (default: the closest one)
        #[arg(long)]
        issuer: Option<String>,
        /// Predefined template
        #[arg(long, short = 't', default_value = "user")]
        template: TemplateArg,
        /// PEM file with private key; generated if not given
        #[arg(long, short = 'k')]
        key: Option<PathBuf>,
        /// Output directory for certificate.key and certificate.csr
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Path length for CA requests
        #[arg(long)]
        path_length: Option<u32>,
        /// Extra DNS names for node requests (comma-separated)
        #[arg(long, value_delimiter = ',')]
        san: Vec<String>,
        /// Only ask the node to validate the request
        #[arg(long)]
        check_only: bool,
    },
    /// Generate a local testnet (root CA, intermediate CAs, node homes)
    Genesis {
        /// Output directory; `.testnet` is created inside it
        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,
    },
    /// Run the development node for --home
    Node,
    /// Show how a distinguished name splits into hierarchies
    Dn {
        /// Distinguished name, e.g. "CN=Cheshire cat, STREET=Cat's house, L=Cheshire, C=WN"
        name: String,
    },
    /// Generate shell completion scripts
    Completion {
        #[command(subcommand)]
        command: CompletionCommands,
    },
    /// Internal completion helpers (hidden)
    #[command(hide = true)]
    CompletionHelper {
        #[command(subcommand)]
        command: CompletionHelperCommands,
    },
}

#[derive(Subcommand)]
pub enum CaCommands {
    /// List certificate authorities registered on the chain
    List {
        /// Columns to display (comma-separated): subject,path_length,issuer. Use +column to append to defaults.
        #[arg(long)]
        columns: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CompletionCommands {
    /// Generate bash completion script
    Bash,
    /// Generate zsh completion script
    Zsh,
    /// Generate fish completion script
    Fish,
    /// Generate PowerShell completion script
    PowerShell,
}

impl CompletionCommands {
    pub fn shell(&self) -> Shell {
        match self {
            CompletionCommands::Bash => Shell::Bash,
            CompletionCommands::Zsh => Shell::Zsh,
            CompletionCommands::Fish => Shell::Fish,
            CompletionCommands::PowerShell => Shell::PowerShell,
        }
    }
}

#[derive(Subcommand)]
pub enum CompletionHelperCommands {
    /// List CA subjects for completion
    Issuers,
    /// List columns for completion
    Columns,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateArg {
    #[value(name = "CA", alias = "ca")]
    Ca,
    #[value(alias = "host")]
    Node,
    User,
}

impl From<TemplateArg> for Template {
    fn from(value: TemplateArg) -> Self {
        match value {
            TemplateArg::Ca => Template::Ca,
            TemplateArg::Node => Template::Node,
            TemplateArg::User => Template::User,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_request_arguments() {
        let cli = Cli::try_parse_from([
            "dpki",
            "--lang",
            "ru-RU",
            "request",
            "CN=Cat's house Node, STREET=Cat's house, L=Cheshire, C=WN",
            "-t",
            "host",
            "--san",
            "a.local,b.local",
            "--check-only",
        ])
        .unwrap();

        assert_eq!(cli.lang.as_deref(), Some("ru-RU"));
        match cli.command {
            Commands::Request {
                template,
                san,
                check_only,
                ..
            } => {
                assert_eq!(Template::from(template), Template::Node);
                assert_eq!(san, vec!["a.local", "b.local"]);
                assert!(check_only);
            }
            _ => panic!("expected request command"),
        }
    }
}
