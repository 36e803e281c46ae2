use clap::{Parser, Subcommand};
use myba::commands::{self, remote::RemoteCmd};
use myba::config::Settings;
use myba::error::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "myba")]
#[command(version = "0.1.0")]
#[command(about = "Encrypted, version-controlled, distributed file backup", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the plain and encrypted repositories
    Init,

    /// Track files or directories (directories stay tracked recursively)
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Stop tracking files or directories
    Rm {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Commit the working tree and mirror it into the encrypted repository
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Push the encrypted repository, then reclaim local packs
    Push { remote: Option<String> },

    /// Pull the encrypted repository and refresh decrypted manifests
    Pull { remote: Option<String> },

    /// Partial-clone an encrypted repository and decrypt its manifests
    Clone { url: String },

    /// Manage remotes of the encrypted repository
    Remote {
        #[command(subcommand)]
        cmd: RemoteCmd,
    },

    /// Rebuild the plain repository from the encrypted one
    Decrypt {
        /// Collapse all history into a single restore commit
        #[arg(long)]
        squash: bool,
    },

    /// Replay history under a new password
    Reencrypt,

    /// Diff of the plain repository
    Diff {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Log of the plain repository
    Log {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Status of the plain repository
    Status {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Tracked files of the plain repository
    LsFiles {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Biggest tracked files
    Largest,

    /// Restore a commit or selected plaintext paths
    Checkout {
        #[arg(required = true)]
        args: Vec<String>,
    },

    /// Reclaim local pack data, keeping promisor markers
    Gc,

    /// Raw git against the plain repository
    Git {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Raw git against the encrypted repository
    GitEnc {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let default = if Settings::from_env().map(|s| s.verbose).unwrap_or(false) {
        "myba=debug"
    } else {
        "myba=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Init => commands::init(&settings),
        Commands::Add { paths } => commands::add(&settings, &paths),
        Commands::Rm { paths } => commands::rm(&settings, &paths),
        Commands::Commit { message } => commands::commit(&settings, message.as_deref()),
        Commands::Push { remote } => commands::push(&settings, remote.as_deref()),
        Commands::Pull { remote } => commands::pull(&settings, remote.as_deref()),
        Commands::Clone { url } => commands::clone(&settings, &url),
        Commands::Remote { cmd } => commands::remote(&settings, cmd),
        Commands::Decrypt { squash } => commands::decrypt(&settings, squash),
        Commands::Reencrypt => commands::reencrypt(&settings),
        Commands::Diff { args } => commands::passthrough_plain(&settings, "diff", &args),
        Commands::Log { args } => commands::passthrough_plain(&settings, "log", &args),
        Commands::Status { args } => commands::passthrough_plain(&settings, "status", &args),
        Commands::LsFiles { args } => commands::passthrough_plain(&settings, "ls-files", &args),
        Commands::Largest => commands::largest(&settings),
        Commands::Checkout { args } => commands::checkout(&settings, &args),
        Commands::Gc => commands::gc(&settings),
        Commands::Git { args } => commands::git_raw(&settings, &args),
        Commands::GitEnc { args } => commands::git_enc_raw(&settings, &args),
    }
}
