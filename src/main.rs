use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use browser_password_export::config::{ExportConfig, ProfilePaths, DEFAULT_PROFILE};
use browser_password_export::crypto::DpapiProtector;
use browser_password_export::data_types::{write_report, ReportFormat};
use browser_password_export::export;

#[derive(Parser)]
#[command(name = "browser-password-export")]
#[command(about = "Decrypt and export the saved passwords of your own Chromium profile", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProfileArgs {
    /// Browser "User Data" directory
    #[arg(short = 'd', long)]
    user_data_dir: Option<PathBuf>,

    /// Profile folder inside the User Data directory
    #[arg(short, long, default_value = DEFAULT_PROFILE)]
    profile: String,

    /// Explicit path to "Local State" (overrides --user-data-dir)
    #[arg(long)]
    local_state: Option<PathBuf>,

    /// Explicit path to "Login Data" (overrides --user-data-dir)
    #[arg(long)]
    login_db: Option<PathBuf>,

    /// Dotted JSON path of the protected key inside Local State
    #[arg(long)]
    key_path: Option<String>,

    /// Decrypt records in parallel
    #[arg(long)]
    parallel: bool,

    /// Give up on a single record after this many milliseconds (0 = never)
    #[arg(long)]
    record_timeout_ms: Option<u64>,

    /// Do not retry failed records as legacy per-record blobs
    #[arg(long)]
    no_legacy_fallback: bool,
}

impl ProfileArgs {
    fn into_config(self) -> Result<ExportConfig> {
        let paths = ProfilePaths::resolve(
            self.user_data_dir.as_deref(),
            &self.profile,
            self.local_state,
            self.login_db,
        )?;
        Ok(ExportConfig::new(paths)
            .key_path(self.key_path)
            .parallel(self.parallel)
            .record_timeout_ms(self.record_timeout_ms)
            .legacy_fallback(!self.no_legacy_fallback))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt saved passwords and write them to a report file
    Export {
        #[command(flatten)]
        profile: ProfileArgs,

        /// Report file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,

        /// Leave records that failed to decrypt out of the report
        #[arg(long)]
        successes_only: bool,
    },

    /// Decrypt saved passwords and print only the counters
    Stats {
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// List stored logins and their envelope tags without decrypting
    Inspect {
        /// Path to "Login Data"
        #[arg(long)]
        login_db: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Export {
            profile,
            output,
            format,
            successes_only,
        } => {
            let config = profile.into_config()?;
            info!("🔐 Decrypting saved logins from {:?}", config.paths.login_db);

            let mut report = export::decrypt_profile(&config, Arc::new(DpapiProtector), true)?;
            if successes_only {
                report.entries.retain(|e| e.secret.is_plaintext());
            }

            write_report(&report.entries, &output, format)?;
            info!("✅ Wrote {} entries to {:?}", report.entries.len(), output);
        }

        Commands::Stats { profile } => {
            let config = profile.into_config()?;
            let report = export::decrypt_profile(&config, Arc::new(DpapiProtector), false)?;
            println!("{}", serde_json::to_string_pretty(&report.summary)?);
        }

        Commands::Inspect { login_db } => {
            info!("📋 Inspecting {:?}", login_db);
            for info in export::inspect_logins(&login_db)? {
                println!(
                    "{}\t{}\t{}\t{} bytes",
                    info.origin,
                    info.username,
                    info.tag.as_deref().unwrap_or("-"),
                    info.ciphertext_len
                );
            }
        }
    }

    Ok(())
}
