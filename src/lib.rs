pub mod collect;
pub mod config;
pub mod devices;
pub mod identifiers;
pub mod ledger;
pub mod mail;
pub mod publish;
pub mod sms;
pub mod sources;
pub mod workspace;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;

#[derive(Parser)]
#[clap(
    name = "audit-bucket",
    version,
    about = "Collect compliance artifacts (email/SMS/device inventory) and publish ledger summaries to procurement systems"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect inbound email, SMS and device inventory into a dated run folder
    Collect {
        /// Base output directory for run workspaces
        #[clap(long)]
        output_dir: PathBuf,
        /// Comma-separated recipient addresses to retain mail for
        #[clap(long)]
        targets: String,
        /// Start date (YYYY-MM-DD) to pull from; defaults to today (UTC)
        #[clap(long)]
        since: Option<NaiveDate>,
    },
    /// Publish ledger summaries from a processed run to Coupa, PIEE and SAM.gov
    Publish {
        /// Path to the directory produced by the processing stage
        #[clap(long)]
        input: PathBuf,
    },
}

/// Async CLI entrypoint shared by `main()` and integration tests. Returns the
/// process exit code: 0 on success (including per-target publish failures),
/// 3 when required enterprise identifiers are missing.
pub async fn run(cli: Cli) -> Result<i32> {
    let config = AppConfig::from_env();
    config.trace_loaded();

    match cli.command {
        Commands::Collect {
            output_dir,
            targets,
            since,
        } => {
            let since = since.unwrap_or_else(|| Utc::now().date_naive());
            let targets: Vec<String> = targets
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();

            let mail_client = config.mail.clone().map(mail::ImapMailFetcher::new);
            let sms_client = config
                .sms
                .as_ref()
                .map(|s| sms::TwilioSmsClient::new(s.sid.clone(), s.token.clone()));
            let mdm_client = config
                .mdm
                .as_ref()
                .map(|m| devices::MdmInventoryClient::new(m.url.clone(), m.key.clone()));
            let collectors = sources::Collectors {
                mail: mail_client.as_ref().map(|c| c as &dyn sources::MailFetcher),
                sms: sms_client.as_ref().map(|c| c as &dyn sources::SmsLister),
                devices: mdm_client
                    .as_ref()
                    .map(|c| c as &dyn sources::DeviceInventory),
            };

            let args = collect::CollectArgs {
                output_dir,
                targets,
                phone_numbers: config
                    .sms
                    .as_ref()
                    .map(|s| s.numbers.clone())
                    .unwrap_or_default(),
                since,
            };
            let index = collect::run_collection(&args, collectors, config.archive.as_ref()).await?;
            println!("Collection complete.\nIndex:");
            println!("{:#?}", index);
            Ok(0)
        }
        Commands::Publish { input } => match publish::run_publish(&config, &input).await? {
            publish::PublishOutcome::MissingIdentifiers(missing) => {
                eprintln!(
                    "[ERROR] Missing required enterprise identifiers: {}",
                    missing.join(", ")
                );
                Ok(3)
            }
            publish::PublishOutcome::Completed(report) => {
                println!("Publish complete.\nReport:");
                println!("{:#?}", report);
                Ok(0)
            }
        },
    }
}
