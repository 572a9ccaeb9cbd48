///
/// This module implements the CLI interface for `cdf`: command parsing,
/// argument validation and the async entrypoint used by `main()` and the
/// integration tests.
///
/// All business logic (upload queue, enumeration, delete passes, credential
/// resolution) lives in the [`cdf-cli-core`] crate. This module is strictly
/// CLI glue: it maps arguments onto core types and prints summaries.
///
/// ## Command tree
/// - `cdf files upload <PATH>`: upload one file or the files inside a directory.
/// - `cdf files delete`: delete by id, external id and/or filter.
///
/// Both subcommands take the shared authentication flags in [`AuthArgs`].
///
/// [`cdf-cli-core`]: ../../cdf_cli_core/
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cdf_cli_core::contract::FileFilter;
use cdf_cli_core::credentials::{CredentialArgs, Prompt};
use cdf_cli_core::delete::{delete_files, DeleteRequest};
use cdf_cli_core::enumerate::list_upload_candidates;
use cdf_cli_core::queue::{QueueConfig, DEFAULT_MAX_BATCH_SIZE};
use cdf_cli_core::upload::{upload_candidates, DataSetRef, UploadOptions, DEFAULT_SOURCE};
use clap::{Args, Parser, Subcommand};

use crate::context::CdfContext;
use crate::prompt::InquirePrompt;

/// The CDF CLI: upload and delete files in Cognite Data Fusion.
#[derive(Parser, Debug)]
#[clap(name = "cdf", version, about = "The CDF CLI entry point")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Operations on the CDF Files resource type
    #[clap(subcommand)]
    Files(FilesCommand),
}

#[derive(Subcommand, Debug)]
pub enum FilesCommand {
    /// Uploads a set of files to Cognite Data Fusion
    Upload(UploadArgs),
    /// Deletes a set of files from Cognite Data Fusion
    Delete(DeleteArgs),
}

/// Authentication flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    /// The CDF project to authenticate to.
    #[clap(short = 'p', long = "cdf-project", env = "CDF_PROJECT")]
    pub cdf_project: Option<String>,

    /// The CDF base URL [default: https://api.cognitedata.com]
    #[clap(long = "cdf-host", env = "CDF_HOST")]
    pub cdf_host: Option<String>,

    /// The client ID to authenticate with.
    #[clap(long = "client-id", env = "CDF_CLIENT_ID")]
    pub client_id: Option<String>,

    /// The client secret to authenticate with.
    #[clap(long = "client-secret", env = "CDF_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// The AAD tenant ID to authenticate towards.
    #[clap(long = "tenant-id", env = "CDF_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// A JSON file hosting CDF credentials.
    #[clap(long = "credentials-file", env = "CDF_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,
}

impl From<AuthArgs> for CredentialArgs {
    fn from(auth: AuthArgs) -> Self {
        CredentialArgs {
            project: auth.cdf_project,
            host: auth.cdf_host,
            client_id: auth.client_id,
            client_secret: auth.client_secret,
            tenant_id: auth.tenant_id,
            credentials_file: auth.credentials_file,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// The file, or directory of files, to upload. Directories are not walked recursively.
    pub path: PathBuf,

    /// The data set ID to upload files to.
    #[clap(short = 'd', long = "data-set-id", conflicts_with = "data_set_ext_id")]
    pub data_set_id: Option<i64>,

    /// The data set external ID to upload files to.
    #[clap(long = "data-set-ext-id")]
    pub data_set_ext_id: Option<String>,

    /// An external id prefix to add to each file.
    #[clap(long = "ext-id-prefix", default_value = "")]
    pub ext_id_prefix: String,

    /// The CDF file directory to upload the files to.
    #[clap(long = "file-directory")]
    pub file_directory: Option<String>,

    /// The file metadata source value.
    #[clap(long = "source", default_value = DEFAULT_SOURCE)]
    pub source: String,

    /// Number of files that triggers an immediate batch upload.
    #[clap(long = "max-batch-size", default_value_t = DEFAULT_MAX_BATCH_SIZE as u64, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_batch_size: u64,

    /// Seconds after which buffered files are uploaded even if the batch is not full.
    #[clap(long = "upload-interval-secs", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub upload_interval_secs: u64,

    #[clap(flatten)]
    pub auth: AuthArgs,
}

impl UploadArgs {
    fn options(&self) -> UploadOptions {
        let data_set = match (self.data_set_id, &self.data_set_ext_id) {
            (Some(id), _) => DataSetRef::Id(id),
            (None, Some(external_id)) => DataSetRef::ExternalId(external_id.clone()),
            (None, None) => DataSetRef::None,
        };
        UploadOptions {
            ext_id_prefix: self.ext_id_prefix.clone(),
            file_directory: self.file_directory.clone(),
            source: self.source.clone(),
            data_set,
        }
    }

    fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_max_batch_size(self.max_batch_size as usize)
            .with_max_upload_interval(Duration::from_secs(self.upload_interval_secs))
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// The internal id of the files to delete. Repeat or comma-separate for several.
    #[clap(long = "id", value_delimiter = ',')]
    pub ids: Vec<i64>,

    /// The external id of the files to delete. Repeat or comma-separate for several.
    #[clap(long = "ext-id", value_delimiter = ',')]
    pub external_ids: Vec<String>,

    /// A file filter expression in the format <key=value>. You can specify multiple filters.
    #[clap(long = "filter", value_parser = parse_key_val)]
    pub filter: Vec<(String, String)>,

    /// A file metadata filter expression in the format <key=value>. You can specify multiple filters.
    #[clap(long = "metadata-filter", value_parser = parse_key_val)]
    pub metadata_filter: Vec<(String, String)>,

    #[clap(flatten)]
    pub auth: AuthArgs,
}

impl DeleteArgs {
    pub fn request(&self) -> DeleteRequest {
        DeleteRequest {
            ids: self.ids.clone(),
            external_ids: self.external_ids.clone(),
            filter: FileFilter {
                fields: self.filter.iter().cloned().collect(),
                metadata: self.metadata_filter.iter().cloned().collect(),
            },
        }
    }
}

/// Parse a `key=value` pair. The value may itself contain `=`.
fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no `=` found in `{raw}`"))?;
    if key.trim().is_empty() {
        return Err(format!("invalid key=value: empty key in `{raw}`"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn interactive_prompt() -> Option<Box<dyn Prompt>> {
    InquirePrompt::when_interactive().map(|prompt| Box::new(prompt) as Box<dyn Prompt>)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Files(FilesCommand::Upload(args)) => upload(args).await,
        Commands::Files(FilesCommand::Delete(args)) => delete(args).await,
    }
}

async fn upload(args: UploadArgs) -> Result<()> {
    tracing::info!(command = "files upload", path = %args.path.display(), "Starting upload");
    // Validate the input before any credential prompt or client construction.
    let candidates = list_upload_candidates(&args.path)
        .with_context(|| format!("cannot upload {}", args.path.display()))?;

    let context = CdfContext::new(args.auth.clone().into(), interactive_prompt());
    let client = context.client().await?;

    let report = upload_candidates(client, &candidates, &args.options(), args.queue_config()).await?;
    tracing::info!(command = "files upload", ?report, "Upload complete");
    println!(
        "File upload completed. {} of {} files uploaded ({} errors).",
        report.uploaded, report.submitted, report.errors
    );
    Ok(())
}

async fn delete(args: DeleteArgs) -> Result<()> {
    let request = args.request();
    if request.is_empty() {
        tracing::info!("No file (external) ids specified nor any filter. No files to delete");
        println!("Deleted 0 files.");
        return Ok(());
    }

    let context = CdfContext::new(args.auth.clone().into(), interactive_prompt());
    let client = context.client().await?;

    let report = delete_files(client.as_ref(), request).await?;
    tracing::info!(command = "files delete", ?report, "Delete complete");
    println!(
        "Deleted {} files ({} by id, {} by external id, {} by filter).",
        report.total(),
        report.by_id,
        report.by_external_id,
        report.by_filter
    );
    Ok(())
}
