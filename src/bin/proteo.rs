use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use proteo_archive::app::{App, DownloadOptions, DownloadRequest};
use proteo_archive::archive::{ArchiveHttpClient, ArchiveRecord};
use proteo_archive::config::{ConfigLoader, Settings};
use proteo_archive::domain::{DatasetId, DatatypeSelection, VersionRequest};
use proteo_archive::error::ProteoError;
use proteo_archive::output::{ConsoleOutput, JsonOutput, OutputMode};
use proteo_archive::progress::ProgressSinkKind;
use proteo_archive::prompt::{NonInteractivePrompt, PasswordPrompt, TerminalPrompt};

#[derive(Parser)]
#[command(name = "proteo")]
#[command(about = "Download and verify versioned proteogenomic datasets")]
#[command(version, author)]
struct Cli {
    /// JSON output; fail instead of prompting for passwords.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Settings file (data root, archive DOI, API base, timeout).
    #[arg(long, global = true)]
    settings: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download a dataset version, or every dataset of a plan file")]
    Download(DownloadArgs),
    #[command(about = "Show index and installed versions of a dataset")]
    Versions(DatasetArgs),
    #[command(about = "List locally available datasets")]
    List,
    #[command(about = "Verify that every file of a version is installed")]
    Check(CheckArgs),
    #[command(about = "Create a dataset directory pointing at its remote index")]
    Register(RegisterArgs),
}

#[derive(Args)]
struct DownloadArgs {
    dataset: Option<String>,

    /// Plan file; defaults to proteo.json in the current directory.
    #[arg(long, conflicts_with = "dataset")]
    config: Option<String>,

    #[arg(long, default_value = "latest")]
    version: String,

    #[arg(long, value_delimiter = ',')]
    datatypes: Vec<String>,

    #[arg(long)]
    redownload: bool,
}

#[derive(Args)]
struct DatasetArgs {
    dataset: String,
}

#[derive(Args)]
struct CheckArgs {
    dataset: String,

    #[arg(long, default_value = "latest")]
    version: String,
}

#[derive(Args)]
struct RegisterArgs {
    dataset: String,
    index_url: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ProteoError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ProteoError) -> u8 {
    match error {
        ProteoError::InvalidParameter(_)
        | ProteoError::DatasetNotInstalled { .. }
        | ProteoError::MissingFile { .. }
        | ProteoError::DataVersionNotInstalled { .. }
        | ProteoError::AmbiguousLatest { .. }
        | ProteoError::PackageCannotHandleDataVersion { .. }
        | ProteoError::MalformedManifest { .. }
        | ProteoError::MissingIndexUrl { .. }
        | ProteoError::PasswordRequired(_)
        | ProteoError::MissingConfig
        | ProteoError::ConfigRead(_)
        | ProteoError::ConfigParse(_)
        | ProteoError::UnknownDatatype(_) => 2,
        ProteoError::NoInternet(_)
        | ProteoError::RecordNotFound { .. }
        | ProteoError::RemoteFileNotFound { .. }
        | ProteoError::DownloadFailed { .. }
        | ProteoError::ArchiveHttp(_)
        | ProteoError::ArchiveStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let settings = Settings::load(cli.settings.as_deref())?;
    let store = settings.store()?;
    let archive = ArchiveHttpClient::with_options(&settings.api_base, settings.timeout)?;
    let record = ArchiveRecord::new(settings.archive_doi.clone());

    match output_mode {
        OutputMode::NonInteractive => {
            let app = App::with_record(store, archive, NonInteractivePrompt, record);
            run_command(cli.command, &app, output_mode)
        }
        OutputMode::Interactive => {
            let app = App::with_record(store, archive, TerminalPrompt, record);
            run_command(cli.command, &app, output_mode)
        }
    }
}

fn run_command<P: PasswordPrompt>(
    command: Commands,
    app: &App<ArchiveHttpClient, P>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match command {
        Commands::Download(args) => run_download(args, app, output_mode),
        Commands::Versions(args) => {
            let dataset = args.dataset.parse::<DatasetId>()?;
            match output_mode {
                OutputMode::NonInteractive => {
                    let result = app.versions(&dataset, &JsonOutput)?;
                    JsonOutput::print_versions(&result).into_diagnostic()
                }
                OutputMode::Interactive => {
                    let console = ConsoleOutput::new(ProgressSinkKind::Versions);
                    let result = app.versions(&dataset, &console)?;
                    console.finish_versions(&result);
                    Ok(())
                }
            }
        }
        Commands::List => match output_mode {
            OutputMode::NonInteractive => {
                let result = app.list(&JsonOutput)?;
                JsonOutput::print_list(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let console = ConsoleOutput::new(ProgressSinkKind::List);
                let result = app.list(&console)?;
                console.finish_list(&result);
                Ok(())
            }
        },
        Commands::Check(args) => {
            let dataset = args.dataset.parse::<DatasetId>()?;
            let version = args.version.parse::<VersionRequest>()?;
            match output_mode {
                OutputMode::NonInteractive => {
                    let result = app.check(&dataset, &version, &JsonOutput)?;
                    JsonOutput::print_check(&result).into_diagnostic()
                }
                OutputMode::Interactive => {
                    let console = ConsoleOutput::new(ProgressSinkKind::Check);
                    let result = app.check(&dataset, &version, &console)?;
                    console.finish_check(&result);
                    Ok(())
                }
            }
        }
        Commands::Register(args) => {
            let dataset = args.dataset.parse::<DatasetId>()?;
            match output_mode {
                OutputMode::NonInteractive => {
                    let result = app.register(&dataset, &args.index_url, &JsonOutput)?;
                    JsonOutput::print_register(&result).into_diagnostic()
                }
                OutputMode::Interactive => {
                    let console = ConsoleOutput::new(ProgressSinkKind::Register);
                    let result = app.register(&dataset, &args.index_url, &console)?;
                    console.finish_register(&result);
                    Ok(())
                }
            }
        }
    }
}

fn run_download<P: PasswordPrompt>(
    args: DownloadArgs,
    app: &App<ArchiveHttpClient, P>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let DownloadArgs {
        dataset,
        config,
        version,
        datatypes,
        redownload,
    } = args;
    let options = DownloadOptions { redownload };

    let Some(dataset) = dataset else {
        let resolved = ConfigLoader::resolve(config.as_deref())?;
        tracing::debug!(
            schema_version = resolved.schema_version,
            datasets = resolved.requests.len(),
            "resolved download plan"
        );
        return match output_mode {
            OutputMode::NonInteractive => {
                let result = app.download_all(&resolved.requests, options, &JsonOutput)?;
                JsonOutput::print_batch(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let console = ConsoleOutput::new(ProgressSinkKind::Download);
                let result = app.download_all(&resolved.requests, options, &console)?;
                console.finish_batch(&result);
                Ok(())
            }
        };
    };

    let request = DownloadRequest {
        dataset: dataset.parse()?,
        version: version.parse()?,
        datatypes: DatatypeSelection::from_list(datatypes),
    };
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.download(&request, options, &JsonOutput)?;
            JsonOutput::print_download(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let console = ConsoleOutput::new(ProgressSinkKind::Download);
            let result = app.download(&request, options, &console)?;
            console.finish_download(&result);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn download_takes_a_dataset_or_a_plan_file() {
        let err = Cli::try_parse_from(["proteo", "download", "bcm_brca", "--config", "plan.json"])
            .err()
            .map(|err| err.kind());
        assert_eq!(err, Some(ErrorKind::ArgumentConflict));

        assert!(Cli::try_parse_from(["proteo", "download", "--config", "plan.json"]).is_ok());
        assert!(Cli::try_parse_from(["proteo", "download", "bcm_brca", "--version", "1.0"]).is_ok());
    }
}
