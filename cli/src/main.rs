mod args;

use anyhow::{bail, Context};
use filexfer_core::{
    BackendConfig, DownloadOptions, FileOperationResult, FileSystemOperations, LocalFileSystem,
    SftpFileSystem, TransferConfig, UploadOptions,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use args::{Command, Invocation};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let invocation = match args::parse(&argv) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{message}");
            eprintln!();
            eprintln!("{}", args::usage());
            std::process::exit(2);
        }
    };

    match invocation {
        Invocation::Version => {
            println!("filexfer {VERSION}");
            Ok(())
        }
        Invocation::Help => {
            eprintln!("{}", args::usage());
            Ok(())
        }
        Invocation::Run { config, command } => {
            // Logs go to stderr so `cat` output on stdout stays clean.
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_writer(std::io::stderr)
                .init();

            let config = TransferConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            run(config, command).await
        }
    }
}

fn build_backend(config: TransferConfig) -> Box<dyn FileSystemOperations> {
    match config.backend {
        BackendConfig::Local(local) => {
            Box::new(LocalFileSystem::from_config(&local, config.storage))
        }
        BackendConfig::Sftp(sftp) => Box::new(SftpFileSystem::new(sftp, config.storage)),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling transfer");
            token.cancel();
        }
    });
    cancel
}

async fn run(config: TransferConfig, command: Command) -> anyhow::Result<()> {
    let backend = build_backend(config);
    let cancel = cancel_on_ctrl_c();
    info!(root = backend.root(), "filexfer {VERSION}");

    match command {
        Command::Upload {
            source,
            container,
            name,
            dest_path,
            naming_rule,
            overwrite,
        } => {
            let file_name = match name {
                Some(name) => name,
                None => source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("source path has no file name")?,
            };
            let mut options = UploadOptions::new(container);
            if let Some(dest_path) = dest_path {
                options = options.with_dest_path(dest_path);
            }
            if let Some(rule) = naming_rule {
                options = options.with_naming_rule(rule);
            }
            if overwrite {
                options = options.with_overwrite(true);
            }

            let mut file = tokio::fs::File::open(&source)
                .await
                .with_context(|| format!("opening {}", source.display()))?;
            let result = backend
                .upload(&mut file, &file_name, &options, &cancel)
                .await;
            let result = finish(result)?;
            if let Some(info) = result.uploaded_info() {
                println!("{}", serde_json::to_string_pretty(info)?);
            }
        }
        Command::Download {
            path,
            destination,
            overwrite,
        } => {
            let options = if overwrite {
                DownloadOptions::overwriting()
            } else {
                DownloadOptions::default()
            };
            let result = backend
                .download(&path, &destination, &options, &cancel)
                .await;
            let result = finish(result)?;
            println!("{}", result.dest_path().unwrap_or_default());
        }
        Command::Cat { path } => {
            let mut stdout = tokio::io::stdout();
            finish(backend.download_to_stream(&path, &mut stdout, &cancel).await)?;
        }
        Command::Delete { path } => {
            finish(backend.delete(&path, &cancel).await)?;
        }
        Command::Exists { path } => {
            let found = backend.exists(&path).await;
            println!("{found}");
            if !found {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn finish(result: FileOperationResult) -> anyhow::Result<FileOperationResult> {
    if result.is_success() {
        return Ok(result);
    }
    bail!(
        "{}",
        result.error_message().unwrap_or("operation failed")
    )
}
