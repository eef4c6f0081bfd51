use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dataset_explorer::logging::{LogFormat, init_logging};
use dataset_explorer::{
    AppConfig, AskRequest, FsPorts, IndicatifProgressReporter, OllamaClient, ask_question,
    scan_dataset, upload_dataset,
};
use serde::Serialize;

#[derive(Parser)]
#[command(version, about = "Inspect a zipped image dataset and ask a local LLM about it")]
struct Cli {
    /// Directory the uploaded archive is staged in
    #[arg(long, global = true, value_name = "DIR")]
    upload_dir: Option<PathBuf>,

    /// Directory the archive is extracted to; holds manifest.json
    #[arg(long, global = true, value_name = "DIR")]
    extract_dir: Option<PathBuf>,

    /// Base URL of the Ollama server
    #[arg(long, global = true, value_name = "URL")]
    ollama_host: Option<String>,

    #[arg(long, global = true)]
    model: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the current dataset with a zip archive and scan it
    Upload {
        #[arg(value_name = "ZIP")]
        archive: PathBuf,
    },
    /// Ask a question about the current dataset
    Ask {
        #[arg(value_name = "QUESTION", required_unless_present = "body")]
        question: Vec<String>,

        /// Raw JSON body with a `query` or `question` field
        #[arg(long, conflicts_with = "question")]
        body: Option<String>,
    },
    /// Rescan a directory (default: the extraction directory) and rewrite the manifest
    Scan {
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let mut config = AppConfig::from_env()?;
    if let Some(dir) = cli.upload_dir {
        config.storage.upload_dir = dir;
    }
    if let Some(dir) = cli.extract_dir {
        config.storage.extract_dir = dir;
    }
    if let Some(host) = cli.ollama_host {
        config.llm.host = host;
    }
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if let Some(secs) = cli.timeout {
        config.llm.timeout = std::time::Duration::from_secs(secs);
    }

    let ports = FsPorts::new();

    match cli.command {
        Command::Upload { archive } => {
            if !archive.is_file() {
                return Err(format!("archive not found: {}", archive.display()).into());
            }

            let contents = fs::read(&archive)?;
            let file_name = archive
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dataset.zip".to_string());

            let progress = IndicatifProgressReporter::new();
            let response =
                upload_dataset(&ports, &progress, &config.storage, &file_name, &contents)?;
            print_json(&response)?;
        }
        Command::Ask { question, body } => {
            let request = match body {
                Some(body) => serde_json::from_str::<AskRequest>(&body)?,
                None => AskRequest::new(question.join(" ")),
            };

            let model = OllamaClient::new(config.llm)?;
            let response = ask_question(&ports, &model, &config.storage, &request)?;
            print_json(&response)?;
        }
        Command::Scan { dir } => {
            let dir = dir.unwrap_or_else(|| config.storage.extract_dir.clone());
            let manifest = scan_dataset(&ports, &dir, &config.storage.manifest_path())?;
            print_json(&manifest)?;
        }
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
