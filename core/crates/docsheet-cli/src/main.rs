use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use docsheet::ai_client::build_client;
use docsheet::document_processing::{process_response, PdfExtractor, PromptBuilder};
use docsheet::export::{self, ExportFormat};
use docsheet::{Pipeline, PipelineConfig, ProcessingLog, ResponseSchema, RowTable, Upload};

/// Turn PDF documents into numbered Key/Value/Comment tables with an LLM.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML). Defaults to the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// On failure, print `{"error": "..."}` to stdout instead of a log line
    #[arg(long, global = true)]
    json_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract a table from a PDF (`-` reads stdin)
    Extract {
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,
    },
    /// Print the instruction that would be sent for a PDF, without calling a model
    Prompt { input: PathBuf },
    /// Rebuild a table from a saved model response
    Replay {
        response: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Write the table here instead of stdout
    #[arg(short, long = "out")]
    output: Option<PathBuf>,

    /// Table format; inferred from the output extension when omitted
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Csv,
    Json,
    Xlsx,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => ExportFormat::Csv,
            OutputFormat::Json => ExportFormat::Json,
            OutputFormat::Xlsx => ExportFormat::Xlsx,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    if let Err(err) = run(cli) {
        if json_errors {
            let body = match err.downcast_ref::<docsheet::Error>() {
                Some(pipeline_err) => pipeline_err.to_body(),
                None => docsheet::ErrorBody {
                    error: err.to_string(),
                },
            };
            match serde_json::to_string(&body) {
                Ok(json) => println!("{}", json),
                Err(ser_err) => error!(error = %ser_err, "failed to encode error body"),
            }
        } else {
            error!(error = %err, "command failed");
            for cause in err.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract {
            input,
            output,
            model,
        } => extract(config, &input, &output, model),
        Commands::Prompt { input } => prompt(&config, &input),
        Commands::Replay { response, output } => replay(&response, &output),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("docsheet").join("config.toml"))
}

fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        return PipelineConfig::load_from_path(path)
            .with_context(|| format!("failed to load config: {}", path.display()));
    }

    match default_config_path().filter(|path| path.is_file()) {
        Some(path) => {
            debug!(path = %path.display(), "using user config");
            PipelineConfig::load_from_path(&path)
                .with_context(|| format!("failed to load config: {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn read_upload(input: &Path) -> Result<Upload> {
    if input.as_os_str() == "-" {
        let mut bytes = Vec::new();
        io::stdin()
            .read_to_end(&mut bytes)
            .context("failed to read PDF from stdin")?;
        return Ok(Upload::new("stdin.pdf", bytes));
    }

    Upload::from_path(input).with_context(|| format!("failed to read file: {}", input.display()))
}

fn api_key(config: &PipelineConfig) -> String {
    config
        .provider
        .api_key_vars()
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_default()
}

fn extract(
    mut config: PipelineConfig,
    input: &Path,
    output: &OutputArgs,
    model: Option<String>,
) -> Result<()> {
    if let Some(model) = model {
        config.model = model;
    }

    let upload = read_upload(input)?;
    let client = build_client(&config, api_key(&config))?;
    let pipeline = Pipeline::new(config, client)?;

    let extraction = pipeline.process_upload(&upload)?;
    emit_table(&extraction.table, output)?;
    print_summary(
        &input.display().to_string(),
        &extraction.table,
        &extraction.log,
    );
    eprintln!(
        "  {} {} prompt + {} completion tokens",
        "usage:".dimmed(),
        extraction.usage.prompt_tokens,
        extraction.usage.completion_tokens
    );
    Ok(())
}

fn prompt(config: &PipelineConfig, input: &Path) -> Result<()> {
    let upload = read_upload(input)?;
    upload.check(config.max_upload_bytes)?;

    let document = PdfExtractor::extract(&upload.bytes)?;
    let payload = PromptBuilder::build(&document, &ResponseSchema::default());

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", payload.prompt)?;
    Ok(())
}

fn replay(response: &Path, output: &OutputArgs) -> Result<()> {
    let raw = fs::read_to_string(response)
        .with_context(|| format!("failed to read file: {}", response.display()))?;

    let mut log = ProcessingLog::new(None);
    log.add_step("replay_response");
    let table = process_response(&raw, &ResponseSchema::default(), &mut log)?;

    emit_table(&table, output)?;
    print_summary(&response.display().to_string(), &table, &log);
    Ok(())
}

fn emit_table(table: &RowTable, args: &OutputArgs) -> Result<()> {
    match &args.output {
        Some(path) => {
            let format = args
                .format
                .map(ExportFormat::from)
                .unwrap_or_else(|| ExportFormat::from_path(path));
            export::save(table, format, path)?;
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
        None => {
            let format = args.format.map(ExportFormat::from).unwrap_or(ExportFormat::Csv);
            export::write(table, format, io::stdout().lock())?;
        }
    }
    Ok(())
}

fn print_summary(source: &str, table: &RowTable, log: &ProcessingLog) {
    eprintln!(
        "{} {} rows from {}",
        "✓".green().bold(),
        table.len(),
        source
    );
    for warning in &log.warnings {
        let key = warning.key.as_deref().unwrap_or("-");
        eprintln!(
            "  {} [{}] {}: {}",
            "warning".yellow(),
            warning.stage,
            key,
            warning.message
        );
    }
}
