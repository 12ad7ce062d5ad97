//! Form Rules CLI
//!
//! Validates a schema file and prints the derived validation rules.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use formsync::{builder, rules, FieldDescriptor, LanguageConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "form-rules")]
#[command(about = "Validate form schemas and derive validation rules")]
struct Cli {
    /// Path to a JSON file holding a field-descriptor array
    #[arg(short, long)]
    schema: PathBuf,

    /// Optional language config file (forms.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the schema structure
    Validate,

    /// Print the serialized schema
    Show,

    /// Print the derived rule map
    Rules,

    /// Print the resolved human labels per rule key
    Labels,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(&cli.schema)?;
    let fields: Vec<FieldDescriptor> = serde_json::from_str(&content)?;
    builder::validate_schema(&fields)?;

    let languages = LanguageConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate => {
            println!("✅ {} top-level fields valid", fields.len());
        }
        Commands::Show => {
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        Commands::Rules => {
            let rules = rules::derive_rules(&fields, &languages);
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        Commands::Labels => {
            let rules = rules::derive_rules(&fields, &languages);
            let labels = rules::resolved_attributes(&rules);
            println!("{}", serde_json::to_string_pretty(&labels)?);
        }
    }

    Ok(())
}
