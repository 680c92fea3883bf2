use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use owo_colors::OwoColorize;
use pagewalk::cli::{
    DocumentOptions, OutputFormat, ScrollOptions, export_array, export_documents, export_scroll,
    load_search_client, ping, save_config,
};
use pagewalk::config::load_dotenv;
use pagewalk::json::DocumentFilter;
use std::path::PathBuf;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Walk paginated and streaming sources without loading them into memory
#[derive(Parser)]
#[command(name = "pagewalk", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source connection settings from
    #[arg(short, long, global = true, default_value = ".env")]
    env: PathBuf,

    /// A YAML settings file, read instead of the environment
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test the connection to the search cluster and show its version
    Ping,

    /// Write the connection settings from the environment to a YAML file
    SaveConfig {
        /// The YAML file to write
        file: PathBuf,
    },

    /// Scroll through one or more indices, writing every document
    Scroll {
        /// Indices to search
        #[arg(required = true)]
        index: Vec<String>,

        /// A JSON5 file with the search request body
        #[arg(short, long)]
        query: Option<PathBuf>,

        /// File to write to, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Documents per scroll request, overrides SEARCH_BATCH_SIZE
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Stop after this many documents
        #[arg(short, long)]
        max: Option<u64>,

        /// Drop a document equal to the one written just before it
        #[arg(long)]
        skip_duplicates: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Extract the documents found at a fixed depth of a JSON file
    Documents {
        /// The JSON file to read, e.g. a CouchDB view with include_docs=true
        file: PathBuf,

        /// Depth of the documents, the root container being depth 1
        #[arg(short, long, default_value_t = 3)]
        depth: usize,

        /// Only documents in the array or object held by this property
        #[arg(short, long)]
        property: Option<String>,

        /// Only documents with this field
        #[arg(short, long)]
        require: Option<String>,

        /// Skip documents having this field (inside the required field, if any)
        #[arg(short = 'x', long)]
        exclude: Option<String>,

        /// File to write to, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Stream the first array of a JSON file
    Array {
        /// The JSON file to read
        file: PathBuf,

        /// File to write to, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    load_dotenv(&cli.env)?;

    match cli.command {
        Commands::Ping => {
            let (_, mut client) = load_search_client(cli.config.as_deref())?;
            ping(&mut client)?;
        }
        Commands::SaveConfig { file } => {
            save_config(&file)?;
        }
        Commands::Scroll {
            index,
            query,
            output,
            batch_size,
            max,
            skip_duplicates,
            format,
        } => {
            let (config, client) = load_search_client(cli.config.as_deref())?;
            let options = ScrollOptions {
                indices: index,
                query,
                output,
                batch_size,
                max,
                skip_duplicates,
                format,
            };
            export_scroll(&config, client, &options)?;
        }
        Commands::Documents {
            file,
            depth,
            property,
            require,
            exclude,
            output,
            format,
        } => {
            log::debug!(
                "Filter: property {}, require {}, exclude {}",
                property.as_deref().unwrap_or("-").bright_black(),
                require.as_deref().unwrap_or("-").bright_black(),
                exclude.as_deref().unwrap_or("-").bright_black()
            );
            let options = DocumentOptions {
                input: file,
                depth,
                filter: DocumentFilter {
                    property,
                    required: require,
                    excluded: exclude,
                },
                output,
                format,
            };
            export_documents(&options)?;
        }
        Commands::Array {
            file,
            output,
            format,
        } => {
            export_array(&file, output.as_deref(), format)?;
        }
    }

    Ok(())
}
