//! Customer category prediction client
//!
//! Submits one customer to a running prediction API and prints the category.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use custcat_cli::{PredictionApi, API_URL_ENV, DEFAULT_API_URL};
use custcat_types::{category_name, CustomerFeatures};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "custcat-cli")]
#[command(about = "Customer category prediction client", long_about = None)]
#[command(version)]
struct Cli {
    /// Prediction API base URL
    #[arg(long, env = API_URL_ENV, default_value = DEFAULT_API_URL)]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the service category of one customer
    Predict(PredictCommand),
    /// Check that the API is reachable
    Status,
    /// Show API metadata
    Info,
}

#[derive(Args)]
struct PredictCommand {
    /// Region code (1-3)
    #[arg(long)]
    region: i64,
    /// Months as a customer
    #[arg(long)]
    tenure: i64,
    /// Age in years (18-100)
    #[arg(long)]
    age: i64,
    /// Marital status (0 or 1)
    #[arg(long)]
    marital: i64,
    /// Years at current address
    #[arg(long)]
    address: i64,
    /// Household income in thousands
    #[arg(long)]
    income: f64,
    /// Education level (1-5)
    #[arg(long)]
    ed: i64,
    /// Years with current employer
    #[arg(long)]
    employ: i64,
    /// Retired (0 or 1)
    #[arg(long)]
    retire: i64,
    /// Gender (0 or 1)
    #[arg(long)]
    gender: i64,
    /// People in household
    #[arg(long)]
    reside: i64,
}

impl From<PredictCommand> for CustomerFeatures {
    fn from(cmd: PredictCommand) -> Self {
        CustomerFeatures {
            region: cmd.region,
            tenure: cmd.tenure,
            age: cmd.age,
            marital: cmd.marital,
            address: cmd.address,
            income: cmd.income,
            ed: cmd.ed,
            employ: cmd.employ,
            retire: cmd.retire,
            gender: cmd.gender,
            reside: cmd.reside,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let api = PredictionApi::new(cli.api_url);

    match cli.command {
        Commands::Predict(cmd) => handle_predict(&api, cmd.into()).await,
        Commands::Status => print_json(api.status().await?),
        Commands::Info => print_json(api.info().await?),
    }
}

async fn handle_predict(api: &PredictionApi, features: CustomerFeatures) -> Result<()> {
    let payload = match serde_json::to_value(features)? {
        Value::Object(map) => map,
        _ => anyhow::bail!("customer features did not serialize to an object"),
    };

    let response = api.predict(&payload).await?;
    println!("{}", response.message);
    println!("Category ID:   {}", response.prediction);
    println!("Category name: {}", category_name(response.prediction));
    Ok(())
}

fn print_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
