use std::sync::Arc;

use agro_core::{ClimateContextId, Commodity, ConfidenceLevel, CropId, FieldId, ForecastError, ForecastHorizon};
use agro_engine::{DataSources, EngineConfig, ForecastEngine, InMemorySources};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

const USAGE: &str = "\
Usage: agro-forecast <snapshot.json> <command> [args...]

Commands:
  score     <crop> <climate-context>
  assess    <crop> <climate-context> [soil-ph]
  yield     <field> <crop> <as-of> <target> [confidence]
  price     <commodity> <as-of> <target>
  profit    <field> <crop> <as-of> <target>
  benchmark <value> <region> <crop-type> <metric> [year]

Dates are YYYY-MM-DD.";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    init_tracing(config.log_json);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let raw = std::fs::read_to_string(&args[0])
        .with_context(|| format!("Failed to read snapshot {}", args[0]))?;
    let sources = Arc::new(InMemorySources::from_json(&raw)?);
    let engine = ForecastEngine::new(DataSources::shared(sources), config)?;

    match run(&engine, &args[1], &args[2..]).await {
        Ok(json) => {
            println!("{}", json);
            Ok(())
        }
        Err(CommandError::Usage(e)) => {
            eprintln!("{:#}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
        Err(CommandError::Forecast(e)) => {
            tracing::error!(kind = e.kind().as_str(), "{}", e);
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Logs go to stderr so stdout stays valid JSON
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

enum CommandError {
    Usage(anyhow::Error),
    Forecast(ForecastError),
}

impl From<ForecastError> for CommandError {
    fn from(e: ForecastError) -> Self {
        CommandError::Forecast(e)
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(e: anyhow::Error) -> Self {
        CommandError::Usage(e)
    }
}

async fn run(engine: &ForecastEngine, command: &str, args: &[String]) -> Result<String, CommandError> {
    match command {
        "score" => {
            let [crop, context] = positional::<2>(args)?;
            to_json(&engine.score(&CropId::new(crop), &ClimateContextId::new(context)).await?)
        }
        "assess" => {
            let [crop, context] = positional::<2>(&args[..args.len().min(2)])?;
            let soil_ph = args.get(2).map(|v| parse::<f64>(v, "soil-ph")).transpose()?;
            let assessment = engine
                .assess(&CropId::new(crop), &ClimateContextId::new(context), soil_ph)
                .await?;
            to_json(&assessment)
        }
        "yield" => {
            let [field, crop, as_of, target] = positional::<4>(&args[..args.len().min(4)])?;
            let confidence = match args.get(4) {
                Some(v) => ConfidenceLevel::new(parse(v, "confidence")?)?,
                None => engine.config().scenario_confidence,
            };
            let forecast = engine
                .forecast_yield(&FieldId::new(field), &CropId::new(crop), horizon(as_of, target)?, confidence)
                .await?;
            to_json(&forecast)
        }
        "price" => {
            let [commodity, as_of, target] = positional::<3>(args)?;
            to_json(&engine.forecast_price(&Commodity::new(commodity), horizon(as_of, target)?).await?)
        }
        "profit" => {
            let [field, crop, as_of, target] = positional::<4>(args)?;
            let forecast = engine
                .forecast_profitability(&FieldId::new(field), &CropId::new(crop), horizon(as_of, target)?)
                .await?;
            to_json(&forecast)
        }
        "benchmark" => {
            let [value, region, crop_type, metric] = positional::<4>(&args[..args.len().min(4)])?;
            let year = args.get(4).map(|v| parse::<i32>(v, "year")).transpose()?;
            let result = engine
                .benchmark_in_year(parse(value, "value")?, region, crop_type, metric, year)
                .await?;
            to_json(&result)
        }
        other => Err(anyhow::anyhow!("Unknown command '{}'", other).into()),
    }
}

fn positional<const N: usize>(args: &[String]) -> Result<[&str; N]> {
    if args.len() != N {
        bail!("Expected {} arguments, got {}", N, args.len());
    }
    let mut out = [""; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.as_str();
    }
    Ok(out)
}

fn parse<T>(raw: &str, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("Invalid {} '{}'", name, raw))
}

fn horizon(as_of: &str, target: &str) -> Result<ForecastHorizon, CommandError> {
    let as_of: NaiveDate = parse(as_of, "as-of date")?;
    let target: NaiveDate = parse(target, "target date")?;
    Ok(ForecastHorizon::new(as_of, target)?)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CommandError> {
    serde_json::to_string_pretty(value)
        .context("Failed to serialize result")
        .map_err(CommandError::Usage)
}
