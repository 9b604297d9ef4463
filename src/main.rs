use anyhow::{Context, Result};
use engraft::cli::{
    parse_args, setup_logging, Commands, OutputFormat, PredictArgs, ReconcileArgs, ServeArgs,
    TrainArgs, ValidateArgs,
};
use engraft::config::AppConfig;
use engraft::data::loader::read_canonical_csv;
use engraft::predict::predictor::Predictor;
use engraft::training::trainer::train_and_save;
use engraft::training::TrainingConfig;
use engraft::{DefaultBackend, TrainingBackend};
use tracing::{error, info, warn};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", engraft::info());

    let result = AppConfig::load_or_default(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Reconcile(args) => run_reconcile(config, args),
        Commands::Validate(args) => run_validate(args),
        Commands::Train(args) => run_train(config, args),
        Commands::Predict(args) => run_predict(args),
        Commands::Serve(args) => run_serve(config, args),
    });

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_reconcile(config: AppConfig, args: ReconcileArgs) -> Result<()> {
    let mut pipeline = config.pipeline;
    if let Some(output) = args.output {
        pipeline.output = output;
    }
    if args.report.is_some() {
        pipeline.report = args.report;
    }

    info!("Reconciling {} sources into {:?}", pipeline.sources.len(), pipeline.output);
    let run = engraft::pipeline::run(&pipeline)?;

    let skipped = run.report.skipped();
    if !skipped.is_empty() {
        warn!("Skipped sources: {}", skipped.join(", "));
    }
    info!(
        "Wrote {} rows from {} sources",
        run.dataset.len(),
        run.dataset.provenance().len()
    );
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    let dataset = read_canonical_csv(&args.input)
        .with_context(|| format!("Failed to read {:?}", args.input))?;
    let issues = engraft::validate::validate(dataset.table())?;

    if issues.is_empty() {
        info!("{} rows, no issues", dataset.len());
    } else {
        for issue in &issues {
            warn!("{}", issue);
        }
        info!("{} rows, {} issues", dataset.len(), issues.len());
    }

    if let Some(output) = args.output {
        std::fs::write(&output, serde_json::to_string_pretty(&issues)?)
            .with_context(|| format!("Failed to write {:?}", output))?;
        info!("Issues saved to: {:?}", output);
    }
    Ok(())
}

fn run_train(config: AppConfig, args: TrainArgs) -> Result<()> {
    info!("Starting training...");
    info!("Input file: {:?}", args.input);
    info!("Output directory: {:?}", args.output);

    let mut training = if args.quick {
        TrainingConfig {
            contract: config.training.contract.clone(),
            ..TrainingConfig::quick_test()
        }
    } else {
        config.training
    };
    if let Some(epochs) = args.epochs {
        training.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        training.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        training.learning_rate = learning_rate;
    }
    if let Some(seed) = args.seed {
        training.seed = seed;
    }
    if let Some(test_ratio) = args.test_ratio {
        training.test_ratio = test_ratio;
    }
    if args.no_oversample {
        training.oversample = false;
    }

    let dataset = read_canonical_csv(&args.input)
        .with_context(|| format!("Failed to load data from {:?}", args.input))?;
    info!("Loaded {} records", dataset.len());

    let (result, model_path) =
        train_and_save::<TrainingBackend, _>(&dataset, training, &args.output, Default::default())
            .context("Training failed")?;

    info!("=== Training Results ===");
    info!("Total epochs: {}", result.state.epoch);
    if let Some(loss) = result.state.last_loss() {
        info!("Final training loss: {:.4}", loss);
    }
    info!("Training time: {}", engraft::utils::format_duration(result.duration_secs));
    info!("Test metrics ({} rows):", result.test_rows);
    info!("  AUROC: {:.4}", result.test_metrics.auroc);
    info!("  F1: {:.4}", result.test_metrics.f1);
    info!("  Precision: {:.4}", result.test_metrics.precision);
    info!("  Recall: {:.4}", result.test_metrics.recall);
    info!("  Accuracy: {:.4}", result.test_metrics.accuracy);
    info!("Model saved to: {:?}", model_path);

    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    info!("Starting prediction...");
    info!("Input file: {:?}", args.input);
    info!("Model: {:?}", args.model);

    let predictor = Predictor::<DefaultBackend>::load(&args.model, Default::default())?
        .with_threshold(args.threshold);

    let predictions = predictor.predict_file(&args.input).context("Prediction failed")?;
    predictions.summary.print();

    let contents = match args.format {
        OutputFormat::Csv => predictions.to_csv()?,
        OutputFormat::Json => serde_json::to_string_pretty(&predictions)?,
    };
    std::fs::write(&args.output, contents)
        .with_context(|| format!("Failed to write {:?}", args.output))?;

    info!("Predictions saved to: {:?}", args.output);
    Ok(())
}

fn run_serve(config: AppConfig, args: ServeArgs) -> Result<()> {
    let mut serve = config.serve;
    if let Some(model) = args.model {
        serve.artifacts = model;
    }
    if let Some(host) = args.host {
        serve.host = host;
    }
    if let Some(port) = args.port {
        serve.port = port;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(engraft::serve::serve(&serve))
}
