use tw_runner::*;
use tw_schema::*;
use tw_search::*;
use tw_types::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("🌟 TuneWell Basic Usage Example");

    // Build a synthetic dataset: premium = 2*age + 5*claims + noise-free offset
    let rows = 60;
    let age: Vec<Option<f64>> = (0..rows).map(|i| Some(20.0 + (i % 40) as f64)).collect();
    let claims: Vec<Option<f64>> = (0..rows).map(|i| Some(((i * 3) % 7) as f64)).collect();
    let premium: Vec<Option<f64>> = (0..rows)
        .map(|i| {
            let age = 20.0 + (i % 40) as f64;
            let claims = ((i * 3) % 7) as f64;
            Some(2.0 * age + 5.0 * claims + 10.0)
        })
        .collect();

    let frame = Frame::new()
        .with_column("age", Column::Float(age))?
        .with_column("claims", Column::Float(claims))?
        .with_column("premium", Column::Float(premium))?;
    println!("Built frame with {} rows, {} columns", frame.n_rows(), frame.n_cols());

    // Declare what valid data looks like
    let schema = Schema::new()
        .with(ColumnSpec::float("age").at_least(0.0))
        .with(ColumnSpec::float("claims").at_least(0.0))
        .with(ColumnSpec::float("premium").at_least(0.0));

    // Declare the hyperparameter search space
    let space = SearchSpace::new()
        .add_log_uniform("l2", 1e-6, 10.0)
        .add_flag("fit_intercept");
    println!("Search space has {} parameters", space.parameters.len());

    // Show configuration validation rejecting a bad proposal
    let mut bad = RawConfig::new();
    bad.insert("l2".into(), ParamValue::Float(-1.0));
    if let Err(e) = space.validate(&bad) {
        println!("Validation works: {}", e);
    }

    // Run one trial by hand
    let runner = TrialRunner::new(space.clone(), schema.clone());
    let objective = CrossValidatedRegression::new("premium").with_folds(4);

    let mut raw = RawConfig::new();
    raw.insert("l2".into(), ParamValue::Float(0.01));
    raw.insert("fit_intercept".into(), ParamValue::Bool(true));

    let mut trial = Trial::new(uuid::Uuid::new_v4(), 0);
    let result = runner.run_trial(&mut trial, raw, &frame, &objective);
    println!("Single trial phase: {:?}", trial.phase);
    if let Some(score) = result.score() {
        println!("Single trial R²: {:.4}", score);
    }

    // Run a full Bayesian study
    let dataset = DatasetConfig::new(schema, "premium").with_cv_folds(4);
    let config = StudyConfig::new("premium_model_tuning", space)
        .with_strategy(StrategyKind::Bayesian)
        .with_max_trials(20)
        .with_concurrency(4)
        .with_seed(42)
        .with_dataset(dataset);

    let mut study = Study::new(config);
    let report = study.run(&objective, &frame)?;

    println!(
        "Study finished: {} completed, {} failed",
        report.completed, report.failed
    );
    if let Some(best) = &report.best {
        println!("Best score: {:.4}", best.score().unwrap_or(f64::NAN));
        println!("Best parameters:");
        for (name, value) in &best.parameters {
            println!("  {} = {}", name, value);
        }
    }

    println!("✅ All basic functionality working!");
    Ok(())
}
