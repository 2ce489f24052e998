use anyhow::{Context, Result};
use common::{
    BenchmarkConfig, ErrorResponse, FeatureVector, PredictResponse, ScenarioConfig, Statistics,
};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const PREDICT_ENDPOINT: &str = "/predict";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BenchmarkResult {
    scenario_name: String,
    concurrency: usize,
    num_requests: usize,
    batch_size: usize,
    latency_ms: Statistics,
    throughput_qps: f64,
    records_per_sec: f64,
    total_duration_sec: f64,
    errors: usize,
    error_rate: f64,
    /// Change in the server's `/predict` counter over the scenario.
    server_count_delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FullBenchmarkResult {
    server_url: String,
    dataset_rows: usize,
    metrics_before: BTreeMap<String, i64>,
    metrics_after: BTreeMap<String, i64>,
    results: HashMap<String, BenchmarkResult>,
    timestamp: String,
}

struct BenchmarkClient {
    server_url: String,
    client: reqwest::blocking::Client,
}

impl BenchmarkClient {
    fn new(server_url: String) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { server_url, client })
    }

    fn wait_for_server(&self, timeout_secs: u64) -> Result<()> {
        let start = Instant::now();

        println!("Waiting for server at {}...", self.server_url);

        while start.elapsed().as_secs() < timeout_secs {
            if self.metrics().is_ok() {
                println!("✓ Server is ready!");
                return Ok(());
            }
            std::thread::sleep(Duration::from_secs(2));
        }

        anyhow::bail!("✗ Server failed to start within {}s", timeout_secs)
    }

    fn metrics(&self) -> Result<BTreeMap<String, i64>> {
        let response = self
            .client
            .get(format!("{}/metrics", self.server_url))
            .send()
            .context("Failed to get server metrics")?;

        if !response.status().is_success() {
            anyhow::bail!("Metrics endpoint returned {}", response.status());
        }

        Ok(response.json()?)
    }

    fn predict_count(&self) -> Result<i64> {
        Ok(self.metrics()?.get(PREDICT_ENDPOINT).copied().unwrap_or(0))
    }

    fn predict(&self, records: &[FeatureVector]) -> Result<Vec<f64>> {
        let response = self
            .client
            .post(format!("{}{}", self.server_url, PREDICT_ENDPOINT))
            .json(records)
            .send()
            .context("Failed to send predict request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("Server returned {}: {}", status, error_message(&body));
        }

        let result: PredictResponse = response.json()?;
        if result.predictions.len() != records.len() {
            anyhow::bail!(
                "Expected {} predictions, got {}",
                records.len(),
                result.predictions.len()
            );
        }
        if result.predictions.iter().any(|p| !p.is_finite()) {
            anyhow::bail!("Server returned a non-finite prediction");
        }

        Ok(result.predictions)
    }

    fn warmup(&self, num_iterations: usize, sample: &FeatureVector) -> Result<()> {
        println!("\nWarming up server ({} iterations)...", num_iterations);

        let pb = progress_bar(num_iterations, "{msg} [{bar:40.cyan/blue}] {pos}/{len}")?;
        pb.set_message("Warmup");

        let mut errors = 0;

        for _ in 0..num_iterations {
            if self.predict(std::slice::from_ref(sample)).is_err() {
                errors += 1;
            }
            pb.inc(1);
        }

        pb.finish_with_message("✓ Warmup complete");

        if errors > 0 {
            println!(
                "⚠ Warning: {}/{} warmup requests failed",
                errors, num_iterations
            );
        }

        Ok(())
    }

    fn run_scenario(
        &self,
        scenario: &ScenarioConfig,
        dataset: &[FeatureVector],
    ) -> Result<BenchmarkResult> {
        println!("\n{}", "=".repeat(70));
        println!("Scenario: {}", scenario.name);
        if !scenario.description.is_empty() {
            println!("  {}", scenario.description);
        }
        println!("  Concurrency: {}", scenario.concurrency);
        println!("  Requests: {}", scenario.num_requests);
        println!("  Batch size: {}", scenario.batch_size);
        println!("{}", "=".repeat(70));

        let batches = build_batches(dataset, scenario.num_requests, scenario.batch_size);

        let count_before = self.predict_count()?;
        let errors = Arc::new(AtomicUsize::new(0));
        let latencies = Arc::new(Mutex::new(Vec::with_capacity(batches.len())));

        let pb = progress_bar(
            scenario.num_requests,
            "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )?;
        pb.set_message("Running");

        let start_time = Instant::now();

        // Use rayon to run requests in parallel
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(scenario.concurrency.max(1))
            .build()?;

        pool.install(|| {
            batches.par_iter().for_each(|batch| {
                let request_start = Instant::now();

                match self.predict(batch) {
                    Ok(_) => {
                        let latency = request_start.elapsed().as_secs_f64() * 1000.0;
                        if let Ok(mut samples) = latencies.lock() {
                            samples.push(latency);
                        }
                    }
                    Err(_) => {
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }

                pb.inc(1);
            });
        });

        let total_duration = start_time.elapsed().as_secs_f64();
        pb.finish_with_message("✓ Complete");

        let count_after = self.predict_count()?;

        // Calculate statistics
        let latencies_vec = latencies
            .lock()
            .map_err(|_| anyhow::anyhow!("latency buffer poisoned"))?
            .clone();
        let latency_stats = Statistics::from_samples(&latencies_vec);

        let error_count = errors.load(Ordering::SeqCst);
        let successful_requests = scenario.num_requests - error_count;
        let throughput = successful_requests as f64 / total_duration;
        let error_rate = if scenario.num_requests == 0 {
            0.0
        } else {
            error_count as f64 / scenario.num_requests as f64
        };

        let result = BenchmarkResult {
            scenario_name: scenario.name.clone(),
            concurrency: scenario.concurrency,
            num_requests: scenario.num_requests,
            batch_size: scenario.batch_size,
            latency_ms: latency_stats,
            throughput_qps: throughput,
            records_per_sec: throughput * scenario.batch_size as f64,
            total_duration_sec: total_duration,
            errors: error_count,
            error_rate,
            server_count_delta: count_after - count_before,
        };

        // Print results
        println!("\nResults:");
        println!("  Total duration: {:.2}s", result.total_duration_sec);
        println!("  Throughput: {:.2} req/s ({:.2} records/s)", result.throughput_qps, result.records_per_sec);
        println!("  Latency: {}", result.latency_ms);
        println!("  Errors: {}", result.errors);
        println!("  Error rate: {:.2}%", result.error_rate * 100.0);
        println!("  Server /predict count delta: {}", result.server_count_delta);

        if result.server_count_delta != successful_requests as i64 {
            println!(
                "⚠ Warning: server counted {} predictions for {} successful requests",
                result.server_count_delta, successful_requests
            );
        }

        Ok(result)
    }

    fn run_benchmark(
        &self,
        config: &BenchmarkConfig,
        dataset: &[FeatureVector],
    ) -> Result<FullBenchmarkResult> {
        let metrics_before = self.metrics()?;
        println!("\nServer metrics:");
        println!("{}", serde_json::to_string_pretty(&metrics_before)?);

        // Warmup
        if config.warmup.enabled {
            self.warmup(config.warmup.num_requests, &dataset[0])?;
        }

        // Run scenarios
        let mut results = HashMap::new();

        for scenario in &config.scenarios {
            let result = self.run_scenario(scenario, dataset)?;
            results.insert(scenario.name.clone(), result);
        }

        Ok(FullBenchmarkResult {
            server_url: self.server_url.clone(),
            dataset_rows: dataset.len(),
            metrics_before,
            metrics_after: self.metrics()?,
            results,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// The server's `{"error": ...}` message, or the raw body when it is not one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

fn progress_bar(len: usize, template: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

/// Cycles through the dataset so every request gets `batch_size` rows.
fn build_batches(
    dataset: &[FeatureVector],
    num_requests: usize,
    batch_size: usize,
) -> Vec<Vec<FeatureVector>> {
    (0..num_requests)
        .map(|i| {
            dataset
                .iter()
                .cycle()
                .skip(i * batch_size)
                .take(batch_size)
                .copied()
                .collect()
        })
        .collect()
}

/// Reads up to `limit` feature rows from a CSV with wire-named headers.
/// Extra columns such as the `MedHouseVal` target are ignored.
fn load_dataset(path: &Path, limit: usize) -> Result<Vec<FeatureVector>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open dataset {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.deserialize().take(limit) {
        let row: FeatureVector = record.context("Invalid dataset row")?;
        rows.push(row);
    }
    Ok(rows)
}

fn main() -> Result<()> {
    println!("========================================================================");
    println!("Housing Prediction Benchmark Client");
    println!("========================================================================");

    // Get environment variables
    let server_url = env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let config_path = env::var("BENCH_CONFIG").unwrap_or_else(|_| "config/benchmark.yaml".to_string());
    let results_dir = env::var("RESULTS_DIR").unwrap_or_else(|_| "results".to_string());

    println!("Server URL: {}", server_url);
    println!("Config: {}", config_path);

    // Load benchmark config
    let config = BenchmarkConfig::load(&config_path)
        .context("Failed to load benchmark configuration")?;

    // Load dataset
    let dataset_path = Path::new(&config.dataset.path);
    let mut dataset = if dataset_path.exists() {
        load_dataset(dataset_path, config.dataset.num_samples)?
    } else {
        println!(
            "⚠ Dataset {} not found, using the example record",
            dataset_path.display()
        );
        Vec::new()
    };
    if dataset.is_empty() {
        dataset.push(FeatureVector::example());
    }
    println!("Dataset rows: {}", dataset.len());

    // Create client
    let client = BenchmarkClient::new(server_url)?;

    // Wait for server
    client.wait_for_server(120)?;

    // Run benchmarks
    let results = client.run_benchmark(&config, &dataset)?;

    // Save results
    let output_dir = Path::new(&results_dir);
    fs::create_dir_all(output_dir)?;

    let output_path = output_dir.join(format!(
        "housing-{}.json",
        chrono::Utc::now().format("%Y%m%dT%H%M%SZ")
    ));
    let json = serde_json::to_string_pretty(&results)?;
    fs::write(&output_path, json)?;

    println!("\n========================================================================");
    println!("Benchmark complete!");
    println!("Results saved to: {}", output_path.display());
    println!("========================================================================");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_reads_server_errors() {
        assert_eq!(
            error_message(r#"{"error": "Record 0: missing field 'MedInc'"}"#),
            "Record 0: missing field 'MedInc'"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_build_batches_cycles_dataset() {
        let dataset: Vec<FeatureVector> = (0..3)
            .map(|i| {
                let mut values = FeatureVector::example().to_array();
                values[0] = i as f64;
                FeatureVector::from_array(values)
            })
            .collect();

        let batches = build_batches(&dataset, 2, 2);
        let incomes: Vec<Vec<f64>> = batches
            .iter()
            .map(|b| b.iter().map(|r| r.med_inc).collect())
            .collect();

        assert_eq!(incomes, vec![vec![0.0, 1.0], vec![2.0, 0.0]]);
    }

    #[test]
    fn test_load_dataset_ignores_target_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("california.csv");
        fs::write(
            &path,
            "MedInc,HouseAge,AveRooms,AveBedrms,Population,AveOccup,Latitude,Longitude,MedHouseVal\n\
             8.3252,41.0,6.984127,1.02381,322.0,2.555556,37.88,-122.23,4.526\n\
             8.3014,21.0,6.238137,0.97188,2401.0,2.109842,37.86,-122.22,3.585\n",
        )
        .unwrap();

        let rows = load_dataset(&path, 1).unwrap();
        assert_eq!(rows, vec![FeatureVector::example()]);

        let rows = load_dataset(&path, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].population, 2401.0);
    }
}
