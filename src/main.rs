//! StockPull CLI - Daily Price Collector
//!
//! Runs the collection stages interactively or inside a Slurm job.

use chrono::Local;
use clap::Parser;
use stockpull::config::{
    CliArgs, Commands, GlobalArgs, JobArgs, JobCommand, LogFormat, ProfileKind, ProxyCommand,
    PullConfig,
};
use stockpull::data::DataLayout;
use stockpull::error::{collect_errors, Result, StockPullError};
use stockpull::net::{HttpTransport, ProxyPool, RequestPacer};
use stockpull::pipeline::{clean_stock_data, DownloadReport, Pipeline};
use stockpull::progress::ProgressReporter;
use stockpull::source::{risk_free_rate, write_risk_free_csv};
use stockpull::system::{JobProfile, SlurmJob};
use std::future::Future;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit status when a run finished but some tickers could not be fetched
const EXIT_PARTIAL: i32 = 2;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_logging(&args.global);

    // Handle result
    match run(args) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &GlobalArgs) {
    let level = if args.quiet {
        "warn"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    // RUST_LOG wins over -v/-q
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

fn run(args: CliArgs) -> Result<i32> {
    // Scheduler helpers need no collection config
    if let Commands::Job(job) = &args.command {
        return cmd_job(job, &args.global);
    }

    let config = PullConfig::from_cli(&args.global)?;

    // Print configuration if verbose
    if args.global.verbose > 0 {
        print_config(&config);
    }

    let progress = if args.global.quiet {
        ProgressReporter::disabled()
    } else {
        ProgressReporter::new()
    };

    handle_command(&args.command, &config, &progress)
}

fn handle_command(command: &Commands, config: &PullConfig, progress: &ProgressReporter) -> Result<i32> {
    match command {
        Commands::Pull => cmd_pull(config, progress),
        Commands::Screen { page_size } => cmd_screen(config, page_size.unwrap_or(config.page_size)),
        Commands::Update { max_days } => {
            cmd_update(config, progress, max_days.unwrap_or(config.max_days_since_update))
        }
        Commands::Download { symbols } => cmd_download(config, progress, symbols),
        Commands::Clean => cmd_clean(config, progress),
        Commands::RiskFree { api_key, output } => cmd_risk_free(config, api_key.as_deref(), output.clone()),
        Commands::Proxies(ProxyCommand::Check) => cmd_proxies_check(config),
        Commands::Proxies(ProxyCommand::Verify { count }) => cmd_proxies_verify(config, *count),
        Commands::Job(_) => Ok(0),
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| StockPullError::config(format!("Failed to create runtime: {}", e)))?;
    Ok(rt.block_on(future))
}

fn report_exit_code(report: &DownloadReport) -> i32 {
    if report.is_complete() {
        0
    } else {
        for (symbol, error) in &report.failed {
            tracing::warn!("Failed: {} ({})", symbol, error);
        }
        EXIT_PARTIAL
    }
}

fn print_download(report: &DownloadReport, progress: &ProgressReporter) {
    let message = format!(
        "{} of {} downloaded, {} failed",
        report.succeeded.len(),
        report.attempted(),
        report.failed.len()
    );
    if report.is_complete() {
        progress.finish_success(&message);
    } else {
        progress.finish_error(&message);
    }
    if progress.is_enabled() {
        progress.summary().print();
    }
}

fn cmd_pull(config: &PullConfig, progress: &ProgressReporter) -> Result<i32> {
    let job = SlurmJob::from_env();
    if job.is_job() {
        tracing::info!("{}", job.banner());
    }

    let transport = HttpTransport::new(config.request_timeout)?;
    let pipeline = Pipeline::new(config, &transport);

    let report = block_on(pipeline.pull(Local::now(), progress))??;

    tracing::info!(
        "Run finished: {} proxies, {} tickers screened, {} refreshed, {} failed",
        report.proxies,
        report.screened,
        report.download.succeeded.len(),
        report.download.failed.len()
    );
    print_download(&report.download, progress);
    Ok(report_exit_code(&report.download))
}

fn cmd_screen(config: &PullConfig, page_size: u32) -> Result<i32> {
    let transport = HttpTransport::new(config.request_timeout)?;
    let pipeline = Pipeline::new(config, &transport);
    pipeline.layout().create_folders()?;

    let now = Local::now();
    let symbols = block_on(async {
        let proxies = pipeline.load_proxies(true).await?;
        pipeline.screen(&proxies, now, page_size).await
    })??;

    println!(
        "{} symbols saved to {}",
        symbols.len(),
        pipeline.layout().ticker_list_path(now.date_naive()).display()
    );
    Ok(0)
}

fn cmd_update(config: &PullConfig, progress: &ProgressReporter, max_days: i64) -> Result<i32> {
    let transport = HttpTransport::new(config.request_timeout)?;
    let pipeline = Pipeline::new(config, &transport);
    pipeline.layout().create_folders()?;

    let report = block_on(async {
        let proxies = pipeline.load_proxies(true).await?;
        pipeline
            .downloader(&proxies, progress)
            .update_stock_data(Local::now(), max_days)
            .await
    })??;

    print_download(&report, progress);
    Ok(report_exit_code(&report))
}

fn cmd_download(config: &PullConfig, progress: &ProgressReporter, symbols: &[String]) -> Result<i32> {
    let symbols: Vec<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();

    let transport = HttpTransport::new(config.request_timeout)?;
    let pipeline = Pipeline::new(config, &transport);
    pipeline.layout().create_folders()?;

    let report = block_on(async {
        let proxies = pipeline.load_proxies(true).await?;
        Ok::<_, StockPullError>(pipeline.downloader(&proxies, progress).download_stock_data(&symbols).await)
    })??;

    print_download(&report, progress);
    Ok(report_exit_code(&report))
}

fn cmd_clean(config: &PullConfig, progress: &ProgressReporter) -> Result<i32> {
    let layout = DataLayout::new(&config.data_dir);

    match clean_stock_data(&layout, Local::now().date_naive(), progress) {
        Ok(report) => {
            progress.finish_success(&format!("{} rows", report.rows));
            println!(
                "{} rows for {} tickers written to {}",
                report.rows,
                report.tickers,
                report.path.display()
            );
            Ok(0)
        }
        Err(e) => {
            progress.finish_error("clean failed");
            Err(e)
        }
    }
}

fn cmd_risk_free(config: &PullConfig, api_key: Option<&str>, output: Option<PathBuf>) -> Result<i32> {
    let api_key = api_key
        .map(str::to_string)
        .or_else(|| config.fred_api_key.clone())
        .ok_or_else(|| StockPullError::config("FRED API key required (--api-key or FRED_API_KEY)"))?;
    let output = output.unwrap_or_else(|| config.data_dir.join("risk_free_rate.csv"));

    let transport = HttpTransport::new(config.request_timeout)?;
    let series = block_on(risk_free_rate(&transport, &api_key))??;
    write_risk_free_csv(&output, &series)?;

    println!("{} observations written to {}", series.len(), output.display());
    Ok(0)
}

fn cmd_proxies_check(config: &PullConfig) -> Result<i32> {
    let mut pool = ProxyPool::from_file(&config.proxy_list)?;
    let start = pool.len();

    let transport = HttpTransport::new(config.request_timeout)?;
    let pacer = RequestPacer::new(config.proxy_check_sleep);
    let removed = block_on(pool.remove_bad_proxies(&transport, &pacer))?;

    println!("=== Proxy Check ===");
    println!("Loaded:      {}", start);
    println!("Responding:  {}", pool.len());
    println!("Removed:     {}", removed);

    if pool.is_empty() {
        return Err(StockPullError::EmptyProxyPool);
    }
    Ok(0)
}

fn cmd_proxies_verify(config: &PullConfig, count: usize) -> Result<i32> {
    let pool = ProxyPool::from_file(&config.proxy_list)?;
    if pool.is_empty() {
        return Err(StockPullError::EmptyProxyPool);
    }

    let transport = HttpTransport::new(config.request_timeout)?;
    let pacer = RequestPacer::new(config.proxy_check_sleep);
    let seen = block_on(pool.verify_ip_addresses(&transport, &pacer, count))?;

    let mut results = Vec::with_capacity(seen.len());
    for (proxy, ip) in seen {
        match &ip {
            Ok(ip) => println!("{:<24} {}", proxy.endpoint(), ip),
            Err(e) => println!("{:<24} FAILED ({})", proxy.endpoint(), e),
        }
        results.push(ip);
    }

    collect_errors(results)?;
    Ok(0)
}

fn cmd_job(command: &JobCommand, global: &GlobalArgs) -> Result<i32> {
    match command {
        JobCommand::Script(args) => {
            print!("{}", build_profile(args, global)?.render());
        }
        JobCommand::Submit(args) => {
            let job_id = build_profile(args, global)?.submit()?;
            println!("Submitted batch job {}", job_id);
        }
        JobCommand::Info => {
            let job = SlurmJob::from_env();
            if !job.is_job() {
                println!("{}", job.banner());
                return Ok(1);
            }
            let json = serde_json::to_string_pretty(&job)?;
            println!("{}", json);
        }
    }
    Ok(0)
}

fn build_profile(args: &JobArgs, global: &GlobalArgs) -> Result<JobProfile> {
    let mut profile = match args.profile {
        ProfileKind::Standard => JobProfile::standard(),
        ProfileKind::Long => JobProfile::long(),
    }
    .partition(args.partition.clone())
    .mail_user(args.mail_user.clone())
    .env_name(args.env_name.clone())
    .work_dir(std::env::current_dir().ok());

    if let Some(ref mem) = args.mem {
        profile = profile.memory(mem)?;
    }
    if let Some(ref time) = args.time {
        profile = profile.time(time)?;
    }

    // Forward the options that locate the dataset
    if let Some(ref path) = global.config {
        profile.command.push(format!("--config={}", path.display()));
    }
    if let Some(ref dir) = global.data_dir {
        profile.command.push(format!("--data-dir={}", dir.display()));
    }
    if let Some(ref path) = global.proxies {
        profile.command.push(format!("--proxies={}", path.display()));
    }

    Ok(profile)
}

fn print_config(config: &PullConfig) {
    println!("=== Configuration ===");
    println!("Data dir:       {:?}", config.data_dir);
    println!("Proxy list:     {:?}", config.proxy_list);
    println!("Screener:       {}", config.screener_id);
    println!("Page size:      {}", config.page_size);
    println!("Screen sleep:   {}", humantime::format_duration(config.screen_sleep));
    println!("Download sleep: {}", humantime::format_duration(config.download_sleep));
    println!("Failure limit:  {}", config.failure_limit);
    println!("Max age (days): {}", config.max_days_since_update);
    println!("Jobs:           {}", config.jobs);
    println!("Timeout:        {}", humantime::format_duration(config.request_timeout));
    println!();
}
