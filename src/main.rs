mod cli;

use avcmux::config::{self, Config};
use avcmux::output::write_output;
use avcmux::report::{self, ScanReport};
use avcmux_media::{annexb, mp4, ConversionSession, MovieOptions, VideoParams};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "avcmux=trace,avcmux_media=trace".to_string()
        } else {
            "avcmux=info,avcmux_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            width,
            height,
            fps,
            creation_time,
            json,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let params = VideoParams::new(
                width.unwrap_or(config.video.width),
                height.unwrap_or(config.video.height),
                fps.unwrap_or(config.video.frame_rate),
            );
            convert_file(&input, &output, params, creation_time.as_deref(), &config, json)
        }
        Commands::Scan { input, json } => scan_file(&input, json),
        Commands::Verify { file, json } => verify_file(&file, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("avcmux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn convert_file(
    input: &Path,
    output: &Path,
    params: VideoParams,
    creation_time: Option<&str>,
    config: &Config,
    json: bool,
) -> Result<()> {
    let creation_time = match creation_time {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid creation time: {}", s))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let options = MovieOptions {
        creation_time,
        encoder_name: config.output.encoder_name.clone(),
    };

    let session =
        ConversionSession::new(params, options).map_err(|e| conversion_error(e, input))?;
    tracing::info!(
        "Converting {:?} ({}x{} @ {} fps)",
        input,
        params.width,
        params.height,
        params.frame_rate
    );

    let scan = session
        .scan(input)
        .map_err(|e| conversion_error(e, input))?;

    let summary = write_output(&session, &scan, input, output, config.output.keep_partial)
        .map_err(|e| conversion_error(e, input))?;
    tracing::info!(
        "Wrote {:?}: {} frames ({} sync), {} bytes",
        output,
        summary.total_frame_count,
        summary.sync_frame_count,
        summary.output_bytes
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", report::conversion_text(&summary));
        println!("Output: {}", output.display());
    }
    Ok(())
}

fn conversion_error(e: avcmux_media::Error, input: &Path) -> anyhow::Error {
    let code = e.code();
    anyhow::Error::new(e).context(format!("Failed to convert {:?} (code {})", input, code))
}

fn scan_file(input: &Path, json: bool) -> Result<()> {
    let scan = annexb::scan_path(input)
        .with_context(|| format!("Failed to scan {:?}", input))?;
    let scan_report = ScanReport::from_scan(&scan);

    if json {
        println!("{}", serde_json::to_string_pretty(&scan_report)?);
    } else {
        println!("File: {}", input.display());
        print!("{}", scan_report.to_text());
    }
    Ok(())
}

fn verify_file(file: &Path, json: bool) -> Result<()> {
    let verify_report =
        mp4::verify_file(file).with_context(|| format!("Failed to read {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verify_report)?);
    } else {
        println!("File: {}", file.display());
        print!("{}", report::verify_text(&verify_report));
    }

    if !verify_report.is_ok() {
        anyhow::bail!("{} failed verification", file.display());
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::load_config_or_default(None)?;
            print_config(&config);
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    println!(
        "  Video: {}x{} @ {} fps",
        config.video.width, config.video.height, config.video.frame_rate
    );
    println!("  Encoder name: {}", config.output.encoder_name);
    println!("  Keep partial output: {}", config.output.keep_partial);
}
