use clap::Parser;
use colored::*;
use ngx_inspect::cli::{Cli, ColorChoice, Commands, InspectArgs, LexArgs, TreeArgs};
use ngx_inspect::parsers::nginx::{tokenize, Status};
use ngx_inspect::{InspectSettings, NginxConfig, ParsePayload, SemanticSummary};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }
    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Lex(args) => run_lex(args),
        Commands::Parse(args) => run_parse(args, cli.settings.as_deref()),
        Commands::Tree(args) => run_tree(args, cli.settings.as_deref()),
        Commands::Summary(args) => run_summary(args, cli.settings.as_deref()),
        Commands::Structure(args) => run_structure(args, cli.settings.as_deref()),
        Commands::Check(args) => run_check(args, cli.settings.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        process::exit(1);
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

/// Load the settings file (if any), apply flags and run a full parse
fn load(args: &InspectArgs, settings_path: Option<&Path>) -> Result<NginxConfig, String> {
    if !args.input.exists() {
        return Err(format!("File not found: {}", args.input.display()));
    }
    let mut settings = match settings_path {
        Some(path) => InspectSettings::load(path).map_err(|e| e.to_string())?,
        None => InspectSettings::default(),
    };
    args.apply(&mut settings);

    let mut config = NginxConfig::new(&args.input, settings);
    config.full_parse().map_err(|e| e.to_string())?;
    Ok(config)
}

fn run_lex(args: LexArgs) -> Result<(), String> {
    let bytes = fs::read(&args.input)
        .map_err(|e| format!("Failed to read {}: {}", args.input.display(), e))?;
    let text = String::from_utf8_lossy(&bytes);
    let tokens = tokenize(&text, &args.input)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    if args.json {
        let output: Vec<_> = tokens
            .iter()
            .map(|t| serde_json::json!([t.text, t.line, t.quoted]))
            .collect();
        return print_json(&output);
    }
    for token in &tokens {
        let text = if token.quoted {
            format!("{:?}", token.text).yellow()
        } else if token.is_structural() {
            token.text.cyan()
        } else {
            token.text.normal()
        };
        println!("{:>5}  {}", token.line.to_string().dimmed(), text);
    }
    Ok(())
}

fn run_parse(args: InspectArgs, settings: Option<&Path>) -> Result<(), String> {
    let config = load(&args, settings)?;
    let Some(payload) = config.payload() else {
        return Ok(());
    };
    if args.json {
        return print_json(payload);
    }

    for unit in &payload.config {
        let status = match unit.status {
            Status::Ok => "ok".green(),
            Status::Failed => "failed".red(),
        };
        println!(
            "{} [{}] {} statements",
            unit.file.display().to_string().bold(),
            status,
            unit.parsed.len()
        );
        for error in &unit.errors {
            match error.line {
                Some(line) => println!("  {} line {}: {}", "-".red(), line, error.error),
                None => println!("  {} {}", "-".red(), error.error),
            }
        }
    }
    print_status(payload);
    Ok(())
}

fn run_tree(args: TreeArgs, settings: Option<&Path>) -> Result<(), String> {
    let config = load(&args.inspect, settings)?;
    if !args.provenance {
        return print_json(&config.simplify());
    }
    let Some(pass) = config.pass() else {
        return Ok(());
    };
    print_json(&serde_json::json!({
        "files": pass.index.files(),
        "tree": pass.tree,
    }))
}

fn run_summary(args: InspectArgs, settings: Option<&Path>) -> Result<(), String> {
    let config = load(&args, settings)?;
    let summary = config.summary();
    if args.json {
        return print_json(summary);
    }
    print_summary(summary);
    if let Some(payload) = config.payload() {
        print_status(payload);
    }
    Ok(())
}

fn run_structure(args: InspectArgs, settings: Option<&Path>) -> Result<(), String> {
    let config = load(&args, settings)?;
    let map = config.directory_map();
    if args.json {
        return print_json(&map);
    }

    for (dir, listing) in &map {
        match &listing.error {
            Some(error) => println!("{} {}", dir.display().to_string().bold(), error.to_string().red()),
            None => println!("{}", dir.display().to_string().bold()),
        }
        for (file, entry) in &listing.files {
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            match (&entry.info, &entry.error) {
                (_, Some(error)) => println!("  {} {}", name, error.to_string().red()),
                (Some(info), None) => println!(
                    "  {} {} {} bytes",
                    name,
                    info.permissions.dimmed(),
                    info.size
                ),
                (None, None) => println!("  {}", name),
            }
        }
    }
    Ok(())
}

fn run_check(args: InspectArgs, settings: Option<&Path>) -> Result<(), String> {
    let config = load(&args, settings)?;
    let changed = config.needs_reparse();
    let Some(payload) = config.payload() else {
        return Ok(());
    };

    if args.json {
        print_json(&serde_json::json!({
            "status": payload.status,
            "errors": payload.errors,
            "changed": changed,
        }))?;
    } else {
        for error in &payload.errors {
            let location = match error.line {
                Some(line) => format!("{}:{}", error.file.display(), line),
                None => error.file.display().to_string(),
            };
            eprintln!("{}: {} in {}", "error".red(), error.error, location);
        }
        print_status(payload);
        if changed {
            println!("{}", "files changed while parsing".yellow());
        }
    }

    if payload.is_ok() {
        Ok(())
    } else {
        Err(format!("configuration {} has errors", args.input.display()))
    }
}

fn print_status(payload: &ParsePayload) {
    let files = payload.config.len();
    if payload.is_ok() {
        println!("\n{} {} files parsed", "ok:".green().bold(), files);
    } else {
        println!(
            "\n{} {} files parsed, {} errors",
            "failed:".red().bold(),
            files,
            payload.errors.len()
        );
    }
}

fn print_urls(title: &str, urls: &[String]) {
    if urls.is_empty() {
        return;
    }
    println!("{}", title.cyan().bold());
    for url in urls {
        println!("  {}", url);
    }
}

fn print_summary(summary: &SemanticSummary) {
    if summary.is_empty() {
        println!("{}", "Nothing found.".yellow());
        return;
    }

    if !summary.access_logs.is_empty() {
        println!("{}", "Access logs:".cyan().bold());
        for (target, log) in &summary.access_logs {
            let format = log.format.as_deref().unwrap_or("combined");
            let readable = match log.readable {
                Some(true) => "readable".green(),
                Some(false) => "unreadable".red(),
                None => "".normal(),
            };
            println!("  {} ({}) {}", target, format, readable);
        }
    }
    if !summary.error_logs.is_empty() {
        println!("{}", "Error logs:".cyan().bold());
        for (target, log) in &summary.error_logs {
            println!("  {} ({})", target, log.level);
        }
    }
    if !summary.log_formats.is_empty() {
        println!("{}", "Log formats:".cyan().bold());
        for (name, format) in &summary.log_formats {
            println!("  {}: {}", name.bold(), format);
        }
    }

    print_urls("Stub status:", &summary.stub_status_urls);
    print_urls("Plus status (internal):", &summary.plus_status_internal_urls);
    print_urls("Plus status (external):", &summary.plus_status_external_urls);
    print_urls("API (internal):", &summary.api_internal_urls);
    print_urls("API (external):", &summary.api_external_urls);

    if !summary.ssl_certificates.is_empty() {
        println!("{}", "Certificates:".cyan().bold());
        for (path, info) in &summary.ssl_certificates {
            let readable = if info.readable {
                "readable".green()
            } else {
                "unreadable".red()
            };
            println!("  {} {} {}", path.display(), info.permissions.dimmed(), readable);
            if let Some(x509) = &info.x509 {
                println!("    {}", x509.names.join(", ").dimmed());
            }
        }
    }
}
