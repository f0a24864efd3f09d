use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use phish_verdict::{BatchEntry, Config, EmailMessage, PhishingAnalyzer, ScoringMode, Verdict};
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("phish-verdict")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing risk verdicts for URLs and email messages")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (defaults are used when absent)"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .help("Analyze a single URL")
                .conflicts_with_all(["batch", "email-file", "from"]),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .value_name("FILE")
                .help("Analyze the URLs listed in FILE, one per line")
                .conflicts_with_all(["email-file", "from"]),
        )
        .arg(
            Arg::new("email-file")
                .long("email-file")
                .value_name("FILE")
                .help("Analyze a raw email message (.eml)")
                .conflicts_with("from"),
        )
        .arg(
            Arg::new("from")
                .long("from")
                .value_name("ADDRESS")
                .help("Sender address of the email to analyze"),
        )
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("TEXT")
                .requires("from"),
        )
        .arg(
            Arg::new("body")
                .long("body")
                .value_name("TEXT")
                .requires("from")
                .conflicts_with("body-file"),
        )
        .arg(
            Arg::new("body-file")
                .long("body-file")
                .value_name("FILE")
                .help("Read the email body from FILE")
                .requires("from"),
        )
        .arg(
            Arg::new("reply-to")
                .long("reply-to")
                .value_name("ADDRESS")
                .requires("from"),
        )
        .arg(
            Arg::new("no-model")
                .long("no-model")
                .help("Score URLs with the rule formula even if a model is available")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .help("Skip WHOIS, DNS, TLS and redirect probes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging and print every feature")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let mut config = match load_config(matches.get_one::<String>("config")) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };
    if matches.get_flag("offline") {
        config.probes.enabled = false;
    }
    if matches.get_flag("no-model") {
        config.model.enabled = false;
    }

    let analyzer = match PhishingAnalyzer::from_config(&config) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("Error initializing analyzer: {e:#}");
            process::exit(1);
        }
    };
    if let ScoringMode::TrainedModel(model) = analyzer.scoring_mode() {
        log::debug!("URL scoring uses a trained model with {} columns", model.columns().len());
    }

    let output = Output {
        json: matches.get_flag("json"),
        verbose,
    };

    if let Some(url) = matches.get_one::<String>("url") {
        match analyzer.analyze_url(url).await {
            Ok(verdict) => output.verdict("URL", url, &verdict),
            Err(e) => fail(&e.to_string()),
        }
    } else if let Some(batch_file) = matches.get_one::<String>("batch") {
        let urls = match read_url_list(batch_file) {
            Ok(urls) => urls,
            Err(e) => fail(&format!("Error reading batch file: {e}")),
        };
        match analyzer.analyze_url_batch(&urls).await {
            Ok(entries) => output.batch(&entries),
            Err(e) => fail(&e.to_string()),
        }
    } else if let Some(email_file) = matches.get_one::<String>("email-file") {
        let raw = match std::fs::read_to_string(email_file) {
            Ok(raw) => raw,
            Err(e) => fail(&format!("Error reading email file: {e}")),
        };
        let message = EmailMessage::from_raw(&raw);
        match analyzer.analyze_email(&message) {
            Ok(verdict) => output.verdict("Email", &message.sender, &verdict),
            Err(e) => fail(&e.to_string()),
        }
    } else if let Some(sender) = matches.get_one::<String>("from") {
        let body = match matches.get_one::<String>("body-file") {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(body) => body,
                Err(e) => fail(&format!("Error reading body file: {e}")),
            },
            None => matches.get_one::<String>("body").cloned().unwrap_or_default(),
        };
        let message = EmailMessage {
            subject: matches.get_one::<String>("subject").cloned().unwrap_or_default(),
            body,
            sender: sender.clone(),
            reply_to: matches.get_one::<String>("reply-to").cloned(),
        };
        match analyzer.analyze_email(&message) {
            Ok(verdict) => output.verdict("Email", sender, &verdict),
            Err(e) => fail(&e.to_string()),
        }
    } else {
        eprintln!("Nothing to analyze: pass --url, --batch, --email-file or --from");
        process::exit(2);
    }
}

fn load_config(path: Option<&String>) -> anyhow::Result<Config> {
    match path {
        Some(path) if std::path::Path::new(path).exists() => Config::from_file(path),
        Some(path) => {
            log::warn!("Configuration file '{path}' not found, using default configuration");
            Ok(Config::default())
        }
        None => Ok(Config::default()),
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

/// Non-empty lines that are not `#` comments.
fn read_url_list(path: &str) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn fail(message: &str) -> ! {
    eprintln!("❌ {message}");
    process::exit(1);
}

struct Output {
    json: bool,
    verbose: bool,
}

impl Output {
    fn verdict(&self, kind: &str, subject: &str, verdict: &Verdict) {
        if self.json {
            self.print_json(verdict);
            return;
        }

        println!("🔍 {kind}: {subject}");
        self.verdict_body(verdict);
    }

    fn batch(&self, entries: &[BatchEntry]) {
        if self.json {
            self.print_json(entries);
            return;
        }

        let flagged = entries
            .iter()
            .filter(|e| matches!(e, BatchEntry::Success { verdict, .. } if verdict.is_phishing))
            .count();
        println!("📊 Batch results: {} URLs, {flagged} flagged", entries.len());
        println!("═══════════════════════════════════════");
        for entry in entries {
            match entry {
                BatchEntry::Success { url, verdict } => {
                    println!("🔍 {url}");
                    self.verdict_body(verdict);
                }
                BatchEntry::Error { url, error } => {
                    println!("❌ {url}: {error}");
                }
            }
            println!();
        }
    }

    fn verdict_body(&self, verdict: &Verdict) {
        let marker = if verdict.is_phishing { "🚨" } else { "✅" };
        println!("   Verdict: {marker} {}", verdict.label());
        println!("   Confidence: {:.2}", verdict.confidence);
        println!("   Risk tier: {}", verdict.risk_tier);
        println!("   Model: {}", verdict.model_identifier);

        if !verdict.warnings.is_empty() {
            println!("   ⚠️  Warnings:");
            for warning in &verdict.warnings {
                println!("     • {warning}");
            }
        }

        if self.verbose {
            println!("   Features:");
            for (name, value) in verdict.features.iter() {
                println!("     {name:<26} {value}");
            }
        }
    }

    fn print_json<T: serde::Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => fail(&format!("Error serializing result: {e}")),
        }
    }
}
