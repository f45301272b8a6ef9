//! Doctor command - validate configuration and show status

use anyhow::Result;
use crosspost_domain::AdapterDefinition;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::args::DoctorArgs;
use crate::config::{AppConfig, TransportKind};
use crate::wiring;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    definitions: CheckResult,
    transport: CheckResult,
    platforms: BTreeMap<String, CheckResult>,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        definitions: CheckResult::error("Not checked"),
        transport: CheckResult::error("Not checked"),
        platforms: BTreeMap::new(),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok(format!(
                "Configuration loaded (log level {})",
                c.general.log_level
            ));
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        let dir = wiring::definitions_dir(config, args.definitions_dir.clone());
        let (check, definitions) = check_definitions(&dir).await;
        report.definitions = check;
        report.transport = check_transport(config);

        for definition in definitions.iter().filter(|d| config.is_enabled(&d.id)) {
            report
                .platforms
                .insert(definition.id.clone(), check_platform(config, definition));
        }
    }

    let checks = [&report.config, &report.definitions, &report.transport];
    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok()) && report.platforms.values().all(CheckResult::is_ok);

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

async fn check_definitions(dir: &Path) -> (CheckResult, Vec<AdapterDefinition>) {
    let loaded = match wiring::load_definitions(dir).await {
        Ok(loaded) => loaded,
        Err(e) => return (CheckResult::error(format!("{:#}", e)), Vec::new()),
    };

    let mut definitions = Vec::new();
    let mut invalid = Vec::new();
    for result in loaded {
        match result {
            Ok(definition) => definitions.push(definition),
            Err(error) => invalid.push(error.to_string()),
        }
    }

    let details = serde_json::json!({
        "dir": dir.display().to_string(),
        "ids": definitions.iter().map(|d| &d.id).collect::<Vec<_>>(),
        "invalid": invalid,
    });

    let check = if definitions.is_empty() && invalid.is_empty() {
        CheckResult::error(format!("No definitions found in {}", dir.display()))
    } else if invalid.is_empty() {
        CheckResult::ok(format!("{} definitions loaded", definitions.len()))
    } else {
        CheckResult::warn(format!(
            "{} definitions loaded, {} invalid",
            definitions.len(),
            invalid.len()
        ))
    };

    (check.with_details(details), definitions)
}

fn check_transport(config: &AppConfig) -> CheckResult {
    match config.general.transport {
        TransportKind::Stub => CheckResult::warn("Stub transport: requests never leave this machine"),
        TransportKind::Http => match wiring::build_transport(config, &[]) {
            Ok(_) => CheckResult::ok(format!(
                "HTTP transport, timeout {}s",
                config.general.request_timeout_secs
            )),
            Err(e) => CheckResult::error(format!("{:#}", e)),
        },
    }
}

fn check_platform(config: &AppConfig, definition: &AdapterDefinition) -> CheckResult {
    let platform = config.platform(&definition.id);

    let Some(env_var) = platform.cookie_env.as_deref() else {
        return CheckResult::warn("No cookie_env configured; relying on the cookie store");
    };

    if platform.cookie().is_some() {
        let domain = platform
            .cookie_domain
            .clone()
            .or_else(|| definition.homepage.host_str().map(str::to_string))
            .unwrap_or_default();
        CheckResult::ok(format!("Cookie: {} (set), domain: {}", env_var, domain))
    } else {
        CheckResult::warn(format!("Cookie: {} (not set)", env_var))
    }
}

fn print_report(report: &DoctorReport) {
    println!("crosspost Doctor Report");
    println!("=======================");
    println!();

    print_check("Config", &report.config);
    print_check("Definitions", &report.definitions);
    print_check("Transport", &report.transport);
    for (id, check) in &report.platforms {
        print_check(&format!("Platform {}", id), check);
    }

    println!();
    println!("{} Overall: {}", symbol(&report.overall), report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to go! Try: crosspost sync --article post.md --all --draft-only");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    println!("{} {}: {}", symbol(&result.status), name, result.message);
}

fn symbol(status: &str) -> &'static str {
    match status {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    }
}
