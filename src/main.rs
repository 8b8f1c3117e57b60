use std::fs::{self, File};
use std::io::BufWriter;

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;

use peril_pricer::config::PricingConfig;
use peril_pricer::export;
use peril_pricer::pipeline::{PipelineReport, PricingRequest, price_request};
use peril_pricer::pricer::{Pricer, SensitivityRow, StressResult, format_currency};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut peril = "typhoon".to_string();
    let mut region = "global".to_string();
    let mut input: Option<String> = None;
    let mut seed_override: Option<u64> = None;
    let mut years_override: Option<u32> = None;
    let mut config_path: Option<String> = None;
    let mut no_tail = false;
    let mut serial = false;
    let mut rows_path: Option<String> = None;
    let mut audit_path: Option<String> = None;
    let mut stress = false;
    let mut sweep = false;
    let mut quiet = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--peril" => peril = value(&args, &mut i, "--peril")?.to_string(),
            "--region" => region = value(&args, &mut i, "--region")?.to_string(),
            "--input" => input = Some(value(&args, &mut i, "--input")?.to_string()),
            "--seed" => {
                seed_override = Some(value(&args, &mut i, "--seed")?.parse().context("--seed requires a u64")?);
            }
            "--years" => {
                years_override = Some(value(&args, &mut i, "--years")?.parse().context("--years requires a u32")?);
            }
            "--config" => config_path = Some(value(&args, &mut i, "--config")?.to_string()),
            "--no-tail" => no_tail = true,
            "--serial" => serial = true,
            "--rows" => rows_path = Some(value(&args, &mut i, "--rows")?.to_string()),
            "--audit" => audit_path = Some(value(&args, &mut i, "--audit")?.to_string()),
            "--stress" => stress = true,
            "--sweep" => sweep = true,
            "--quiet" => quiet = true,
            other => bail!("unknown argument {other:?}"),
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            PricingConfig::from_toml_str(&text).with_context(|| format!("invalid config {path}"))?
        }
        None => PricingConfig::canonical(),
    };
    if let Some(seed) = seed_override {
        config.seed = seed;
    }
    if let Some(years) = years_override {
        config.years = years;
    }
    if no_tail {
        config.include_tail_scenarios = false;
    }
    if serial {
        config.parallel = false;
    }
    config.validate()?;

    let user_input = input.unwrap_or_else(|| format!("{peril} in {region}"));
    let report = price_request(PricingRequest::builtin(&peril, &region, &user_input), &config)?;

    if let Some(path) = &rows_path {
        let file = File::create(path).with_context(|| format!("failed to create {path}"))?;
        export::write_csv(BufWriter::new(file), &report.scenarios.years)?;
        if !quiet {
            println!("Scenario rows → {path}");
        }
    }
    if let Some(path) = &audit_path {
        let file = File::create(path).with_context(|| format!("failed to create {path}"))?;
        report.audit.write_json(BufWriter::new(file))?;
        if !quiet {
            println!("Audit trail {} → {path}", report.audit.process_id());
        }
    }

    let pricer = Pricer::new(config.pricing_params())?;
    let stress_results = if stress {
        pricer.stress_test(&report.scenarios, &config.stress_shocks(), config.seed)?
    } else {
        Vec::new()
    };
    let sweep_rows = if sweep {
        pricer.sensitivity(&report.scenarios, &peril, &config.sweep_ranges()?)?
    } else {
        Vec::new()
    };

    if !quiet {
        print_report(&report);
        if stress {
            print_stress(&stress_results);
        }
        if sweep {
            print_sweep(&sweep_rows);
        }
    }
    Ok(())
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *i += 1;
    match args.get(*i) {
        Some(v) => Ok(v.as_str()),
        None => bail!("{flag} requires a value"),
    }
}

fn print_report(report: &PipelineReport) {
    let r = &report.pricing;
    let summary = report.scenarios.summary();

    // ── Scenarios ─────────────────────────────────────────────────────────────
    println!(
        "\nScenarios: {} years  events={}  zero-loss={}  tail-years={}{}",
        summary.total_scenarios,
        summary.total_events,
        summary.zero_loss_years,
        summary.tail_years,
        if report.scenarios.degraded() { "  (fallback priors)" } else { "" },
    );

    // ── Pricing ───────────────────────────────────────────────────────────────
    println!(
        "\n{:<16} {:>14} {:>6} {:>6} {:>16} {:>16} {:>16} {:>7} {:>10}",
        "Peril", "EL", "CoV", "Load", "Gross", "VaR", "TVaR", "PML", "Level"
    );
    let t = &report.table;
    println!(
        "{:<16} {:>14} {:>6} {:>6} {:>16} {:>16} {:>16} {:>7} {:>10}",
        t.peril, t.expected_loss, t.cov, t.risk_load, t.gross_premium, t.var_99, t.tvar_99, t.pml_ratio, t.risk_level
    );
    println!("\n{}", r.recommendation);

    // ── Sanity checks ─────────────────────────────────────────────────────────
    println!("\n=== Sanity Checks ===");
    for (name, ok) in report.dashboard.validation_checks.entries() {
        println!("  {:<22} {}", name, if ok { "PASS" } else { "FAIL" });
    }
    for alert in &report.dashboard.alerts {
        println!("  ! {alert}");
    }

    println!("\n{}", report.summary);
}

fn print_stress(results: &[StressResult]) {
    println!("\n=== Stress Tests ===");
    println!("{:<20} {:>7} {:>14} {:>16} {:>16} {:>10}", "Shock", "Factor", "EL", "Gross", "TVaR", "Level");
    for s in results {
        println!(
            "{:<20} {:>7.2} {:>14} {:>16} {:>16} {:>10}",
            s.shock.name,
            s.shock.factor,
            format_currency(s.result.expected_loss),
            format_currency(s.result.gross_premium),
            format_currency(s.result.tvar_99),
            s.result.risk_level,
        );
    }
}

fn print_sweep(rows: &[SensitivityRow]) {
    println!("\n=== Sensitivity ===");
    for row in rows {
        let inputs: Vec<String> = row.inputs.iter().map(|(p, v)| format!("{p}={v}")).collect();
        println!(
            "{:<48} load={:.3} gross={:>16} VaR={:>16} TVaR={:>16} {}",
            inputs.join(" "),
            row.risk_load,
            format_currency(row.gross_premium),
            format_currency(row.var_99),
            format_currency(row.tvar_99),
            row.risk_level,
        );
    }
}
