use clap::Parser;
use qpsim_driver::{init_tracing, Cli, Command, SimulationDriver, SimulationProfile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli { command, run } = Cli::parse();

    match command {
        Some(Command::Validate { profile }) => {
            let valid = validate(&profile);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Run(run_args)) => {
            init_tracing(run_args.log_format);
            tracing::info!("qpsim starting");
            let driver = SimulationDriver::build(&run_args)?;
            driver.run().await
        }
        None => {
            init_tracing(run.log_format);
            tracing::info!("qpsim starting");
            let driver = SimulationDriver::build(&run)?;
            driver.run().await
        }
    }
}

/// Load and validate a profile, printing every issue found. Returns whether
/// the profile is free of errors (warnings alone still count as valid).
fn validate(path: &std::path::Path) -> bool {
    let profile = match SimulationProfile::load(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("failed to load profile {}: {e}", path.display());
            return false;
        }
    };

    let issues = profile.validate();
    if issues.is_empty() {
        println!("profile {} is valid", path.display());
        return true;
    }

    let mut error_count = 0;
    let mut warning_count = 0;
    for issue in &issues {
        match issue.severity {
            qpsim_domain::config::ConfigSeverity::Error => error_count += 1,
            qpsim_domain::config::ConfigSeverity::Warning => warning_count += 1,
        }
        println!("{issue}");
    }
    println!("{error_count} error(s), {warning_count} warning(s)");
    error_count == 0
}
