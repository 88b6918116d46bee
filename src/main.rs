// src/main.rs
mod config;
mod drivers;
mod engine;
mod recorder;
mod types;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{arg, value_parser, Arg, Command};
use config::AppConfig;
use drivers::{PlotStyle, PngPlotter};
use types::Mode;
fn cli() -> Command {
    Command::new("potentiostat")
        .about("Drives a DAC/ADC potentiostat and plots the recorded voltammograms")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("error, warn, info, debug or trace")
                .default_value("info")
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Generate the configured waveform, record it and plot the run")
                .arg(arg!(-c --config <FILE> "JSON configuration file").required(true)),
        )
        .subcommand(
            Command::new("plot")
                .about("Re-run the analysis on an existing record file")
                .arg(arg!(<RECORDS> "Line-delimited record file"))
                .arg(arg!(--mode <MODE> "triangular or square").required(true))
                .arg(
                    arg!(--smoothing <FACTOR> "Centre of mass of the exponential smoothing")
                        .value_parser(value_parser!(f64))
                        .default_value("1.0"),
                )
                .arg(arg!(--out <DIR> "Directory for the PNG figures").default_value("plots")),
        )
}
// 日志格式: 时间 | 级别 | 模块 | 消息, debug 级别额外带上文件和行号
fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format(move |buf, record| {
            if level >= log::LevelFilter::Debug {
                writeln!(
                    buf,
                    "{} | {:>7} | {}:{} | {}",
                    buf.timestamp_millis(),
                    record.level(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} | {:>7} | {} | {}",
                    buf.timestamp_millis(),
                    record.level(),
                    record.target(),
                    record.args()
                )
            }
        })
        .init();
}
fn run(config_path: &str) -> Result<()> {
    let config = AppConfig::load(config_path.as_ref())
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let mut plotter = PngPlotter::new(&config.plot_dir, PlotStyle::default());
    engine::run(&config, &mut plotter).context("potentiostat run failed")
}
fn plot(records: &str, mode: &str, smoothing: f64, out: &str) -> Result<()> {
    let mode = Mode::from_str(mode).map_err(|e| anyhow!(e))?;
    if mode == Mode::Disabled {
        return Err(anyhow!("plot needs --mode triangular or --mode square"));
    }
    let mut plotter = PngPlotter::new(PathBuf::from(out), PlotStyle::default());
    let figures = engine::process_records(records.as_ref(), mode, smoothing, &mut plotter)
        .with_context(|| format!("processing {records}"))?;
    log::info!("{figures} figures written to {out}");
    Ok(())
}
// 入口函数
fn main() -> ExitCode {
    let matches = cli().get_matches();
    let level = matches
        .get_one::<String>("log-level")
        .and_then(|l| log::LevelFilter::from_str(l).ok())
        .unwrap_or(log::LevelFilter::Info);
    init_logging(level);
    let result = match matches.subcommand() {
        Some(("run", sub)) => match sub.get_one::<String>("config") {
            Some(path) => run(path),
            None => Err(anyhow!("--config is required")),
        },
        Some(("plot", sub)) => {
            let records = sub.get_one::<String>("RECORDS").map(String::as_str).unwrap_or_default();
            let mode = sub.get_one::<String>("mode").map(String::as_str).unwrap_or_default();
            let smoothing = sub.get_one::<f64>("smoothing").copied().unwrap_or(1.0);
            let out = sub.get_one::<String>("out").map(String::as_str).unwrap_or("plots");
            plot(records, mode, smoothing, out)
        }
        _ => unreachable!(),
    };
    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Exception occurred during run: {e:#}");
            ExitCode::FAILURE
        }
    };
    log::info!("Finishing... {}", Local::now().format("%d/%m/%Y %H:%M:%S"));
    code
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn cli_parses_both_subcommands() {
        cli().debug_assert();
        let matches = cli()
            .try_get_matches_from(["potentiostat", "plot", "run.jsonl", "--mode", "square", "--smoothing", "2.5"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "plot");
        assert_eq!(sub.get_one::<f64>("smoothing"), Some(&2.5));
        assert_eq!(sub.get_one::<String>("out").map(String::as_str), Some("plots"));
        let matches = cli()
            .try_get_matches_from(["potentiostat", "--log-level", "debug", "run", "-c", "cfg.json"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("log-level").map(String::as_str), Some("debug"));
    }
}
