//! CLI tool for the LxMonitor engines (lxmon)

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use lxmon::{Config, Monitor, PowerSnapshot, TelemetrySnapshot};
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use std::time::Duration;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "lxmon")]
#[command(about = "LxMonitor: CPU, memory, disk, network, Bluetooth, GPU and power telemetry from Linux kernel counters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Seconds between samples
    #[arg(short, long, default_value = "1.0", global = true)]
    interval: f64,

    /// Samples to print after calibration (0 = until interrupted)
    #[arg(short, long, default_value = "1", global = true)]
    count: u64,

    /// Output format (json or text)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"], global = true)]
    format: String,

    /// Configuration file (default: ~/.config/lxmon/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// CPU busy percentage
    Cpu,
    /// RAM usage
    Memory,
    /// Network throughput per interface
    Net,
    /// Disk utilisation per physical disk
    Disk,
    /// Bluetooth adapter throughput
    Bt,
    /// GPU busy percentage
    Gpu,
    /// Hottest GPU temperature sensor
    GpuTemp,
    /// Fused power draw
    Power,
    /// Every engine (default)
    All,
    /// Make protected sensor paths readable (secret from LXMON_SECRET)
    Unlock,
    /// Show the detected privilege escalation backend
    Backend,
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::init();

    let json = cli.format == "json";
    let command = cli.command.unwrap_or(Commands::All);

    match command {
        Commands::Unlock => return unlock(json),
        Commands::Backend => {
            let backend = lxmon::privilege::detect_backend();
            if json {
                println!("{}", serde_json::to_string_pretty(&backend)?);
            } else {
                println!("{}", backend);
            }
            return Ok(());
        }
        _ => {}
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let interval = Duration::from_secs_f64(cli.interval.max(0.0));
    let mut monitor = Monitor::from_config(&config);

    // Calibration pass for the delta engines
    sample(&mut monitor, command, None)?;

    let mut printed = 0u64;
    while cli.count == 0 || printed < cli.count {
        std::thread::sleep(interval);
        sample(&mut monitor, command, Some(json))?;
        printed += 1;
    }

    Ok(())
}

/// Poll the engine(s) behind `command`.
///
/// `output` is `None` for the silent calibration pass, otherwise whether to
/// print JSON instead of text.
#[cfg(feature = "cli")]
fn sample(
    monitor: &mut Monitor,
    command: Commands,
    output: Option<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let value = match command {
        Commands::Cpu => {
            let percent = monitor.cpu().get_usage();
            when_text(output, || println!("CPU: {:.1}%", percent));
            serde_json::json!({ "cpu_percent": percent })
        }
        Commands::Memory => {
            let info = monitor.memory().snapshot();
            when_text(output, || {
                println!(
                    "Memory: {:.1}% ({} / {} MB)",
                    info.percent,
                    info.used_kb / 1024,
                    info.total_kb / 1024
                )
            });
            serde_json::to_value(info)?
        }
        Commands::Net => {
            let all = monitor.network().get_all_usage();
            let net = monitor.network();
            let (rx, tx) = (net.rx_mbps(), net.tx_mbps());
            when_text(output, || {
                println!("=== Network ===");
                for (iface, mbps) in &all {
                    println!("  {:<16} {:>10.3} Mbps", iface, mbps);
                }
                println!("  rx {:.3} Mbps  tx {:.3} Mbps", rx, tx);
            });
            serde_json::json!({ "rx_mbps": rx, "tx_mbps": tx, "interfaces": all })
        }
        Commands::Disk => {
            let all = monitor.disk().get_all_usage();
            let mean = monitor.disk().get_usage();
            when_text(output, || {
                println!("=== Disks ===");
                for (label, percent) in &all {
                    println!("  {:<40} {:>5.1}%", label, percent);
                }
                println!("  mean {:.1}%", mean);
            });
            serde_json::json!({ "percent": mean, "disks": all })
        }
        Commands::Bt => {
            let all = monitor.bluetooth().get_all_usage();
            when_text(output, || {
                println!("=== Bluetooth ===");
                for (id, adapter) in &all {
                    println!(
                        "  {} {} [{}] {:.3} Mbps{}",
                        id,
                        adapter.name,
                        adapter.address,
                        adapter.mbps,
                        if adapter.rfkill_blocked { " (blocked)" } else { "" }
                    );
                }
            });
            serde_json::to_value(all)?
        }
        Commands::Gpu => {
            let gpu = monitor.gpu();
            let percent = gpu.get_usage();
            let backend = gpu.backend();
            when_text(output, || println!("GPU: {:.1}% ({})", percent, backend));
            serde_json::json!({ "gpu_percent": percent, "backend": backend })
        }
        Commands::GpuTemp => {
            let temp = monitor.gpu_temperature().max_temperature();
            when_text(output, || match temp {
                Some(c) => println!("GPU temperature: {:.1}°C", c),
                None => println!("GPU temperature: n/a"),
            });
            serde_json::json!({ "gpu_temperature_c": temp })
        }
        Commands::Power => {
            let snap = monitor.power().get_all_usage();
            when_text(output, || print_power_info(&snap));
            serde_json::to_value(snap)?
        }
        Commands::All | Commands::Unlock | Commands::Backend => {
            let snap = monitor.snapshot();
            when_text(output, || print_all(&snap));
            serde_json::to_value(snap)?
        }
    };

    if output == Some(true) {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn when_text(output: Option<bool>, print: impl FnOnce()) {
    if output == Some(false) {
        print();
    }
}

#[cfg(feature = "cli")]
fn print_power_info(power: &PowerSnapshot) {
    println!("=== Power ===");
    println!("Total: {:.2} W ({})", power.total_w, power.source);
    println!(
        "  cpu {:.2}  gpu {:.2}  disk {:.2}  net {:.2}  memory {:.2}  board {:.2}  other {:.2}",
        power.cpu_w,
        power.gpu_w,
        power.disk_w,
        power.net_w,
        power.memory_w,
        power.board_w,
        power.other_w
    );
    if power.has_battery {
        println!(
            "Battery: {} present, {:.2} W (discharge {:.2}, charge {:.2}), {:.0}%{}",
            power.battery_count,
            power.battery_total_w,
            power.battery_discharge_w,
            power.battery_charge_w,
            power.battery_capacity_avg,
            if power.ac_online { ", on AC" } else { "" }
        );
    }
    for (name, watts) in &power.sources {
        println!("  {:<48} {:>8.2} W", name, watts);
    }
    if !power.blocked_sources.is_empty() {
        println!("Blocked (run `lxmon unlock`):");
        for name in &power.blocked_sources {
            println!("  {}", name);
        }
    }
}

#[cfg(feature = "cli")]
fn print_all(snap: &TelemetrySnapshot) {
    println!("=== {} ===", snap.timestamp.format("%Y-%m-%d %H:%M:%S"));
    println!("CPU: {:.1}%", snap.cpu_percent);
    println!("Memory: {:.1}%", snap.memory.percent);
    println!(
        "Network: rx {:.3} Mbps  tx {:.3} Mbps",
        snap.network.rx_mbps, snap.network.tx_mbps
    );
    println!("Disk: {:.1}%", snap.disk_percent);
    for (label, percent) in &snap.disks {
        println!("  {:<40} {:>5.1}%", label, percent);
    }
    let bt: f64 = snap.bluetooth.values().map(|a| a.mbps).sum();
    println!("Bluetooth: {:.3} Mbps", bt);
    match snap.gpu_temperature_c {
        Some(c) => println!("GPU: {:.1}% ({}), {:.1}°C", snap.gpu_percent, snap.gpu_backend, c),
        None => println!("GPU: {:.1}% ({})", snap.gpu_percent, snap.gpu_backend),
    }
    println!("Power: {:.2} W ({})", snap.power.total_w, snap.power.source);
}

#[cfg(feature = "cli")]
fn unlock(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let secret = std::env::var("LXMON_SECRET").ok();
    let result = lxmon::privilege::prepare_access(secret.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.ok {
        println!("Sensor paths unlocked via {}", result.backend);
    } else {
        eprintln!(
            "Unlock via {} failed (code {}): {}",
            result.backend, result.code, result.error
        );
    }

    if result.ok {
        Ok(())
    } else {
        let reason = format!("unlock exited with code {}", result.code);
        Err(lxmon::LxError::CommandFailed(reason).into())
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
