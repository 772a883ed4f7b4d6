//! radio simulation for ooklink

use anyhow::Result;
use colored::Colorize;
use ooklink_sim::{scenarios, SimulationPresets};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "ooklink Radio Simulation".bright_blue().bold());
    println!("{}", "========================".bright_blue());
    println!();

    let test_scenarios = vec![
        ("Good Conditions", SimulationPresets::good_conditions()),
        ("Average Conditions", SimulationPresets::average_conditions()),
        ("Poor Conditions", SimulationPresets::poor_conditions()),
    ];

    for (name, config) in test_scenarios {
        println!("{}", format!("\n>>> Testing: {}", name).bright_green().bold());
        println!("Bandwidth: {} bps", config.bandwidth_bps);
        println!("Packet Loss: {}%", (config.packet_loss * 100.0) as u32);
        println!("Latency: {:?}", config.latency);
        println!();

        scenarios::point_to_point_test(config.clone(), 5).await?;

        scenarios::interleaved_senders_test(config.clone(), 3, 3).await?;

        scenarios::slot_contention_test(config, 3).await?;

        println!("{}", "Test complete!".bright_yellow());
        println!("{}", "-".repeat(50));
    }

    println!("{}", "\n>>> Testing: Extreme Conditions".bright_red().bold());
    let extreme = SimulationPresets::extreme_conditions();
    println!("Bandwidth: {} bps", extreme.bandwidth_bps);
    println!("Packet Loss: {}%", (extreme.packet_loss * 100.0) as u32);
    println!("Latency: {:?}", extreme.latency);

    let report = scenarios::point_to_point_test(extreme, 3).await?;
    if report.delivered < report.attempted {
        println!(
            "{}",
            format!(
                "{} of {} messages exhausted their retry budget",
                report.attempted - report.delivered,
                report.attempted
            )
            .red()
        );
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
