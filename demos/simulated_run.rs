//! Demonstration of a weighted-mean run against the simulated C0-microSD.
//!
//! This example shows how to:
//! 1. Connect a session to a device and check its mode
//! 2. Load IMU samples from a table
//! 3. Offload the windowed weighted means
//! 4. Print the output table and run statistics
//!
//! Run with: cargo run --example simulated_run

use c0_window_host::{
    config::SessionConfig,
    core::AuxiliaryLayout,
    device::{DeviceMode, DeviceSession, MockTransport},
    io::{read_samples, RecordWriter},
    pipeline::WeightedRun,
    telemetry::create_shared_stats,
};

fn synthetic_imu(rows: usize) -> String {
    (0..rows)
        .map(|i| {
            let t = i as f32 / 10.0;
            format!(
                "{:.3},{:.3},{:.3},{:.2},{:.2},{:.2},{:.1},{:.1},{:.1}\n",
                t.sin(),
                t.cos(),
                9.81 + 0.1 * (3.0 * t).sin(),
                0.5 * t.cos(),
                -0.5 * t.sin(),
                0.01 * t,
                22.0,
                -4.0,
                41.5
            )
        })
        .collect()
}

fn main() {
    println!("C0 Window Host - Simulated Run");
    println!("==============================");
    println!();

    let stats = create_shared_stats();
    let mut session = match DeviceSession::connect(MockTransport::new(), SessionConfig::default())
    {
        Ok(session) => session.with_stats(stats.clone()),
        Err(e) => {
            eprintln!("Error connecting: {e}");
            return;
        }
    };

    match session.info() {
        Ok(info) => println!("{info}"),
        Err(e) => {
            eprintln!("Error reading device info: {e}");
            return;
        }
    }
    if let Err(e) = session.require_mode(&DeviceMode::Soc) {
        eprintln!("{e}");
        return;
    }
    println!();

    let input = match read_samples(synthetic_imu(40).as_bytes()) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Error reading samples: {e}");
            return;
        }
    };
    println!("Loaded {} samples", input.len());

    let layout = AuxiliaryLayout::detect(input.max_columns);
    let mut writer = match RecordWriter::in_memory(&layout) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Error creating writer: {e}");
            return;
        }
    };

    let run = WeightedRun::new(8, layout);
    match run.execute(&mut session, &input, &mut writer, &stats) {
        Ok(outcome) => println!(
            "Computed {} windows, wrote {} records",
            outcome.windows, outcome.records
        ),
        Err(e) => {
            eprintln!("Run failed: {e}");
            return;
        }
    }
    println!();

    match writer.finish_to_string() {
        Ok(table) => print!("{table}"),
        Err(e) => eprintln!("Error finishing output: {e}"),
    }
    println!();
    println!("{}", stats.summary());

    if let Err(e) = session.close() {
        eprintln!("Error releasing device: {e}");
    }
}
