use chrono::Utc;
use log::{error, info, warn};
use std::{fs::OpenOptions, io::Write, time::Duration};
use sysinfo::System;
use tokio::time;

use crate::server::presence::PresenceDirectory;
use crate::server::store::MessageStore;

pub async fn start_performance_logger(
    store: MessageStore,
    presence: PresenceDirectory,
    log_path: &str,
) {
    let mut system = System::new_all();

    // Try to create/open the log file
    let mut file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            error!("Unable to open performance log file '{}': {}", log_path, e);
            return;
        }
    };

    // Write header if file is empty
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        if let Err(e) = writeln!(file, "# Filodiretto Server Performance Log") {
            error!("Failed to write header to performance log: {}", e);
            return;
        }
        if let Err(e) = writeln!(file, "# Timestamp, Live_Connections, Total_Messages, CPU_Usage") {
            error!("Failed to write header to performance log: {}", e);
            return;
        }
        info!("📊 Performance log initialized: {}", log_path);
    }

    loop {
        system.refresh_all();
        let cpu_usage =
            system.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / system.cpus().len() as f32;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        let live_connections = presence.online_count().await;
        let total_messages = match store.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to query messages: {}", e);
                -1
            }
        };

        info!(
            "📊 Performance - Live Connections: {}, Messages: {}, CPU: {:.1}%",
            live_connections, total_messages, cpu_usage
        );

        if let Err(e) = writeln!(
            file,
            "{}, {}, {}, {:.1}%",
            timestamp, live_connections, total_messages, cpu_usage
        ) {
            error!("Failed to write to performance log: {}", e);
        } else if let Err(e) = file.flush() {
            error!("Failed to flush performance log: {}", e);
        }

        time::sleep(Duration::from_secs(120)).await;
    }
}
