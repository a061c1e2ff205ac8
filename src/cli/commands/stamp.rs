//! Stamp command - show effective timestamps.

use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::timestamp::effective_timestamp;

pub fn run_stamp(files: &[PathBuf]) {
    for file in files {
        match effective_timestamp(file) {
            Some(time) => {
                let local: DateTime<Local> = time.into();
                println!("{}  {}", local.format("%Y-%m-%d %H:%M:%S%.9f"), file.display());
            }
            None => println!("{:<29}  {}", "unknown", file.display()),
        }
    }
}
