//! Thin `env_logger` wiring.
//!
//! The engine itself only ever calls `log::{trace,debug,info,warn,error}!`
//! at its natural telemetry points (splits, flushes, merge-backs, recovery);
//! nothing here is required for that to work. This just gives callers (and
//! the test suite) one place to turn it on with a sensible format.

use env_logger::Builder;
use std::io::Write;

pub fn init_log() {
    let mut builder = Builder::from_default_env();
    builder
        .format_timestamp_secs()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] [{}:{}] {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init()
        .ok();
}
