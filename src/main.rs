//! Process census daemon.
//!
//! Polls the process table, records application sessions in SQLite and
//! runs until killed. Log verbosity follows `RUST_LOG` (default `info`).

use env_logger::Env;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = appcensus_lib::run() {
        log::error!("appcensus failed: {e}");
        std::process::exit(1);
    }
}
