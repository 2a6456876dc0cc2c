//! Leveled logging over stdout/stderr. Debug output is opt-in through the
//! `SANTITHAM_DEBUG` environment variable.

use std::sync::OnceLock;

pub fn debug_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os("SANTITHAM_DEBUG").is_some())
}

macro_rules! log_info {
    ($($arg:tt)*) => {
        println!($($arg)*)
    };
}

macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!($($arg)*)
    };
}

macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::logging::debug_enabled() {
            println!($($arg)*)
        }
    };
}

pub(crate) use {log_debug, log_info, log_warn};
