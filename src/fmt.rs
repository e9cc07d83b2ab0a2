//! Logging macros.
//!
//! Every backend is optional: `log`, `defmt` and `esp32-log` can be enabled
//! independently (or not at all), and the macros expand to nothing when no
//! backend is selected. Arguments are still borrowed in that case so callers
//! do not trip unused-variable warnings.
//!
//! Keep arguments to primitives and `&str`; they have to satisfy both
//! `core::fmt` and `defmt::Format`.

#![allow(unused_macros)]

macro_rules! log_event {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::$level!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x, )*);
        }
    };
}

macro_rules! trace {
    ($($t:tt)*) => { $crate::fmt::log_event!(trace, $($t)*) };
}

macro_rules! debug {
    ($($t:tt)*) => { $crate::fmt::log_event!(debug, $($t)*) };
}

macro_rules! info {
    ($($t:tt)*) => { $crate::fmt::log_event!(info, $($t)*) };
}

macro_rules! warning {
    ($($t:tt)*) => { $crate::fmt::log_event!(warn, $($t)*) };
}

macro_rules! error {
    ($($t:tt)*) => { $crate::fmt::log_event!(error, $($t)*) };
}

pub(crate) use {debug, error, info, log_event, trace, warning as warn};
