#![allow(unused_macros)]

//! Development logging, compiled in with the `dev` feature.
//!
//! Targets are prefixed with `ptyspawn::` so embedders can route or silence
//! them independently of their own logging.

macro_rules! dev_logger_macro {
    ($name:ident is $rule_level:ident to $target:expr, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => {
                if std::cfg!(feature = "dev") {
                    (::log::log!(
                        target: $target,
                        ::log::Level::$rule_level,
                        "{}: {}",
                        std::panic::Location::caller(),
                        format_args!($d($d arg)+)
                    ));
                }
            };
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident to $target:expr) => {
        dev_logger_macro!($name is $rule_level to $target, $);
    };
}

dev_logger_macro!(dev_error is Error to "ptyspawn::dev");
dev_logger_macro!(dev_warn is Warn to "ptyspawn::dev");
dev_logger_macro!(dev_info is Info to "ptyspawn::dev");
