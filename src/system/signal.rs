use std::borrow::Cow;

/// A raw signal number, as accepted by `kill(2)`.
pub type SignalNumber = libc::c_int;

pub(crate) fn signal_fmt(signal: SignalNumber) -> Cow<'static, str> {
    signal_hook::low_level::signal_name(signal)
        .map(|name| name.into())
        .unwrap_or_else(|| format!("unknown signal #{signal}").into())
}
