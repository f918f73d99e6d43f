use std::io;

pub(crate) fn cerr<Int: Copy + TryInto<libc::c_long>>(res: Int) -> io::Result<Int> {
    match res.try_into() {
        Ok(-1) => Err(io::Error::last_os_error()),
        _ => Ok(res),
    }
}

extern "C" {
    #[cfg_attr(
        any(target_os = "macos", target_os = "ios", target_os = "freebsd"),
        link_name = "__error"
    )]
    #[cfg_attr(
        any(target_os = "openbsd", target_os = "netbsd", target_os = "android"),
        link_name = "__errno"
    )]
    #[cfg_attr(target_os = "linux", link_name = "__errno_location")]
    fn errno_location() -> *mut libc::c_int;
}

pub(crate) fn set_errno(no: libc::c_int) {
    // SAFETY: errno_location is guaranteed to return a valid pointer to the
    // thread-local errno value.
    unsafe { *errno_location() = no };
}

pub(crate) fn sysconf(name: libc::c_int) -> Option<libc::c_long> {
    set_errno(0);
    // SAFETY: sysconf is safe to call with any name value.
    cerr(unsafe { libc::sysconf(name) }).ok()
}

pub(crate) fn was_interrupted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted
}
