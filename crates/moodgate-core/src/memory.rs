//! Process memory probe for diagnostics. Read-only; nothing in the pipeline
//! reacts to it.

/// Resident set size of the current process in bytes, if the platform exposes it.
#[cfg(target_os = "linux")]
pub fn resident_set_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages = parse_statm_resident(&statm)?;
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages * page_size as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn resident_set_bytes() -> Option<u64> {
    None
}

/// Second field of `/proc/<pid>/statm` (resident pages).
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

/// Human-readable byte count, e.g. `12.4 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statm() {
        assert_eq!(parse_statm_resident("5210 1320 900 12 0 640 0\n"), Some(1320));
        assert_eq!(parse_statm_resident("5210"), None);
        assert_eq!(parse_statm_resident(""), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(13 * 1024 * 1024 + 400 * 1024), "13.4 MiB");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resident_set_is_reported() {
        let rss = resident_set_bytes().unwrap();
        assert!(rss > 0);
    }
}
