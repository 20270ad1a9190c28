use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

/// Strips a `sha256:` prefix and surrounding whitespace from a digest and lowercases it,
/// so expected and computed digests compare uniformly.
pub fn format_hash(hash: &str) -> String {
    let hash = hash.trim();
    let hash = hash.strip_prefix("sha256:").unwrap_or(hash);
    hash.trim().to_ascii_lowercase()
}

/// Returns true if every character is a hex digit.
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Operating system token used in download URL templates.
pub fn current_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "mac",
        "windows" => "windows",
        other => other,
    }
}

/// Architecture token used in download URL templates.
pub fn current_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "aarch64",
        "x86" => "x86",
        other => other,
    }
}

/// Compares two dotted version strings component-wise as integers.
///
/// Components that are not plain numbers (or have a non-numeric tail, like `0-rc1`)
/// use their leading digits, and compare as 0 when there are none. Components
/// too large for a `u64` saturate.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = a.split('.').collect();
    let b_parts: Vec<&str> = b.split('.').collect();
    let len = a_parts.len().max(b_parts.len());
    for i in 0..len {
        let a_num = a_parts.get(i).map(|p| leading_number(p)).unwrap_or(0);
        let b_num = b_parts.get(i).map(|p| leading_number(p)).unwrap_or(0);
        match a_num.cmp(&b_num) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn leading_number(part: &str) -> u64 {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u64::MAX)
}

/// Sorts version strings newest first using [`compare_versions`].
pub fn sort_versions(mut versions: Vec<String>) -> Vec<String> {
    versions.sort_by(|a, b| compare_versions(b, a));
    versions
}

/// Formats a byte count with binary units, e.g. `12.3 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, unit)
}

/// Formats a duration compactly: `<1s`, `42s`, `3m7s`, `1h2m`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        "<1s".to_string()
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Escapes `value` for use inside a POSIX double-quoted string.
pub fn posix_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Reverses [`posix_escape`].
pub fn posix_unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '\\' | '"' | '$' | '`') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Escapes `value` for use inside a PowerShell double-quoted string.
pub fn powershell_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '`' | '"' | '$') {
            out.push('`');
        }
        out.push(c);
    }
    out
}

/// Marks a file executable for its owner, group and others. No-op off Unix.
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(windows)]
pub fn is_power_shell() -> bool {
    std::env::var("PSModulePath").is_ok() ||
    std::env::var("PSVersionTable").is_ok() ||
    std::env::var("Pwsh").is_ok()
}
