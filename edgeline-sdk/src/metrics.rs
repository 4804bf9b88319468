//! Process resource figures for the `/metrics` handler, taken from
//! the kernel's per-process accounting.

use serde_derive::Serialize;

const PAGE_SIZE: u64 = 4096;
const CLK_TCK: f64 = 100.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metrics {
    /// Resident set size, in bytes.
    #[serde(rename = "Alloc")]
    pub alloc: u64,
    /// Total program size, in bytes.
    #[serde(rename = "Heap")]
    pub heap: u64,
    /// User plus system CPU time, in seconds.
    #[serde(rename = "CPU")]
    pub cpu: f64,
}

fn parse_statm(contents: &str) -> (u64, u64) {
    let mut fields = contents.split_whitespace();
    let size = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let resident = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);

    (size, resident)
}

fn parse_stat_cpu(contents: &str) -> f64 {
    // The comm field may contain spaces; fields count from the
    // closing paren. utime and stime are the 14th and 15th fields of
    // the full line, so the 12th and 13th after the paren.

    let rest = match contents.rsplit_once(')') {
        Some((_, rest)) => rest,
        None => return 0.0,
    };
    let fields: Vec<_> = rest.split_whitespace().collect();
    let utime: f64 = fields
        .get(11)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let stime: f64 = fields
        .get(12)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);

    (utime + stime) / CLK_TCK
}

/// Snapshots the current process figures. Fields the kernel won't
/// reveal read as zero.
pub fn collect() -> Metrics {
    let (size, resident) = std::fs::read_to_string("/proc/self/statm")
        .map(|s| parse_statm(&s))
        .unwrap_or((0, 0));
    let cpu = std::fs::read_to_string("/proc/self/stat")
        .map(|s| parse_stat_cpu(&s))
        .unwrap_or(0.0);

    Metrics {
        alloc: resident * PAGE_SIZE,
        heap: size * PAGE_SIZE,
        cpu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statm_parse() {
        assert_eq!(parse_statm("2100 480 330 10 0 560 0\n"), (2100, 480));
        assert_eq!(parse_statm(""), (0, 0));
    }

    #[test]
    fn test_stat_parse() {
        // A comm field with spaces and parens must not throw the
        // field count off.

        let line = "1234 (dev (svc)) S 1 1 1 0 -1 4194560 500 0 0 0 \
                    250 150 0 0 20 0 8 0 123456 100000 480 18446744073709551615";

        assert!((parse_stat_cpu(line) - 4.0).abs() < f64::EPSILON);
        assert_eq!(parse_stat_cpu("garbage"), 0.0);
    }

    #[test]
    fn test_collect() {
        let m = collect();

        // On Linux these are live numbers; elsewhere they read zero.
        assert!(m.cpu >= 0.0);
        assert!(m.alloc <= m.heap || m.heap == 0);

        let json = serde_json::to_value(&m).unwrap();

        assert!(json.get("Alloc").is_some());
        assert!(json.get("Heap").is_some());
        assert!(json.get("CPU").is_some());
    }
}
