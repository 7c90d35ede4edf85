//! Byte budget for the decoded image cache.

use std::sync::OnceLock;

/// Ceiling for the cache budget (10 MiB).
pub const DEFAULT_CACHE_SIZE: usize = 10 * 1024 * 1024;

/// Compute the cache budget for a process that may use `max_memory` bytes.
///
/// Returns the smaller of [`DEFAULT_CACHE_SIZE`] and a third of `max_memory`,
/// and is zero only when `max_memory` is.
pub fn cache_budget(max_memory: u64) -> usize {
    let third = (max_memory / 3).max(u64::from(max_memory > 0));
    usize::try_from(third).map_or(DEFAULT_CACHE_SIZE, |third| third.min(DEFAULT_CACHE_SIZE))
}

/// Budget derived from the memory available to this machine.
///
/// Memory is probed on the first call only; later calls return the same
/// budget. Falls back to [`DEFAULT_CACHE_SIZE`] when available memory can't
/// be determined.
pub fn default_cache_budget() -> usize {
    static BUDGET: OnceLock<usize> = OnceLock::new();
    *BUDGET.get_or_init(probe_cache_budget)
}

fn probe_cache_budget() -> usize {
    match available_memory() {
        Some(bytes) => {
            let budget = cache_budget(bytes);
            tracing::debug!("Cache budget {budget} bytes ({bytes} bytes available)");
            budget
        }
        None => {
            tracing::debug!("Available memory unknown, using default cache budget");
            DEFAULT_CACHE_SIZE
        }
    }
}

/// Available memory in bytes, as reported by `/proc/meminfo`.
pub fn available_memory() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

fn parse_mem_available(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
    let kib: u64 = line
        .trim_start_matches("MemAvailable:")
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    kib.checked_mul(1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_capped_at_default() {
        assert_eq!(cache_budget(8 * 1024 * 1024 * 1024), DEFAULT_CACHE_SIZE);
    }

    #[test]
    fn test_budget_third_of_small_memory() {
        assert_eq!(cache_budget(9 * 1024 * 1024), 3 * 1024 * 1024);
        assert_eq!(cache_budget(3), 1);
    }

    #[test]
    fn test_budget_zero_only_without_memory() {
        assert_eq!(cache_budget(0), 0);
        assert_eq!(cache_budget(1), 1);
        assert_eq!(cache_budget(2), 1);
    }

    #[test]
    fn test_default_budget_is_stable() {
        let first = default_cache_budget();
        assert!(first > 0 && first <= DEFAULT_CACHE_SIZE);
        assert_eq!(default_cache_budget(), first);
    }

    #[test]
    fn test_budget_boundary() {
        let exact = (DEFAULT_CACHE_SIZE as u64) * 3;
        assert_eq!(cache_budget(exact), DEFAULT_CACHE_SIZE);
        assert_eq!(cache_budget(exact - 3), DEFAULT_CACHE_SIZE - 1);
    }

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "MemTotal:       16314420 kB\nMemFree:         1200000 kB\nMemAvailable:    8000000 kB\n";
        assert_eq!(parse_mem_available(meminfo), Some(8_000_000 * 1024));
        assert_eq!(parse_mem_available("MemTotal: 1 kB\n"), None);
    }
}
