use crate::error::CrawlError;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Delay before retry `attempt` (1-based), doubling from `base_ms` and capped at 30 seconds
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor).min(30_000))
}

/// Convert fractional seconds from configuration into a duration.
///
/// Negatives and NaN become zero; values too large for a `Duration` saturate.
pub fn secs_f64(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Replace `path` with the bytes produced by `write`.
///
/// Content goes to a temporary file in the same directory which is then
/// renamed over the target, so readers see either the old file or the new one.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), CrawlError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), CrawlError>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| CrawlError::persistence(dir, e))?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| CrawlError::persistence(path, e))?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut()
        .flush()
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| CrawlError::persistence(path, e))?;
    tmp.persist(path)
        .map_err(|e| CrawlError::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(500, 40), Duration::from_secs(30));
    }

    #[test]
    fn test_secs_f64_clamps_negative() {
        assert_eq!(secs_f64(-1.0), Duration::ZERO);
        assert_eq!(secs_f64(f64::NAN), Duration::ZERO);
        assert_eq!(secs_f64(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn test_secs_f64_saturates_huge_values() {
        assert_eq!(secs_f64(1e20), Duration::MAX);
        assert_eq!(secs_f64(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");

        write_atomic(&path, |w| {
            w.write_all(b"first")
                .map_err(|e| CrawlError::persistence("out.txt", e))
        })
        .unwrap();
        write_atomic(&path, |w| {
            w.write_all(b"second")
                .map_err(|e| CrawlError::persistence("out.txt", e))
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_keeps_old_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "intact").unwrap();

        let result = write_atomic(&path, |w| {
            w.write_all(b"partial")
                .map_err(|e| CrawlError::persistence("out.txt", e))?;
            Err(CrawlError::Serialization("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "intact");
    }
}
