//! Parsing and formatting of sizes, ratios and throughput values.

use thiserror::Error;

/// One kibibyte
pub const KIB: u64 = 1024;
/// One mebibyte
pub const MIB: u64 = KIB * 1024;
/// One gibibyte
pub const GIB: u64 = MIB * 1024;

/// Errors from parsing command-line or settings values
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid size format string
    #[error("Invalid size format: {0}")]
    InvalidSize(String),

    /// Invalid ratio format string
    #[error("Invalid ratio: {0}")]
    InvalidRatio(String),

    /// Ratio outside [0, 1]
    #[error("Ratio {0} must be between 0 and 1")]
    RatioOutOfRange(String),
}

/// Parse a size string like "4K", "10M", "1G" into bytes
///
/// A bare number is interpreted in `default_unit` bytes, so `parse_size("10", MIB)`
/// is ten mebibytes while `parse_size("10B", MIB)` is ten bytes.
pub fn parse_size(s: &str, default_unit: u64) -> Result<u64, ParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ParseError::InvalidSize("empty string".to_string()));
    }

    let split_pos = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map_or(s.len(), |(i, _)| i);
    let (num_str, suffix) = s.split_at(split_pos);

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidSize(s.to_string()))?;

    let multiplier = match suffix.to_uppercase().as_str() {
        "" => default_unit,
        "B" => 1,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => MIB,
        "G" | "GB" | "GIB" => GIB,
        _ => return Err(ParseError::InvalidSize(s.to_string())),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| ParseError::InvalidSize(format!("{} is too large", s)))
}

/// Parse a comma-separated list of sizes
pub fn parse_size_list(s: &str, default_unit: u64) -> Result<Vec<u64>, ParseError> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse_size(part, default_unit))
        .collect()
}

/// Parse a ratio in [0, 1]
pub fn parse_ratio(s: &str) -> Result<f64, ParseError> {
    let s = s.trim();
    let value: f64 = s
        .parse()
        .map_err(|_| ParseError::InvalidRatio(s.to_string()))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ParseError::RatioOutOfRange(s.to_string()));
    }
    Ok(value)
}

/// Parse a comma-separated list of ratios
pub fn parse_ratio_list(s: &str) -> Result<Vec<f64>, ParseError> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_ratio)
        .collect()
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    if bytes >= GIB && bytes % GIB == 0 {
        format!("{} GiB", bytes / GIB)
    } else if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MiB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{} KiB", bytes / KIB)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a KiB/s throughput as human-readable string
pub fn format_throughput(kib_per_sec: f64) -> String {
    let kib = KIB as f64;
    if kib_per_sec >= kib * kib {
        format!("{:.1} GiB/s", kib_per_sec / (kib * kib))
    } else if kib_per_sec >= kib {
        format!("{:.1} MiB/s", kib_per_sec / kib)
    } else {
        format!("{:.1} KiB/s", kib_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("4K", 1).unwrap(), 4 * KIB);
        assert_eq!(parse_size("4kb", 1).unwrap(), 4 * KIB);
        assert_eq!(parse_size("10M", 1).unwrap(), 10 * MIB);
        assert_eq!(parse_size("1G", 1).unwrap(), GIB);
        assert_eq!(parse_size("512B", MIB).unwrap(), 512);
        assert_eq!(parse_size("2 MiB", 1).unwrap(), 2 * MIB);
    }

    #[test]
    fn test_parse_size_default_unit() {
        assert_eq!(parse_size("10", MIB).unwrap(), 10 * MIB);
        assert_eq!(parse_size("4", KIB).unwrap(), 4 * KIB);
        assert_eq!(parse_size("1024", 1).unwrap(), 1024);
    }

    #[test]
    fn test_parse_size_errors() {
        assert!(parse_size("", KIB).is_err());
        assert!(parse_size("abc", KIB).is_err());
        assert!(parse_size("4X", KIB).is_err());
        assert!(parse_size("-4", KIB).is_err());
        assert!(parse_size("18446744073709551615G", 1).is_err());
    }

    #[test]
    fn test_parse_size_list() {
        let sizes = parse_size_list("4,64, 1M", KIB).unwrap();
        assert_eq!(sizes, vec![4 * KIB, 64 * KIB, MIB]);
        assert!(parse_size_list("", KIB).unwrap().is_empty());
    }

    #[test]
    fn test_parse_ratio() {
        assert_eq!(parse_ratio("0").unwrap(), 0.0);
        assert_eq!(parse_ratio("0.5").unwrap(), 0.5);
        assert_eq!(parse_ratio("1.0").unwrap(), 1.0);
        assert!(matches!(
            parse_ratio("1.5"),
            Err(ParseError::RatioOutOfRange(_))
        ));
        assert!(matches!(
            parse_ratio("-0.1"),
            Err(ParseError::RatioOutOfRange(_))
        ));
        assert!(matches!(parse_ratio("half"), Err(ParseError::InvalidRatio(_))));
    }

    #[test]
    fn test_parse_ratio_list() {
        assert_eq!(parse_ratio_list("0,0.5,1").unwrap(), vec![0.0, 0.5, 1.0]);
        assert!(parse_ratio_list("0,2").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(4 * KIB), "4 KiB");
        assert_eq!(format_size(10 * MIB), "10 MiB");
        assert_eq!(format_size(3 * GIB), "3 GiB");
        assert_eq!(format_size(MIB + KIB), "1025 KiB");
    }

    #[test]
    fn test_format_throughput() {
        assert_eq!(format_throughput(512.0), "512.0 KiB/s");
        assert_eq!(format_throughput(2048.0), "2.0 MiB/s");
        assert_eq!(format_throughput(1024.0 * 1024.0), "1.0 GiB/s");
    }
}
