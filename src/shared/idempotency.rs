/// Width of archive keys; 13 digits covers epoch milliseconds until the year 2286
pub const ARCHIVE_KEY_WIDTH: usize = 13;

/// Archive key for a reading timestamp
///
/// Keys are zero-padded so that lexicographic key order (what the database
/// uses for `orderBy="$key"`) matches chronological order.
pub fn archive_key(timestamp_ms: i64) -> String {
    format!("{:0width$}", timestamp_ms, width = ARCHIVE_KEY_WIDTH)
}

/// Parse an archive key back into epoch milliseconds
pub fn parse_archive_key(key: &str) -> Option<i64> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

/// Snapshots without their own timestamp are keyed by poll time; this keeps a
/// slow sensor from being archived once per poll with identical values.
pub fn gap_allows_archive(newest_archived_ms: Option<i64>, now_ms: i64, min_gap_ms: i64) -> bool {
    match newest_archived_ms {
        None => true,
        Some(last) => now_ms - last >= min_gap_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_key_is_zero_padded() {
        assert_eq!(archive_key(1704067800000), "1704067800000");
        assert_eq!(archive_key(946684800000), "0946684800000");
        assert_eq!(archive_key(946684800000).len(), ARCHIVE_KEY_WIDTH);
    }

    #[test]
    fn test_archive_key_order_matches_time_order() {
        let earlier = archive_key(999_999_999_999);
        let later = archive_key(1_000_000_000_000);
        assert!(earlier < later);
    }

    #[test]
    fn test_parse_archive_key() {
        assert_eq!(parse_archive_key("0946684800000"), Some(946684800000));
        assert_eq!(parse_archive_key("-1"), None);
        assert_eq!(parse_archive_key("abc"), None);
        assert_eq!(parse_archive_key(""), None);
    }

    #[test]
    fn test_gap_allows_archive() {
        let gap = 1_500_000;
        assert!(gap_allows_archive(None, 1_000, gap));
        assert!(!gap_allows_archive(Some(0), gap - 1, gap));
        assert!(gap_allows_archive(Some(0), gap, gap));
    }
}
