const NOISE_MARKERS: &[&str] = &["\u{1b}[", "[0m", "[32m", "[33m", "trace", "debug"];

/// Strips log noise the wallet binary interleaves with its error text:
/// colourised log lines, trace/debug chatter and `--` separators. Falls back
/// to the trimmed input when nothing survives the filter.
pub fn extract_error(raw: &str) -> String {
    let relevant = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .filter(|line| {
            let lowered = line.to_ascii_lowercase();
            !NOISE_MARKERS.iter().any(|marker| lowered.contains(marker))
        })
        .collect::<Vec<_>>();

    if relevant.is_empty() {
        raw.trim().to_owned()
    } else {
        relevant.join("\n")
    }
}
