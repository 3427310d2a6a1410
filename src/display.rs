/// Formats a duration as `HH:MM:SS.mmm`.
pub fn time_str(sec: f64) -> String {
    let ms = (sec.max(0.0) * 1000f64).round() as u64;
    let hours = ms / 3_600_000;
    let minutes = ms % 3_600_000 / 60_000;
    let seconds = ms % 60_000 / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Common name of a DSD sample rate, e.g. `DSD64` for 2.8224 MHz.
pub fn rate_label(sample_rate: u32) -> String {
    const BASE: u32 = 44_100;
    if sample_rate % BASE == 0 && sample_rate >= BASE * 32 {
        format!("DSD{}", sample_rate / BASE)
    } else if sample_rate % 48_000 == 0 && sample_rate >= 48_000 * 32 {
        format!("DSD{} (48k family)", sample_rate / 48_000)
    } else {
        format!("{:.4} MHz", sample_rate as f64 / 1_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(time_str(0.0), "00:00:00.000");
        assert_eq!(time_str(3723.5), "01:02:03.500");
        assert_eq!(time_str(360_000.0), "100:00:00.000");
    }

    #[test]
    fn names_rates() {
        assert_eq!(rate_label(2_822_400), "DSD64");
        assert_eq!(rate_label(11_289_600), "DSD256");
        assert_eq!(rate_label(3_072_000), "DSD64 (48k family)");
        assert_eq!(rate_label(1_000_000), "1.0000 MHz");
    }
}
