use mxfread::structs::metadata::Rational;

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Wall clock length of `frames` edit units at `rate`.
pub fn duration_str(frames: i64, rate: Rational) -> String {
    if frames < 0 || !rate.is_valid() {
        return "unknown".to_string();
    }
    time_str(frames as f64 / rate.to_f64())
}

/// Parses "num/den" or a whole number.
pub fn parse_rate(text: &str) -> Option<Rational> {
    let rate = match text.split_once('/') {
        Some((num, den)) => Rational::new(num.trim().parse().ok()?, den.trim().parse().ok()?),
        None => Rational::new(text.trim().parse().ok()?, 1),
    };
    rate.is_valid().then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_and_durations() {
        assert_eq!(parse_rate("30000/1001"), Some(Rational::new(30000, 1001)));
        assert_eq!(parse_rate("25"), Some(Rational::new(25, 1)));
        assert_eq!(parse_rate("0/1"), None);
        assert_eq!(parse_rate("fast"), None);
        assert_eq!(duration_str(90_000, Rational::new(25, 1)), "01:00:00.000");
        assert_eq!(duration_str(-1, Rational::new(25, 1)), "unknown");
    }
}
