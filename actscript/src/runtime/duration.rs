use std::time::Duration;

/// Разбирает литерал длительности: `1d2h3m4s`, `1.5h`, `90`.
///
/// Цифры без единицы в конце считаются секундами. `None` для единицы без
/// числа или нечислового текста.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let mut total = 0.0_f64;
    let mut number = String::new();

    for ch in text.chars() {
        match ch {
            '0'..='9' | '.' => number.push(ch),
            _ => {
                let unit = unit_seconds(ch)?;
                total += number.parse::<f64>().ok()? * unit;
                number.clear();
            }
        }
    }

    if !number.is_empty() {
        total += number.parse::<f64>().ok()?;
    }
    if text.is_empty() || !total.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(total))
}

fn unit_seconds(unit: char) -> Option<f64> {
    match unit {
        'd' => Some(86_400.0),
        'h' => Some(3_600.0),
        'm' => Some(60.0),
        's' => Some(1.0),
        _ => None,
    }
}
