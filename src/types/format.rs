//! Number formatting for I3D attribute text.
//!
//! Every float that reaches the document goes through [`format_g`], which
//! reproduces C `%g` with the default precision of 6 significant digits.
//! Vertex attributes are also quantized through the same text form before
//! deduplication, so two values that print identically are identical.

/// Significant digits used by `%g`.
const PRECISION: i32 = 6;

/// Format a value the way C `printf("%g")` does.
pub fn format_g(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // The exponent must be taken after rounding to the target precision,
    // 999999.5 prints as 1e+06 and not 1000000.
    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

/// Format an f32 with `%g` semantics.
pub fn format_f32(value: f32) -> String {
    format_g(value as f64)
}

/// Format a slice of floats space-separated, e.g. `"1 0 -0.5"`.
pub fn join_g(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| format_f32(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Round a value to the precision it will be written with.
pub fn quantize(value: f32) -> f32 {
    format_f32(value).parse::<f32>().unwrap_or(value)
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_g_fixed() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(-2.5), "-2.5");
        assert_eq!(format_g(0.5), "0.5");
        assert_eq!(format_g(1.0 / 3.0), "0.333333");
        assert_eq!(format_g(100000.0), "100000");
        assert_eq!(format_g(123456.7), "123457");
        assert_eq!(format_g(0.0001), "0.0001");
    }

    #[test]
    fn test_format_g_scientific() {
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(0.00001), "1e-05");
        assert_eq!(format_g(999999.5), "1e+06");
        assert_eq!(format_g(-3.0e-7), "-3e-07");
    }

    #[test]
    fn test_format_negative_zero() {
        assert_eq!(format_g(-0.0), "-0");
    }

    #[test]
    fn test_f32_formatting_is_short() {
        assert_eq!(format_f32(0.1), "0.1");
        assert_eq!(join_g(&[1.0, 0.0, -0.5]), "1 0 -0.5");
    }

    #[test]
    fn test_quantize_is_stable() {
        let q = quantize(0.123456789);
        assert_eq!(format_f32(q), "0.123457");
        assert_eq!(quantize(q), q);
    }
}
