/// Cleans untrusted numeric input: absent, NaN and infinite values become 0.0.
#[inline]
pub fn sanitize(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}
