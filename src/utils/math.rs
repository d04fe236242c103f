/// Log of zero.
pub const LOG_0: f64 = f64::NEG_INFINITY;
/// Log of one.
pub const LOG_1: f64 = 0.0;
/// Smallest log mass we still distinguish from zero.
pub const LOG_EPSILON: f64 = -36.043_653_389_117_15; // ln(2.2e-16)

/// Computes `ln(exp(x) + exp(y))` without leaving log space.
#[inline]
pub fn log_add(
    x: f64,
    y: f64,
) -> f64 {
    if x == LOG_0 {
        return y;
    }
    if y == LOG_0 {
        return x;
    }
    let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
    hi + (lo - hi).exp().ln_1p()
}

/// Log-sum of an iterator of log values.
pub fn log_sum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().fold(LOG_0, log_add)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn log_add_matches_linear() {
        let v = log_add(2f64.ln(), 3f64.ln());
        assert_approx_eq!(v.exp(), 5.0, 1e-12);
    }

    #[test]
    fn log_add_identity() {
        assert_eq!(log_add(LOG_0, 1.5), 1.5);
        assert_eq!(log_add(-2.0, LOG_0), -2.0);
        assert_eq!(log_add(LOG_0, LOG_0), LOG_0);
    }

    #[test]
    fn log_sum_of_uniform() {
        let v = log_sum(std::iter::repeat(0.25f64.ln()).take(4));
        assert_approx_eq!(v, LOG_1, 1e-12);
    }
}
