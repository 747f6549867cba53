//! Arbitrary-precision Fibonacci engine.
//!
//! Computes F(n) with F(0) = 0, F(1) = 1 by iterative pairwise accumulation
//! on [`BigUint`], so the result is exact at any index. The engine is a pure
//! function: no side effects, no shared state, safe to call concurrently.
//!
//! Range policy (the 0..=1000 bound) is deliberately *not* enforced here —
//! validation belongs at the service boundary, where it can be reported to
//! the caller. The engine itself handles any `u32`.

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Computes the `n`-th Fibonacci number as an unbounded integer.
///
/// Runs `n` big-integer additions (`a, b := b, a + b`); roughly O(n²) digit
/// operations overall since operand size grows linearly with `n`.
///
/// # Examples
///
/// ```
/// use fibserv::engine::fibonacci;
///
/// assert_eq!(fibonacci(0).to_string(), "0");
/// assert_eq!(fibonacci(10).to_string(), "55");
/// ```
pub fn fibonacci(n: u32) -> BigUint {
    let mut a = BigUint::zero();
    let mut b = BigUint::one();

    for _ in 0..n {
        let next = &a + &b;
        a = b;
        b = next;
    }

    a
}

/// Computes F(n) rendered as a base-10 string.
///
/// This is the form the rest of the system traffics in: results are stored
/// and served as exact decimal strings, never as fixed-width numerics.
pub fn fibonacci_decimal(n: u32) -> String {
    fibonacci(n).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_cases() {
        assert_eq!(fibonacci_decimal(0), "0");
        assert_eq!(fibonacci_decimal(1), "1");
        assert_eq!(fibonacci_decimal(2), "1");
    }

    #[test]
    fn known_values() {
        assert_eq!(fibonacci_decimal(10), "55");
        assert_eq!(fibonacci_decimal(20), "6765");
        assert_eq!(fibonacci_decimal(50), "12586269025");
        assert_eq!(
            fibonacci_decimal(100),
            "354224848179261915075"
        );
    }

    #[test]
    fn adjacent_values_satisfy_recurrence() {
        for n in 2..200u32 {
            assert_eq!(fibonacci(n), fibonacci(n - 1) + fibonacci(n - 2));
        }
    }

    #[test]
    fn deterministic() {
        assert_eq!(fibonacci(777), fibonacci(777));
    }

    #[test]
    fn f1000_has_209_digits() {
        // F(1000) overflows every fixed-width type; the decimal rendering
        // must still be exact.
        let s = fibonacci_decimal(1000);
        assert_eq!(s.len(), 209);
        assert_eq!(
            s,
            "43466557686937456435688527675040625802564660517371780402481729089536555417949051890403879840079255169295922593080322634775209689623239873322471161642996440906533187938298969649928516003704476137795166849228875",
        );
    }
}
