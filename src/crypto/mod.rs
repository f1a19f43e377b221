//! Key-agreement overlay: modular exponentiation and the per-exchange
//! Diffie-Hellman state.
//!
//! **This is not real cryptography.** The modulus and generator are tiny,
//! fixed and public (p = 29, g = 5), and only one byte of each public value
//! travels on the wire. The agreement serves as a lightweight liveness /
//! pairing check that gates the "verified proximity" output — an observer
//! can trivially recover the secret or replay the public bytes. It is
//! reproduced exactly as the reference deployment ships it; do not mistake
//! the resulting tag for an authentication primitive.

use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Modular exponentiation: `base^exp mod modulus`.
///
/// Iterative square-and-multiply, O(log exp) multiplications, intermediates
/// widened to u128 so the reduction never overflows. Deterministic for all
/// inputs; `exp == 0` yields `1 % modulus`.
///
/// `modulus` must be greater than 1 (checked in debug builds only — the
/// callers in this crate validate their parameters at configuration time).
pub fn mod_pow(base: u64, exp: u64, modulus: u64) -> u64 {
    debug_assert!(modulus > 1, "mod_pow requires modulus > 1");
    let modulus = modulus as u128;
    let mut result: u128 = 1 % modulus;
    let mut base = base as u128 % modulus;
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result * base) % modulus;
        }
        exp >>= 1;
        base = (base * base) % modulus;
    }
    result as u64
}

/// Public Diffie-Hellman parameters.
///
/// The defaults are the reference deployment's toy values. `private_bound`
/// is the exclusive upper bound of the per-exchange private draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhParams {
    pub prime: u64,
    pub generator: u64,
    pub private_bound: u64,
}

impl Default for DhParams {
    fn default() -> Self {
        Self {
            prime: 29,
            generator: 5,
            private_bound: 100,
        }
    }
}

/// Per-exchange key-agreement state: the private exponent (never
/// transmitted), and the derived public value.
///
/// A fresh instance is drawn at the start of every ranging cycle; the
/// private exponent is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyAgreement {
    #[zeroize(skip)]
    params: DhParams,
    private: u64,
    public: u64,
}

impl KeyAgreement {
    /// Draw a fresh bounded private exponent and derive the public value.
    pub fn generate<R: Rng>(params: DhParams, rng: &mut R) -> Self {
        let private = rng.gen_range(0..params.private_bound);
        Self::with_private(params, private)
    }

    /// Build the state from a known private exponent. Used for deterministic
    /// tests and fixtures; production cycles draw via [`generate`].
    ///
    /// [`generate`]: KeyAgreement::generate
    pub fn with_private(params: DhParams, private: u64) -> Self {
        let public = mod_pow(params.generator, private, params.prime);
        Self {
            params,
            private,
            public,
        }
    }

    /// Low byte of this side's public value, embedded in the first frame
    /// this side transmits.
    pub fn public_byte(&self) -> u8 {
        self.public as u8
    }

    /// Derive the shared secret from the peer's public byte and return its
    /// low byte — the value compared (or embedded) as the authentication tag.
    pub fn shared_secret_byte(&self, peer_public: u8) -> u8 {
        mod_pow(u64::from(peer_public), self.private, self.params.prime) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    /// Brute-force reference: repeated multiplication.
    fn naive_pow(base: u64, exp: u64, modulus: u64) -> u64 {
        let mut acc = 1u64 % modulus;
        for _ in 0..exp {
            acc = (acc as u128 * base as u128 % modulus as u128) as u64;
        }
        acc
    }

    #[test]
    fn test_mod_pow_zero_exponent_is_one() {
        for m in [2u64, 3, 29, 97, 65537] {
            assert_eq!(mod_pow(5, 0, m), 1 % m);
            assert_eq!(mod_pow(0, 0, m), 1 % m);
        }
    }

    #[test]
    fn test_mod_pow_result_below_modulus() {
        for base in 0..20u64 {
            for exp in 0..20u64 {
                for m in [2u64, 7, 29, 256] {
                    assert!(mod_pow(base, exp, m) < m);
                }
            }
        }
    }

    #[test]
    fn test_mod_pow_matches_naive() {
        assert_eq!(mod_pow(5, 3, 29), 9); // 125 mod 29
        for base in 0..12u64 {
            for exp in 0..12u64 {
                for m in [2u64, 5, 29, 101] {
                    assert_eq!(mod_pow(base, exp, m), naive_pow(base, exp, m));
                }
            }
        }
    }

    #[test]
    fn test_mod_pow_large_operands_no_overflow() {
        // Near the u64 limit the square step would overflow without the
        // u128 widening.
        let m = u64::MAX - 58; // arbitrary large modulus
        let r = mod_pow(u64::MAX - 1, 3, m);
        assert!(r < m);
        assert_eq!(r, naive_pow(u64::MAX - 1, 3, m));
    }

    #[test]
    fn test_dh_symmetry() {
        let params = DhParams::default();
        let a = KeyAgreement::with_private(params, 7);
        let b = KeyAgreement::with_private(params, 11);
        assert_eq!(
            a.shared_secret_byte(b.public_byte()),
            b.shared_secret_byte(a.public_byte())
        );
    }

    #[test]
    fn test_dh_symmetry_random_draws() {
        let params = DhParams::default();
        for _ in 0..50 {
            let a = KeyAgreement::generate(params, &mut OsRng);
            let b = KeyAgreement::generate(params, &mut OsRng);
            assert_eq!(
                a.shared_secret_byte(b.public_byte()),
                b.shared_secret_byte(a.public_byte())
            );
        }
    }

    #[test]
    fn test_reference_fixture_privates_7_and_11() {
        // g = 5, p = 29: 5^7 mod 29 = 28, 5^11 mod 29 = 13, shared = 28.
        let params = DhParams::default();
        let a = KeyAgreement::with_private(params, 7);
        let b = KeyAgreement::with_private(params, 11);
        assert_eq!(a.public_byte(), 28);
        assert_eq!(b.public_byte(), 13);
        assert_eq!(a.shared_secret_byte(b.public_byte()), 28);
        assert_eq!(b.shared_secret_byte(a.public_byte()), 28);
    }

    #[test]
    fn test_public_value_fits_one_byte_for_default_params() {
        let params = DhParams::default();
        for private in 0..params.private_bound {
            let ka = KeyAgreement::with_private(params, private);
            assert!(u64::from(ka.public_byte()) < params.prime);
        }
    }
}
