use std::str::FromStr;

use crate::Error;

/// Edge label: the endpoints are known to be ε-similar.
pub const SIMILAR: i32 = -2;
/// Edge label: the endpoints are known to be ε-dissimilar.
pub const NOT_SIMILAR: i32 = -1;

/// The clustering radius `ε = a/b`, kept as the integer squares `a²` and
/// `b²`.
///
/// Structural similarity compares `|N[u] ∩ N[v]|` against
/// `√(|N[u]|·|N[v]|)·ε`, where `N[u]` is the closed neighborhood of `u`.
/// Keeping `ε` as a fraction of integer squares turns every similarity
/// decision into an exact integer comparison; the only floating point
/// operation left is a single square root inside [`Epsilon::cn_lower_bound`]
/// whose result is corrected to the exact integer afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Epsilon {
    eps_a2: u64,
    eps_b2: u64,
}

impl Epsilon {
    /// Creates `ε = a/b`. Requires `0 < a <= b` so that `ε ∈ (0, 1]`.
    pub fn new(a: u32, b: u32) -> Result<Self, Error> {
        if a == 0 || b == 0 || a > b {
            return Err(Error::InvalidEpsilon {
                input: format!("{a}/{b}"),
            });
        }
        Ok(Self {
            eps_a2: u64::from(a) * u64::from(a),
            eps_b2: u64::from(b) * u64::from(b),
        })
    }

    /// True if two vertices with adjacency degrees
    /// `min_degree <= max_degree` can never be ε-similar: even a full
    /// overlap only reaches `√(min/max)`, so the pair is ruled out when
    /// `min/max < ε²`.
    pub fn rules_out(&self, min_degree: usize, max_degree: usize) -> bool {
        min_degree as u128 * u128::from(self.eps_b2) < max_degree as u128 * u128::from(self.eps_a2)
    }

    /// The smallest `c` with `c²·b² >= du·dv·a²` for a vertex pair with
    /// adjacency degrees `du` and `dv`: the number of common closed
    /// neighbors the pair needs to be ε-similar.
    ///
    /// The float square root is only a seed; the value is fixed up with
    /// exact integer products in both directions.
    pub fn cn_lower_bound(&self, du: usize, dv: usize) -> i32 {
        let product = du as u128 * dv as u128 * u128::from(self.eps_a2);
        let reaches = |c: u64| u128::from(c) * u128::from(c) * u128::from(self.eps_b2) >= product;

        let mut c = ((product / u128::from(self.eps_b2)) as f64).sqrt() as u64;
        while !reaches(c) {
            c += 1;
        }
        while c > 0 && reaches(c - 1) {
            c -= 1;
        }
        c as i32
    }
}

impl FromStr for Epsilon {
    type Err = Error;

    /// Parses `"a/b"`; a bare `"a"` is read as `a/1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidEpsilon {
            input: s.to_string(),
        };

        let (a, b) = match s.split_once('/') {
            Some((a, b)) => (
                a.trim().parse::<u32>().map_err(|_| invalid())?,
                b.trim().parse::<u32>().map_err(|_| invalid())?,
            ),
            None => (s.trim().parse::<u32>().map_err(|_| invalid())?, 1),
        };

        Epsilon::new(a, b).map_err(|_| invalid())
    }
}
