//! Sorted neighbor list intersection with an early-exit threshold.
//!
//! Every similarity decision of the clustering engine boils down to the
//! same question: do two sorted adjacency lists share at least
//! `required - 2` elements? The two endpoints of the evaluated edge count
//! as common closed neighbors as well, which is where the constant `2`
//! in all counters below comes from.
//!
//! The scalar kernel is a two-pointer merge that additionally tracks for
//! both sides how many common neighbors are still achievable (`du`/`dv`);
//! once either upper bound drops below the threshold the merge stops. The
//! vectorized kernels skip runs of non-matching elements lane-wide before
//! falling back to the scalar merge for the remainder. All kernels return
//! the same decision for every input; they only differ in speed.
//!
//! Vertex ids are compared in signed 32-bit lanes, which is safe because
//! the graph builder rejects ids outside the `i32` range.

use std::cmp::Ordering;
use std::str::FromStr;

use log::warn;

/// Outcome of a similarity evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Similarity {
    Similar,
    NotSimilar,
}

/// The intersection kernel to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntersectKind {
    /// Two-pointer merge, runs everywhere.
    Scalar,
    /// SSE4.2 pivot skip, four lanes.
    Sse,
    /// AVX2 pivot skip, eight lanes.
    Avx2,
    /// AVX2 galloping merge, no decremental bound.
    Avx2Merge,
}

impl IntersectKind {
    /// The fastest kernel available on this machine.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                return IntersectKind::Avx2;
            }
            if is_x86_feature_detected!("sse4.2") {
                return IntersectKind::Sse;
            }
        }
        IntersectKind::Scalar
    }

    pub fn is_available(self) -> bool {
        match self {
            IntersectKind::Scalar => true,
            #[cfg(target_arch = "x86_64")]
            IntersectKind::Sse => is_x86_feature_detected!("sse4.2"),
            #[cfg(target_arch = "x86_64")]
            IntersectKind::Avx2 | IntersectKind::Avx2Merge => is_x86_feature_detected!("avx2"),
            #[cfg(not(target_arch = "x86_64"))]
            _ => false,
        }
    }
}

impl FromStr for IntersectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scalar" => Ok(IntersectKind::Scalar),
            "sse" => Ok(IntersectKind::Sse),
            "avx2" => Ok(IntersectKind::Avx2),
            "avx2-merge" => Ok(IntersectKind::Avx2Merge),
            _ => Err(format!("unsupported intersection kernel {s}")),
        }
    }
}

type Kernel = fn(&[u32], &[u32], i32) -> Similarity;

/// Dispatches similarity evaluations to one intersection kernel.
///
/// The kernel is selected once at construction; every call goes through a
/// plain function pointer afterwards.
pub struct Intersector {
    kind: IntersectKind,
    kernel: Kernel,
}

impl Intersector {
    pub fn new(kind: IntersectKind) -> Self {
        let kind = if kind.is_available() {
            kind
        } else {
            warn!("intersection kernel {kind:?} not available, falling back to scalar");
            IntersectKind::Scalar
        };

        let kernel: Kernel = match kind {
            IntersectKind::Scalar => scalar,
            #[cfg(target_arch = "x86_64")]
            IntersectKind::Sse => sse,
            #[cfg(target_arch = "x86_64")]
            IntersectKind::Avx2 => avx2,
            #[cfg(target_arch = "x86_64")]
            IntersectKind::Avx2Merge => avx2_merge,
            #[cfg(not(target_arch = "x86_64"))]
            _ => scalar,
        };

        Self { kind, kernel }
    }

    pub fn auto() -> Self {
        Self::new(IntersectKind::detect())
    }

    pub fn kind(&self) -> IntersectKind {
        self.kind
    }

    /// `Similar` iff the closed neighborhoods behind `lu` and `lv` share at
    /// least `required` elements, counting both endpoints themselves.
    pub fn intersect(&self, lu: &[u32], lv: &[u32], required: i32) -> Similarity {
        if required <= 2 {
            // the endpoints' own membership already satisfies the bound
            return Similarity::Similar;
        }
        (self.kernel)(lu, lv, required)
    }
}

/// Two-pointer merge from `(i, j)` onwards, carrying previously accumulated
/// counters. `du`/`dv` are the per-side upper bounds on the final common
/// neighbor count; they decrease on every skipped element.
fn merge_bounded(
    lu: &[u32],
    lv: &[u32],
    mut i: usize,
    mut j: usize,
    mut cn: i32,
    mut du: i32,
    mut dv: i32,
    required: i32,
) -> Similarity {
    while i < lu.len() && j < lv.len() {
        match lu[i].cmp(&lv[j]) {
            Ordering::Less => {
                du -= 1;
                if du < required {
                    return Similarity::NotSimilar;
                }
                i += 1;
            }
            Ordering::Greater => {
                dv -= 1;
                if dv < required {
                    return Similarity::NotSimilar;
                }
                j += 1;
            }
            Ordering::Equal => {
                cn += 1;
                if cn >= required {
                    return Similarity::Similar;
                }
                i += 1;
                j += 1;
            }
        }
    }

    // one side ran dry before the bound was reached
    Similarity::NotSimilar
}

/// Counting merge without the decremental bounds, used as the tail of the
/// galloping kernel.
fn merge_counting(lu: &[u32], lv: &[u32], mut i: usize, mut j: usize, mut cn: i32, required: i32) -> Similarity {
    while i < lu.len() && j < lv.len() {
        match lu[i].cmp(&lv[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                cn += 1;
                if cn >= required {
                    return Similarity::Similar;
                }
                i += 1;
                j += 1;
            }
        }
    }

    Similarity::NotSimilar
}

fn scalar(lu: &[u32], lv: &[u32], required: i32) -> Similarity {
    merge_bounded(
        lu,
        lv,
        0,
        0,
        2,
        lu.len() as i32 + 2,
        lv.len() as i32 + 2,
        required,
    )
}

#[cfg(target_arch = "x86_64")]
fn sse(lu: &[u32], lv: &[u32], required: i32) -> Similarity {
    // SAFETY: the kernel is only selected after sse4.2 was detected
    unsafe { x86::sse(lu, lv, required) }
}

#[cfg(target_arch = "x86_64")]
fn avx2(lu: &[u32], lv: &[u32], required: i32) -> Similarity {
    // SAFETY: the kernel is only selected after avx2 was detected
    unsafe { x86::avx2(lu, lv, required) }
}

#[cfg(target_arch = "x86_64")]
fn avx2_merge(lu: &[u32], lv: &[u32], required: i32) -> Similarity {
    // SAFETY: the kernel is only selected after avx2 was detected
    unsafe { x86::avx2_merge(lu, lv, required) }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::{merge_bounded, merge_counting, Similarity};

    use std::arch::x86_64::*;

    const SSE_LANES: usize = 4;
    const AVX_LANES: usize = 8;

    /// Pivot skip: broadcast the current element of one side and jump over
    /// every element of the other side that compares below it, a full lane
    /// width at a time. Matches can only appear at the lead element of the
    /// surviving window.
    #[target_feature(enable = "sse4.2")]
    pub(super) unsafe fn sse(lu: &[u32], lv: &[u32], required: i32) -> Similarity {
        let mut cn = 2_i32;
        let mut du = lu.len() as i32 + 2;
        let mut dv = lv.len() as i32 + 2;
        let mut i = 0_usize;
        let mut j = 0_usize;

        if lu.len() > SSE_LANES && lv.len() > SSE_LANES {
            loop {
                let pivot = _mm_set1_epi32(lv[j] as i32);
                while i + SSE_LANES < lu.len() {
                    let window = _mm_loadu_si128(lu.as_ptr().add(i).cast());
                    let below = _mm_cmpgt_epi32(pivot, window);
                    let count = (_mm_movemask_epi8(below).count_ones() >> 2) as usize;
                    i += count;
                    du -= count as i32;
                    if du < required {
                        return Similarity::NotSimilar;
                    }
                    if count < SSE_LANES {
                        break;
                    }
                }
                if i + SSE_LANES >= lu.len() {
                    break;
                }

                let pivot = _mm_set1_epi32(lu[i] as i32);
                while j + SSE_LANES < lv.len() {
                    let window = _mm_loadu_si128(lv.as_ptr().add(j).cast());
                    let below = _mm_cmpgt_epi32(pivot, window);
                    let count = (_mm_movemask_epi8(below).count_ones() >> 2) as usize;
                    j += count;
                    dv -= count as i32;
                    if dv < required {
                        return Similarity::NotSimilar;
                    }
                    if count < SSE_LANES {
                        break;
                    }
                }
                if j + SSE_LANES >= lv.len() {
                    break;
                }

                if lu[i] == lv[j] {
                    cn += 1;
                    if cn >= required {
                        return Similarity::Similar;
                    }
                    i += 1;
                    j += 1;
                }
            }
        }

        merge_bounded(lu, lv, i, j, cn, du, dv, required)
    }

    /// Same shape as [`sse`] with eight lanes.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn avx2(lu: &[u32], lv: &[u32], required: i32) -> Similarity {
        let mut cn = 2_i32;
        let mut du = lu.len() as i32 + 2;
        let mut dv = lv.len() as i32 + 2;
        let mut i = 0_usize;
        let mut j = 0_usize;

        if lu.len() > AVX_LANES && lv.len() > AVX_LANES {
            loop {
                let pivot = _mm256_set1_epi32(lv[j] as i32);
                while i + AVX_LANES < lu.len() {
                    let window = _mm256_loadu_si256(lu.as_ptr().add(i).cast());
                    let below = _mm256_cmpgt_epi32(pivot, window);
                    let count = (_mm256_movemask_epi8(below).count_ones() >> 2) as usize;
                    i += count;
                    du -= count as i32;
                    if du < required {
                        return Similarity::NotSimilar;
                    }
                    if count < AVX_LANES {
                        break;
                    }
                }
                if i + AVX_LANES >= lu.len() {
                    break;
                }

                let pivot = _mm256_set1_epi32(lu[i] as i32);
                while j + AVX_LANES < lv.len() {
                    let window = _mm256_loadu_si256(lv.as_ptr().add(j).cast());
                    let below = _mm256_cmpgt_epi32(pivot, window);
                    let count = (_mm256_movemask_epi8(below).count_ones() >> 2) as usize;
                    j += count;
                    dv -= count as i32;
                    if dv < required {
                        return Similarity::NotSimilar;
                    }
                    if count < AVX_LANES {
                        break;
                    }
                }
                if j + AVX_LANES >= lv.len() {
                    break;
                }

                if lu[i] == lv[j] {
                    cn += 1;
                    if cn >= required {
                        return Similarity::Similar;
                    }
                    i += 1;
                    j += 1;
                }
            }
        }

        merge_bounded(lu, lv, i, j, cn, du, dv, required)
    }

    /// Galloping merge for skewed list sizes, counting matches with
    /// `cmpeq` + popcount instead of tracking the decremental bounds.
    ///
    /// When the long list is more than twice the short one, a single short
    /// element is broadcast against an eight-wide window of the long list.
    /// Otherwise two short elements are compared against four long ones in
    /// one all-pairs shot via lane permutations.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn avx2_merge(lu: &[u32], lv: &[u32], required: i32) -> Similarity {
        let (mut lu, mut lv) = (lu, lv);
        if lu.len() > lv.len() {
            std::mem::swap(&mut lu, &mut lv);
        }
        if lu.is_empty() {
            return Similarity::NotSimilar;
        }

        let mut cn = 2_i32;
        let mut i = 0_usize;
        let mut j = 0_usize;

        if lv.len() / lu.len() > 2 {
            if j + AVX_LANES <= lv.len() {
                let mut u_element = _mm256_set1_epi32(lu[i] as i32);
                let mut v_window = _mm256_loadu_si256(lv.as_ptr().add(j).cast());

                loop {
                    let hits = _mm256_cmpeq_epi32(u_element, v_window);
                    cn += (_mm256_movemask_epi8(hits).count_ones() >> 2) as i32;

                    if lu[i] > lv[j + AVX_LANES - 1] {
                        j += AVX_LANES;
                        if j + AVX_LANES > lv.len() {
                            break;
                        }
                        v_window = _mm256_loadu_si256(lv.as_ptr().add(j).cast());
                    } else {
                        i += 1;
                        if i >= lu.len() {
                            break;
                        }
                        u_element = _mm256_set1_epi32(lu[i] as i32);
                    }
                }
            }
        } else if i + AVX_LANES <= lu.len() && j + AVX_LANES <= lv.len() {
            // [u0 ×4, u1 ×4] against [v0..v3, v0..v3] compares every pair
            let pair_rule = _mm256_set_epi32(1, 1, 1, 1, 0, 0, 0, 0);
            let quad_rule = _mm256_set_epi32(3, 2, 1, 0, 3, 2, 1, 0);

            let mut u_pairs = _mm256_permutevar8x32_epi32(
                _mm256_loadu_si256(lu.as_ptr().add(i).cast()),
                pair_rule,
            );
            let mut v_quads = _mm256_permutevar8x32_epi32(
                _mm256_loadu_si256(lv.as_ptr().add(j).cast()),
                quad_rule,
            );

            loop {
                let hits = _mm256_cmpeq_epi32(u_pairs, v_quads);
                cn += (_mm256_movemask_epi8(hits).count_ones() >> 2) as i32;

                let u_last = lu[i + 1];
                let v_last = lv[j + 3];
                match u_last.cmp(&v_last) {
                    std::cmp::Ordering::Greater => j += 4,
                    std::cmp::Ordering::Less => i += 2,
                    std::cmp::Ordering::Equal => {
                        i += 2;
                        j += 4;
                    }
                }
                if i + AVX_LANES > lu.len() || j + AVX_LANES > lv.len() {
                    break;
                }
                u_pairs = _mm256_permutevar8x32_epi32(
                    _mm256_loadu_si256(lu.as_ptr().add(i).cast()),
                    pair_rule,
                );
                v_quads = _mm256_permutevar8x32_epi32(
                    _mm256_loadu_si256(lv.as_ptr().add(j).cast()),
                    quad_rule,
                );
            }
        }

        if cn >= required {
            return Similarity::Similar;
        }
        merge_counting(lu, lv, i, j, cn, required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scalar_intersector() -> Intersector {
        Intersector::new(IntersectKind::Scalar)
    }

    #[test]
    fn trivial_threshold_is_always_similar() {
        let it = scalar_intersector();
        assert_eq!(it.intersect(&[], &[], 2), Similarity::Similar);
        assert_eq!(it.intersect(&[1], &[2], 1), Similarity::Similar);
    }

    #[test]
    fn empty_lists_are_not_similar() {
        let it = scalar_intersector();
        assert_eq!(it.intersect(&[], &[], 3), Similarity::NotSimilar);
        assert_eq!(it.intersect(&[1, 2], &[], 3), Similarity::NotSimilar);
    }

    #[test]
    fn counts_both_endpoints() {
        let it = scalar_intersector();
        // one common element plus the two endpoints
        assert_eq!(it.intersect(&[1, 5], &[2, 5], 3), Similarity::Similar);
        assert_eq!(it.intersect(&[1, 5], &[2, 5], 4), Similarity::NotSimilar);
    }

    #[test]
    fn threshold_met_at_last_element() {
        let it = scalar_intersector();
        assert_eq!(
            it.intersect(&[1, 2, 3], &[1, 2, 3], 5),
            Similarity::Similar
        );
        assert_eq!(
            it.intersect(&[1, 2, 3], &[1, 2, 4], 5),
            Similarity::NotSimilar
        );
    }

    #[test]
    fn exhausted_side_is_not_similar() {
        let it = scalar_intersector();
        assert_eq!(
            it.intersect(&[10], &[1, 2, 3, 10], 4),
            Similarity::NotSimilar
        );
    }

    #[test]
    fn disjoint_lists_exit_early() {
        let it = scalar_intersector();
        let lu: Vec<u32> = (0..100).collect();
        let lv: Vec<u32> = (100..200).collect();
        assert_eq!(it.intersect(&lu, &lv, 3), Similarity::NotSimilar);
    }

    fn random_sorted_list(rng: &mut StdRng, max_len: usize, id_range: u32) -> Vec<u32> {
        let len = rng.gen_range(0..=max_len);
        let mut list: Vec<u32> = (0..len).map(|_| rng.gen_range(0..id_range)).collect();
        list.sort_unstable();
        list.dedup();
        list
    }

    #[test]
    fn simd_kernels_match_scalar() {
        let kinds = [
            IntersectKind::Sse,
            IntersectKind::Avx2,
            IntersectKind::Avx2Merge,
        ];
        let available: Vec<_> = kinds
            .into_iter()
            .filter(|kind| kind.is_available())
            .map(Intersector::new)
            .collect();
        if available.is_empty() {
            return;
        }

        let scalar = scalar_intersector();
        let mut rng = StdRng::seed_from_u64(42);

        for round in 0..2_000 {
            let id_range = if round % 2 == 0 { 64 } else { 4_096 };
            let lu = random_sorted_list(&mut rng, 80, id_range);
            let lv = random_sorted_list(&mut rng, 80, id_range);
            let required = rng.gen_range(3..20);

            let expected = scalar.intersect(&lu, &lv, required);
            for it in &available {
                assert_eq!(
                    it.intersect(&lu, &lv, required),
                    expected,
                    "kernel {:?} disagrees for required={required}, lu={lu:?}, lv={lv:?}",
                    it.kind(),
                );
            }
        }
    }

    #[test]
    fn skewed_lists_match_scalar() {
        let kinds = [IntersectKind::Avx2, IntersectKind::Avx2Merge];
        let available: Vec<_> = kinds
            .into_iter()
            .filter(|kind| kind.is_available())
            .map(Intersector::new)
            .collect();
        if available.is_empty() {
            return;
        }

        let scalar = scalar_intersector();
        let mut rng = StdRng::seed_from_u64(1337);

        for _ in 0..500 {
            let short = random_sorted_list(&mut rng, 10, 512);
            let long = random_sorted_list(&mut rng, 200, 512);
            let required = rng.gen_range(3..12);

            let expected = scalar.intersect(&short, &long, required);
            for it in &available {
                assert_eq!(it.intersect(&short, &long, required), expected);
            }
        }
    }

    #[test]
    fn unavailable_kernel_falls_back_to_scalar() {
        #[cfg(not(target_arch = "x86_64"))]
        {
            let it = Intersector::new(IntersectKind::Avx2);
            assert_eq!(it.kind(), IntersectKind::Scalar);
        }
    }

    #[test]
    fn parses_kind_names() {
        assert_eq!("scalar".parse(), Ok(IntersectKind::Scalar));
        assert_eq!("avx2-merge".parse(), Ok(IntersectKind::Avx2Merge));
        assert!("avx512".parse::<IntersectKind>().is_err());
    }
}
