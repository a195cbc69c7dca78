//! # Preferential Attachment
//!
//! A joining peer picks its neighbors with probability proportional to
//! their current degree, which over many joins produces the hub-heavy,
//! approximately power-law topology that makes gossip diffusion fast.
//!
//! Selection is inverse-CDF sampling without replacement: each round
//! normalizes the remaining candidates' degrees into cumulative bands over
//! `[0, 1)`, draws one uniform `r`, and takes the first band containing
//! it. A zero total degree falls back to uniform bands, and `r` landing
//! past the last band (floating-point shortfall) takes the last
//! candidate. Degrees are sampled once at attachment time; there is no
//! rebalancing.

use rand::Rng;

use crate::config::MAX_ATTACHMENT_LINKS;
use crate::identity::NodeId;

/// Number of links a joining peer should establish: uniform in
/// `1..=MAX_ATTACHMENT_LINKS`, capped by the candidate pool. Zero when
/// there are no candidates.
pub fn desired_links<R: Rng + ?Sized>(candidates: usize, rng: &mut R) -> usize {
    if candidates == 0 {
        return 0;
    }
    rng.gen_range(1..=MAX_ATTACHMENT_LINKS).min(candidates)
}

/// Selects `count` distinct neighbors from `candidates` (node, degree)
/// pairs by preferential attachment. Fewer than `count` are returned only
/// when the pool runs out.
pub fn select_neighbors<R: Rng + ?Sized>(
    mut candidates: Vec<(NodeId, usize)>,
    count: usize,
    rng: &mut R,
) -> Vec<NodeId> {
    let mut selected = Vec::with_capacity(count);

    while selected.len() < count && !candidates.is_empty() {
        let total: usize = candidates.iter().map(|(_, d)| *d).sum();
        let probs: Vec<f64> = if total == 0 {
            let uniform = 1.0 / candidates.len() as f64;
            vec![uniform; candidates.len()]
        } else {
            candidates
                .iter()
                .map(|(_, d)| *d as f64 / total as f64)
                .collect()
        };

        let idx = pick_band(&probs, rng.gen::<f64>());
        selected.push(candidates.remove(idx).0);
    }

    selected
}

/// First cumulative band containing `r`; the last band when rounding
/// leaves `r` beyond every cumulative sum.
fn pick_band(probs: &[f64], r: f64) -> usize {
    let mut cum = 0.0;
    for (i, p) in probs.iter().enumerate() {
        cum += p;
        if r <= cum {
            return i;
        }
    }
    probs.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::{impls, Error, RngCore};

    fn node(port: u16) -> NodeId {
        NodeId::new("127.0.0.1", port)
    }

    /// RNG pinned to the top of its range, so `gen::<f64>()` yields the
    /// largest value below 1.0 — the rounding-shortfall case.
    struct MaxRng;

    impl RngCore for MaxRng {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }
        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            impls::fill_bytes_via_next(self, dest)
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn hub_with_all_the_degree_mass_always_wins() {
        // One peer of degree 10 among four of degree 0: its band spans the
        // whole unit interval, so it is picked on every trial.
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let candidates = vec![
                (node(6000), 0),
                (node(6001), 0),
                (node(6002), 10),
                (node(6003), 0),
                (node(6004), 0),
            ];
            let picked = select_neighbors(candidates, 1, &mut rng);
            assert_eq!(picked, vec![node(6002)]);
        }
    }

    #[test]
    fn sampling_is_without_replacement() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let candidates = vec![(node(6000), 3), (node(6001), 5), (node(6002), 1)];
            let mut picked = select_neighbors(candidates, 3, &mut rng);
            picked.sort();
            assert_eq!(picked, vec![node(6000), node(6001), node(6002)]);
        }
    }

    #[test]
    fn zero_total_degree_still_selects() {
        let mut rng = rand::thread_rng();
        let candidates = vec![(node(6000), 0), (node(6001), 0)];
        let picked = select_neighbors(candidates, 2, &mut rng);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn pool_exhaustion_caps_the_selection() {
        let mut rng = rand::thread_rng();
        let candidates = vec![(node(6000), 1)];
        let picked = select_neighbors(candidates, 3, &mut rng);
        assert_eq!(picked, vec![node(6000)]);
    }

    #[test]
    fn band_selection_is_inverse_cdf() {
        let probs = [0.25, 0.25, 0.5];
        assert_eq!(pick_band(&probs, 0.0), 0);
        assert_eq!(pick_band(&probs, 0.25), 0); // boundary is inclusive
        assert_eq!(pick_band(&probs, 0.3), 1);
        assert_eq!(pick_band(&probs, 0.9), 2);
    }

    #[test]
    fn rounding_shortfall_takes_the_last_band() {
        // Three thirds sum to just under 1.0 in binary; an r at the very
        // top of the unit interval overshoots every band.
        let third = 1.0 / 3.0;
        let probs = [third, third, third];
        let mut rng = MaxRng;
        let r = rng.gen::<f64>();
        assert_eq!(pick_band(&probs, r), 2);
        assert_eq!(pick_band(&probs, 1.0 - f64::EPSILON), 2);
    }

    #[test]
    fn desired_links_respects_pool_and_cap() {
        let mut rng = rand::thread_rng();
        assert_eq!(desired_links(0, &mut rng), 0);
        for _ in 0..100 {
            let links = desired_links(100, &mut rng);
            assert!((1..=MAX_ATTACHMENT_LINKS).contains(&links));
            assert!(desired_links(1, &mut rng) == 1);
        }
    }
}
