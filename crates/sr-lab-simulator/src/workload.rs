//! Application-layer message source used for random runs.

use rand::Rng;
use sr_lab_abstract::Message;

/// The `index`-th generated message: twenty copies of one letter, cycling a..z.
pub fn nth_message(index: usize) -> Message {
    Message::filled(b'a' + (index % 26) as u8)
}

/// Send times for `count` messages: the first at `start`, then gaps drawn
/// uniformly from `[0, 2 * mean_interval]`.
pub fn arrival_times<R: Rng>(rng: &mut R, start: u64, count: u32, mean_interval: u64) -> Vec<u64> {
    let mut time = start;
    let mut times = Vec::with_capacity(count as usize);
    for _ in 0..count {
        times.push(time);
        time = time.saturating_add(rng.random_range(0..=mean_interval.saturating_mul(2)));
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn messages_cycle_through_the_alphabet() {
        assert_eq!(nth_message(0), Message::filled(b'a'));
        assert_eq!(nth_message(25), Message::filled(b'z'));
        assert_eq!(nth_message(26), Message::filled(b'a'));
    }

    #[test]
    fn arrival_times_are_non_decreasing_and_bounded() {
        let mut rng = StdRng::seed_from_u64(1);
        let times = arrival_times(&mut rng, 100, 50, 4);
        assert_eq!(times.len(), 50);
        assert_eq!(times[0], 100);
        assert!(times.windows(2).all(|w| w[1] >= w[0] && w[1] - w[0] <= 8));
    }

    #[test]
    fn huge_intervals_clamp_at_the_end_of_time() {
        let mut rng = StdRng::seed_from_u64(3);
        let times = arrival_times(&mut rng, u64::MAX - 5, 4, u64::MAX);
        assert_eq!(times.len(), 4);
        assert_eq!(times[0], u64::MAX - 5);
        assert!(times.windows(2).all(|w| w[1] >= w[0]));
    }
}
