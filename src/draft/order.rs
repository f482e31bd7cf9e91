// Snake-order turn computation.
//
// Pure and stateless: everything derives from the order snapshot and the
// 1-based pick counter, so the same inputs always name the same team. The
// order reverses direction each round, so the team picking last in round 1
// picks first in round 2.

/// 1-based round for a 1-based pick number.
pub fn round_of(pick: u32, n_teams: usize) -> u32 {
    debug_assert!(pick >= 1 && n_teams > 0);
    (pick - 1) / n_teams as u32 + 1
}

/// 0-based index into the draft order for the team on the clock at `pick`.
/// Odd rounds run forward through the order; even rounds run reversed.
pub fn seat_on_clock(pick: u32, n_teams: usize) -> usize {
    let n = n_teams as u32;
    let round = round_of(pick, n_teams);
    // 1-based position within the round, 1..=n.
    let pos = pick - (round - 1) * n;
    if round % 2 == 1 {
        (pos - 1) as usize
    } else {
        (n - pos) as usize
    }
}

/// The team id on the clock for `pick`, or None when the order is empty or
/// the pick falls outside [1, total_picks].
pub fn team_on_clock(order: &[String], pick: u32, total_picks: u32) -> Option<&str> {
    if order.is_empty() || pick < 1 || pick > total_picks {
        return None;
    }
    Some(order[seat_on_clock(pick, order.len())].as_str())
}

/// All pick numbers belonging to the seat at `seat` (0-based) across
/// `rounds` rounds. Mainly a test aid for the snake fairness property.
pub fn picks_for_seat(seat: usize, n_teams: usize, rounds: u32) -> Vec<u32> {
    let n = n_teams as u32;
    (1..=n * rounds)
        .filter(|&pick| seat_on_clock(pick, n_teams) == seat)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("team_{i}")).collect()
    }

    #[test]
    fn round_of_basic() {
        assert_eq!(round_of(1, 4), 1);
        assert_eq!(round_of(4, 4), 1);
        assert_eq!(round_of(5, 4), 2);
        assert_eq!(round_of(8, 4), 2);
        assert_eq!(round_of(9, 4), 3);
    }

    #[test]
    fn four_team_two_round_sequence() {
        // order=[A,B,C,D], 8 picks: A B C D D C B A.
        let order = vec![
            "A".to_string(),
            "B".to_string(),
            "C".to_string(),
            "D".to_string(),
        ];
        let expected = ["A", "B", "C", "D", "D", "C", "B", "A"];
        for (i, want) in expected.iter().enumerate() {
            let pick = (i + 1) as u32;
            assert_eq!(
                team_on_clock(&order, pick, 8),
                Some(*want),
                "pick {pick}"
            );
        }
    }

    #[test]
    fn first_seat_snake_property() {
        // Seat 0 picks at {1, 2N, 2N+1, 4N, 4N+1, ...}.
        for n in [2usize, 3, 4, 8, 10, 12] {
            let picks = picks_for_seat(0, n, 4);
            let n = n as u32;
            assert_eq!(picks, vec![1, 2 * n, 2 * n + 1, 4 * n]);
        }
    }

    #[test]
    fn last_seat_snake_property() {
        // Seat N-1 picks at {N, N+1, 3N, 3N+1, ...}.
        for n in [2usize, 3, 4, 8, 10, 12] {
            let picks = picks_for_seat(n - 1, n, 4);
            let n = n as u32;
            assert_eq!(picks, vec![n, n + 1, 3 * n, 3 * n + 1]);
        }
    }

    #[test]
    fn every_pick_has_exactly_one_seat() {
        for n in [1usize, 2, 5, 10] {
            for rounds in [1u32, 2, 3, 7] {
                for pick in 1..=(n as u32 * rounds) {
                    let seat = seat_on_clock(pick, n);
                    assert!(seat < n, "seat {seat} out of range for N={n} pick={pick}");
                }
            }
        }
    }

    #[test]
    fn each_team_picks_once_per_round() {
        for n in [2usize, 4, 9] {
            for round in 1..=5u32 {
                let n32 = n as u32;
                let start = (round - 1) * n32 + 1;
                let mut seats: Vec<usize> =
                    (start..start + n32).map(|p| seat_on_clock(p, n)).collect();
                seats.sort_unstable();
                assert_eq!(seats, (0..n).collect::<Vec<_>>(), "N={n} round={round}");
            }
        }
    }

    #[test]
    fn consecutive_picks_at_round_turn() {
        // The team at the turn picks twice in a row (e.g. picks N and N+1).
        let order = order(6);
        assert_eq!(team_on_clock(&order, 6, 24), Some("team_5"));
        assert_eq!(team_on_clock(&order, 7, 24), Some("team_5"));
        assert_eq!(team_on_clock(&order, 12, 24), Some("team_0"));
        assert_eq!(team_on_clock(&order, 13, 24), Some("team_0"));
    }

    #[test]
    fn out_of_range_picks_have_no_team() {
        let order = order(4);
        assert_eq!(team_on_clock(&order, 0, 8), None);
        assert_eq!(team_on_clock(&order, 9, 8), None);
        assert_eq!(team_on_clock(&[], 1, 8), None);
    }

    #[test]
    fn single_team_order() {
        let order = order(1);
        for pick in 1..=3u32 {
            assert_eq!(team_on_clock(&order, pick, 3), Some("team_0"));
        }
    }
}
