//! Pure vote arithmetic over a [`GameState`] and a roster snapshot.

use indexmap::IndexMap;

use crate::game::{GameState, PlayerId};

/// target -> voters, both in vote insertion order.
pub type TallySnapshot = IndexMap<PlayerId, Vec<PlayerId>>;

/// Group the current votes by target. Targets appear in the order they first
/// received a vote; each voter list keeps vote insertion order.
pub fn tally(state: &GameState) -> TallySnapshot {
    let mut grouped = TallySnapshot::new();
    for (voter, target) in state.votes() {
        grouped.entry(*target).or_default().push(*voter);
    }
    grouped
}

/// Votes needed on a single target for an immediate elimination.
pub fn majority_threshold(active_player_count: usize) -> usize {
    active_player_count / 2 + 1
}

/// First target (in tally order) whose voter count reaches the majority
/// threshold for the given roster, or `None`. The roster is the full set of
/// players holding the role; eliminated players are discounted here.
pub fn check_majority(state: &GameState, roster: &[PlayerId]) -> Option<PlayerId> {
    let active = roster
        .iter()
        .filter(|player| !state.is_eliminated(**player))
        .count();
    let threshold = majority_threshold(active);
    tally(state)
        .into_iter()
        .find(|(_, voters)| voters.len() >= threshold)
        .map(|(target, _)| target)
}

/// Target with the most votes. Ties go to the target that received its first
/// vote earliest, which keeps countdown expiry deterministic instead of
/// depending on map iteration order.
pub fn top_target(tally: &TallySnapshot) -> Option<PlayerId> {
    let mut best: Option<(PlayerId, usize)> = None;
    for (target, voters) in tally {
        match best {
            Some((_, count)) if voters.len() <= count => {}
            _ => best = Some((*target, voters.len())),
        }
    }
    best.map(|(target, _)| target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GroupId;

    fn game_with_votes(votes: &[(i64, i64)]) -> GameState {
        let mut game = GameState::new(GroupId(1));
        for (voter, target) in votes {
            game.cast_vote(PlayerId(*voter), PlayerId(*target));
        }
        game
    }

    #[test]
    fn threshold_is_floor_half_plus_one() {
        assert_eq!(majority_threshold(0), 1);
        assert_eq!(majority_threshold(1), 1);
        assert_eq!(majority_threshold(2), 2);
        assert_eq!(majority_threshold(5), 3);
        assert_eq!(majority_threshold(6), 4);
        assert_eq!(majority_threshold(7), 4);
    }

    #[test]
    fn five_player_majority_scenario() {
        // Roster {A..E} = {1..5}, votes A->C, B->C, D->C.
        let game = game_with_votes(&[(1, 3), (2, 3), (4, 3)]);
        let roster: Vec<PlayerId> = (1..=5).map(PlayerId).collect();

        let counts = tally(&game);
        assert_eq!(counts.len(), 1);
        assert_eq!(
            counts.get(&PlayerId(3)),
            Some(&vec![PlayerId(1), PlayerId(2), PlayerId(4)])
        );
        assert_eq!(check_majority(&game, &roster), Some(PlayerId(3)));
    }

    #[test]
    fn no_majority_below_threshold() {
        let game = game_with_votes(&[(1, 3), (2, 3)]);
        let roster: Vec<PlayerId> = (1..=5).map(PlayerId).collect();
        assert_eq!(check_majority(&game, &roster), None);
    }

    #[test]
    fn eliminated_players_shrink_the_threshold() {
        let mut game = game_with_votes(&[(1, 3), (2, 3)]);
        let roster: Vec<PlayerId> = (1..=5).map(PlayerId).collect();

        // With 5 active players two votes are short of the threshold of 3;
        // once two of them are out, the threshold drops to 2.
        game.eliminate(PlayerId(4));
        game.eliminate(PlayerId(5));
        assert_eq!(check_majority(&game, &roster), Some(PlayerId(3)));
    }

    #[test]
    fn top_target_breaks_ties_by_first_vote() {
        // 3 and 4 both end on two votes; 3 was voted for first and must win
        // regardless of what happens later in the sequence.
        let game = game_with_votes(&[(1, 3), (2, 4), (5, 4), (6, 3)]);
        let counts = tally(&game);
        assert_eq!(top_target(&counts), Some(PlayerId(3)));
    }

    #[test]
    fn top_target_of_empty_tally_is_none() {
        let game = game_with_votes(&[]);
        assert_eq!(top_target(&tally(&game)), None);
    }

    #[test]
    fn tally_keeps_voter_insertion_order_across_revotes() {
        let mut game = game_with_votes(&[(1, 3), (2, 5), (4, 3)]);
        // Voter 2 switches to 3; their slot in the vote order is unchanged.
        game.cast_vote(PlayerId(2), PlayerId(3));
        let counts = tally(&game);
        assert_eq!(
            counts.get(&PlayerId(3)),
            Some(&vec![PlayerId(1), PlayerId(2), PlayerId(4)])
        );
        assert_eq!(counts.get(&PlayerId(5)), None);
    }
}
