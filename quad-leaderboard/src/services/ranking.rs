//! Leaderboard ordering. Pure functions over scores already fetched.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::clients::social::CioCircle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub user_id: Uuid,
    pub score: i64,
}

/// Highest score first; ties broken by user id so the order is stable.
pub fn rank(entries: Vec<(Uuid, i64)>) -> Vec<Standing> {
    let mut entries = entries;
    entries.sort_by(|(a_id, a_score), (b_id, b_score)| b_score.cmp(a_score).then_with(|| a_id.cmp(b_id)));
    entries
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, score))| Standing { rank: i + 1, user_id, score })
        .collect()
}

fn score_of(scores: &HashMap<Uuid, i64>, user_id: Uuid) -> i64 {
    scores.get(&user_id).copied().unwrap_or(0)
}

/// The user and their friends. Missing scores count as zero.
pub fn friends_board(user_id: Uuid, friend_ids: &[Uuid], scores: &HashMap<Uuid, i64>) -> Vec<Standing> {
    let mut seen = HashSet::new();
    let entries = std::iter::once(user_id)
        .chain(friend_ids.iter().copied())
        .filter(|id| seen.insert(*id))
        .map(|id| (id, score_of(scores, id)))
        .collect();
    rank(entries)
}

/// Each CIO scored by its own points plus those of its friends.
pub fn cio_board(circles: &[CioCircle], scores: &HashMap<Uuid, i64>) -> Vec<Standing> {
    let entries = circles
        .iter()
        .map(|circle| {
            let members: HashSet<Uuid> = circle.friend_ids.iter().copied().filter(|id| *id != circle.cio_id).collect();
            let total = score_of(scores, circle.cio_id) + members.into_iter().map(|id| score_of(scores, id)).sum::<i64>();
            (circle.cio_id, total)
        })
        .collect();
    rank(entries)
}

/// Every user id whose score a CIO board needs.
pub fn circle_members(circles: &[CioCircle]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    circles
        .iter()
        .flat_map(|c| std::iter::once(c.cio_id).chain(c.friend_ids.iter().copied()))
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn rank_orders_by_score_then_id() {
        let u = ids(3);
        let board = rank(vec![(u[2], 10), (u[0], 5), (u[1], 10)]);
        assert_eq!(
            board.iter().map(|s| (s.rank, s.user_id)).collect::<Vec<_>>(),
            vec![(1, u[1]), (2, u[2]), (3, u[0])]
        );
    }

    #[test]
    fn friends_board_includes_self_and_defaults_to_zero() {
        let u = ids(3);
        let scores = HashMap::from([(u[1], 20)]);
        let board = friends_board(u[0], &[u[1], u[2], u[1]], &scores);

        assert_eq!(board.len(), 3);
        assert_eq!(board[0], Standing { rank: 1, user_id: u[1], score: 20 });
        assert!(board.iter().any(|s| s.user_id == u[0] && s.score == 0));
    }

    #[test]
    fn lonely_user_still_has_a_board() {
        let me = Uuid::new_v4();
        let board = friends_board(me, &[], &HashMap::new());
        assert_eq!(board, vec![Standing { rank: 1, user_id: me, score: 0 }]);
    }

    #[test]
    fn cio_total_adds_friends_to_own_score() {
        let u = ids(5);
        let (big, small) = (u[0], u[1]);
        let scores = HashMap::from([(big, 10), (small, 30), (u[2], 20), (u[3], 25)]);
        let circles = vec![
            CioCircle { cio_id: big, friend_ids: vec![u[2], u[3], u[4]] },
            CioCircle { cio_id: small, friend_ids: vec![] },
        ];

        let board = cio_board(&circles, &scores);
        assert_eq!(board[0], Standing { rank: 1, user_id: big, score: 55 });
        assert_eq!(board[1], Standing { rank: 2, user_id: small, score: 30 });
    }

    #[test]
    fn cio_listed_as_its_own_friend_is_not_double_counted() {
        let cio = Uuid::new_v4();
        let scores = HashMap::from([(cio, 7)]);
        let board = cio_board(&[CioCircle { cio_id: cio, friend_ids: vec![cio] }], &scores);
        assert_eq!(board[0].score, 7);
    }

    #[test]
    fn circle_members_are_deduplicated() {
        let u = ids(3);
        let circles = vec![
            CioCircle { cio_id: u[0], friend_ids: vec![u[1], u[2]] },
            CioCircle { cio_id: u[1], friend_ids: vec![u[0]] },
        ];
        assert_eq!(circle_members(&circles), vec![u[0], u[1], u[2]]);
    }
}
