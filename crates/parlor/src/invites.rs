//! Pending room invites, keyed by recipient.
//!
//! An invite is only a pointer at a room. Accepting one goes through the
//! normal join, so capacity and room state are checked again at that
//! point.

use std::collections::HashMap;

use parlor_protocol::{InviteView, PlayerId, RoomId};

#[derive(Debug, Default)]
pub(crate) struct InviteBook {
    pending: HashMap<PlayerId, Vec<InviteView>>,
}

impl InviteBook {
    /// Records an invite. A second invite to the same room replaces the
    /// first.
    pub(crate) fn add(&mut self, to: PlayerId, invite: InviteView) {
        let invites = self.pending.entry(to).or_default();
        invites.retain(|i| i.room_id != invite.room_id);
        invites.push(invite);
    }

    /// Invites for `to`, oldest first.
    pub(crate) fn for_player(&self, to: PlayerId) -> Vec<InviteView> {
        self.pending.get(&to).cloned().unwrap_or_default()
    }

    pub(crate) fn contains(&self, to: PlayerId, room_id: RoomId) -> bool {
        self.pending
            .get(&to)
            .is_some_and(|invites| invites.iter().any(|i| i.room_id == room_id))
    }

    pub(crate) fn remove(&mut self, to: PlayerId, room_id: RoomId) {
        if let Some(invites) = self.pending.get_mut(&to) {
            invites.retain(|i| i.room_id != room_id);
            if invites.is_empty() {
                self.pending.remove(&to);
            }
        }
    }

    /// Drops every invite pointing at `room_id`.
    pub(crate) fn forget_room(&mut self, room_id: RoomId) {
        self.pending.retain(|_, invites| {
            invites.retain(|i| i.room_id != room_id);
            !invites.is_empty()
        });
    }

    /// Drops invites sent to or by `player_id`.
    pub(crate) fn forget_player(&mut self, player_id: PlayerId) {
        self.pending.remove(&player_id);
        self.pending.retain(|_, invites| {
            invites.retain(|i| i.from != player_id);
            !invites.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::GameId;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn invite(room: u64, from: u64) -> InviteView {
        InviteView {
            room_id: RoomId(room),
            code: format!("CODE{room:02}"),
            game_id: GameId::from("rps"),
            from: pid(from),
            from_name: format!("player{from}"),
        }
    }

    #[test]
    fn test_add_same_room_twice_keeps_one() {
        let mut book = InviteBook::default();
        book.add(pid(2), invite(1, 1));
        book.add(pid(2), invite(1, 1));
        book.add(pid(2), invite(5, 3));

        let invites = book.for_player(pid(2));

        assert_eq!(invites.len(), 2);
        assert_eq!(invites[0].room_id, RoomId(1));
        assert!(book.for_player(pid(1)).is_empty());
    }

    #[test]
    fn test_forget_room_drops_only_that_room() {
        let mut book = InviteBook::default();
        book.add(pid(2), invite(1, 1));
        book.add(pid(2), invite(5, 3));
        book.add(pid(4), invite(1, 1));

        book.forget_room(RoomId(1));

        assert!(!book.contains(pid(2), RoomId(1)));
        assert!(book.contains(pid(2), RoomId(5)));
        assert!(book.for_player(pid(4)).is_empty());
    }

    #[test]
    fn test_forget_player_drops_sent_and_received() {
        let mut book = InviteBook::default();
        book.add(pid(2), invite(1, 1));
        book.add(pid(1), invite(5, 3));
        book.add(pid(3), invite(9, 2));

        book.forget_player(pid(1));

        assert!(book.for_player(pid(2)).is_empty());
        assert!(book.for_player(pid(1)).is_empty());
        assert!(book.contains(pid(3), RoomId(9)));
    }

    #[test]
    fn test_remove_accepted_invite() {
        let mut book = InviteBook::default();
        book.add(pid(2), invite(1, 1));

        book.remove(pid(2), RoomId(1));

        assert!(!book.contains(pid(2), RoomId(1)));
    }
}
