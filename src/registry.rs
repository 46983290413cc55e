//! Nickname registry
//!
//! Maps nicknames to room slots. A key is either absent, reserved (held
//! during negotiation, no sink) or occupied (admitted member). Only the
//! room actor owns a registry, so none of these methods need locking.

use std::collections::HashMap;

use crate::client::Member;
use crate::error::AppError;
use crate::types::Nickname;

/// State of a registry entry
#[derive(Debug)]
enum Slot {
    Reserved,
    Occupied(Member),
}

/// Observable state of a nickname
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicknameState {
    Absent,
    Reserved,
    Occupied,
}

#[derive(Debug, Default)]
pub struct NicknameRegistry {
    slots: HashMap<Nickname, Slot>,
}

impl NicknameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, nickname: &Nickname) -> NicknameState {
        match self.slots.get(nickname) {
            None => NicknameState::Absent,
            Some(Slot::Reserved) => NicknameState::Reserved,
            Some(Slot::Occupied(_)) => NicknameState::Occupied,
        }
    }

    /// Reserve a nickname that is wholly absent
    ///
    /// Returns false if it is already reserved or occupied.
    pub fn reserve(&mut self, nickname: &Nickname) -> bool {
        if self.slots.contains_key(nickname) {
            return false;
        }
        self.slots.insert(nickname.clone(), Slot::Reserved);
        true
    }

    /// Drop a reservation. Occupied entries are left alone.
    ///
    /// Returns true if a reservation was removed.
    pub fn release(&mut self, nickname: &Nickname) -> bool {
        if matches!(self.slots.get(nickname), Some(Slot::Reserved)) {
            self.slots.remove(nickname);
            return true;
        }
        false
    }

    /// Turn a reservation (or an absent key) into an occupied slot
    ///
    /// Capacity counts occupied slots only. On `RoomFull` the member's
    /// reservation is released so the nickname becomes available again.
    pub fn occupy(&mut self, member: Member, capacity: usize) -> Result<(), AppError> {
        if let Some(Slot::Occupied(_)) = self.slots.get(&member.nickname) {
            return Err(AppError::NicknameTaken(member.nickname.to_string()));
        }

        if self.occupied_count() >= capacity {
            self.release(&member.nickname);
            return Err(AppError::RoomFull);
        }

        self.slots
            .insert(member.nickname.clone(), Slot::Occupied(member));
        Ok(())
    }

    /// Remove an occupied slot, returning its member
    pub fn vacate(&mut self, nickname: &Nickname) -> Option<Member> {
        match self.slots.get(nickname) {
            Some(Slot::Occupied(_)) => match self.slots.remove(nickname) {
                Some(Slot::Occupied(member)) => Some(member),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.members().count()
    }

    /// Occupied nicknames, sorted
    pub fn occupied_names(&self) -> Vec<Nickname> {
        let mut names: Vec<Nickname> = self.members().map(|m| m.nickname.clone()).collect();
        names.sort();
        names
    }

    /// Iterate over admitted members
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.slots.values().filter_map(|slot| match slot {
            Slot::Occupied(member) => Some(member),
            Slot::Reserved => None,
        })
    }

    pub fn reserved_count(&self) -> usize {
        self.slots.len() - self.occupied_count()
    }

    /// Drop every entry (room shutdown)
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
