//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Boxsync.
//
// Boxsync is free software: you can  redistribute it and/or modify it under
// the terms of  the GNU General Public License as published  by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Boxsync is distributed in the hope that  it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Boxsync. If not, see <http://www.gnu.org/licenses/>.

use std::fmt;
use std::iter::FromIterator;
use std::slice;
use std::vec;

use bitflags::bitflags;

use super::flag_set::FlagSet;

bitflags! {
    /// The message flags that both store variants can express.
    ///
    /// Anything else a backend reports lives only in the raw `FlagSet` of the
    /// message.
    #[derive(Default)]
    pub struct MessageFlags: u8 {
        const DRAFT = 1 << 0;
        const FLAGGED = 1 << 1;
        const FORWARDED = 1 << 2;
        const ANSWERED = 1 << 3;
        const SEEN = 1 << 4;
        const DELETED = 1 << 5;
    }
}

bitflags! {
    /// Bookkeeping about a message within one enumeration.
    #[derive(Default)]
    pub struct MessageStatus: u8 {
        /// The store considers the message new (IMAP `\Recent`, maildir
        /// `new/`).
        const RECENT = 1 << 0;
        /// The message has been expunged or deleted during this pass.
        const DEAD = 1 << 1;
        /// `flags` reflects the store's current state.
        const FLAGS_FETCHED = 1 << 2;
    }
}

// Maildir requires info letters in ASCII order, which this table is in.
const MAILDIR_LETTERS: [(char, MessageFlags); 6] = [
    ('D', MessageFlags::DRAFT),
    ('F', MessageFlags::FLAGGED),
    ('P', MessageFlags::FORWARDED),
    ('R', MessageFlags::ANSWERED),
    ('S', MessageFlags::SEEN),
    ('T', MessageFlags::DELETED),
];

const IMAP_NAMES: [(&str, MessageFlags); 6] = [
    ("\\Draft", MessageFlags::DRAFT),
    ("\\Flagged", MessageFlags::FLAGGED),
    ("$Forwarded", MessageFlags::FORWARDED),
    ("\\Answered", MessageFlags::ANSWERED),
    ("\\Seen", MessageFlags::SEEN),
    ("\\Deleted", MessageFlags::DELETED),
];

impl MessageFlags {
    /// Parse the letters after `:2,` in a maildir file name.
    ///
    /// Unknown letters (e.g. Dovecot keyword letters) are ignored.
    pub fn from_maildir_info(info: &str) -> Self {
        info.chars()
            .filter_map(MessageFlags::from_maildir_letter)
            .fold(MessageFlags::empty(), |a, b| a | b)
    }

    /// Map a single maildir info letter to its flag, if it is one of the
    /// standard letters.
    pub fn from_maildir_letter(ch: char) -> Option<Self> {
        MAILDIR_LETTERS
            .iter()
            .find(|&&(letter, _)| letter == ch)
            .map(|&(_, flag)| flag)
    }

    /// Format these flags as a maildir info string (without the `:2,`).
    pub fn to_maildir_info(self) -> String {
        MAILDIR_LETTERS
            .iter()
            .filter(|&&(_, flag)| self.contains(flag))
            .map(|&(letter, _)| letter)
            .collect()
    }

    /// Map a single IMAP flag to the corresponding bit, if there is one.
    pub fn from_imap_flag(flag: &str) -> Option<Self> {
        IMAP_NAMES
            .iter()
            .find(|&&(name, _)| name.eq_ignore_ascii_case(flag))
            .map(|&(_, bit)| bit)
    }

    /// Return the IMAP names of the flags in this set.
    pub fn imap_flags(self) -> impl Iterator<Item = &'static str> {
        IMAP_NAMES
            .iter()
            .filter(move |&&(_, bit)| self.contains(bit))
            .map(|&(name, _)| name)
    }
}

/// One message as enumerated by a store.
///
/// The message exclusively owns its id string and both flag sets; they go
/// away with it.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// The store-assigned UID, or 0 if not yet known.
    pub uid: u32,
    pub size: u32,
    /// The `Message-ID` header, if the store reported it.
    pub msgid: Option<String>,
    pub sys_flags: MessageFlags,
    pub status: MessageStatus,
    /// Flags exactly as the backend reported them.
    pub flags: FlagSet,
    /// Extended labels (e.g. `X-GM-LABELS`).
    pub labels: FlagSet,
}

impl Message {
    /// Create a message with the given id and no flags or labels.
    pub fn new(msgid: Option<String>) -> Self {
        Message {
            msgid,
            ..Message::default()
        }
    }

    /// Recompute `sys_flags` from the raw flags.
    pub fn sync_sys_flags(&mut self) {
        self.sys_flags = self
            .flags
            .iter()
            .filter_map(MessageFlags::from_imap_flag)
            .fold(MessageFlags::empty(), |a, b| a | b);
    }

    pub fn is_dead(&self) -> bool {
        self.status.contains(MessageStatus::DEAD)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Message")
            .field("uid", &self.uid)
            .field("msgid", &self.msgid)
            .field("sys_flags", &self.sys_flags)
            .field("flags", &self.flags)
            .field("labels", &self.labels)
            .finish()
    }
}

/// The result of enumerating one mailbox of one store.
///
/// Order is the order the store reported the messages in. The list owns every
/// message; `release()` (or simply dropping the list) frees all of them at
/// once at the end of the mailbox pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageList {
    messages: Vec<Message>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MessageList {
            messages: Vec::with_capacity(capacity),
        }
    }

    /// Append `message` to the end of the list, taking ownership of it.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Return the number of messages in the list.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, Message> {
        self.messages.iter_mut()
    }

    /// Find the message with the given UID.
    pub fn find_uid(&self, uid: u32) -> Option<&Message> {
        self.messages.iter().find(|m| uid == m.uid)
    }

    pub fn find_uid_mut(&mut self, uid: u32) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| uid == m.uid)
    }

    /// Destroy the list and everything it owns.
    pub fn release(self) {}
}

impl IntoIterator for MessageList {
    type Item = Message;
    type IntoIter = vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a MessageList {
    type Item = &'a Message;
    type IntoIter = slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl FromIterator<Message> for MessageList {
    fn from_iter<I: IntoIterator<Item = Message>>(it: I) -> Self {
        MessageList {
            messages: it.into_iter().collect(),
        }
    }
}
