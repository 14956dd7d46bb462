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

//! The store drivers and the registry used to find them.
//!
//! A driver knows how to configure and open one kind of store. An open
//! `Store` enumerates mailboxes into `MessageList`s and applies `FlagDelta`s.
//! Both variants describe flags the same way, with IMAP flag names in the
//! `flags` set of each `Message`, so that lists from different kinds of store
//! can be compared directly.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::config::directive::{ConfigFile, Directive};
use crate::config::store::StoreConfig;
use crate::model::flag_set::FlagSet;
use crate::model::message::{Message, MessageList};
use crate::support::error::Error;

pub mod imap;
pub mod maildir;

use self::imap::{ImapDriver, ImapSession};
use self::maildir::MaildirDriver;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Maildir,
    Imap,
}

impl DriverKind {
    /// The keyword which starts a store section of this kind in the
    /// configuration file.
    pub fn section_keyword(self) -> &'static str {
        match self {
            DriverKind::Maildir => "MaildirStore",
            DriverKind::Imap => "IMAPStore",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DriverKind::Maildir => "maildir",
            DriverKind::Imap => "imap",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

bitflags! {
    pub struct Capabilities: u8 {
        /// Arbitrary keywords are kept, not just the flags in `MessageFlags`.
        const KEYWORDS = 1 << 0;
        /// Extended labels are kept.
        const LABELS = 1 << 1;
    }
}

/// How to reach the store being opened.
pub enum Endpoint {
    /// The store is on the local file system at its configured path.
    Local,
    /// An established, authenticated session with a remote server.
    Session(Box<dyn ImapSession>),
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Endpoint::Local => write!(f, "Local"),
            Endpoint::Session(..) => write!(f, "Session"),
        }
    }
}

/// A kind of store.
///
/// Drivers are stateless singletons living in the registry.
pub trait Driver: Sync {
    fn kind(&self) -> DriverKind;

    fn capabilities(&self) -> Capabilities;

    /// Handle `directive` if it is specific to this driver.
    ///
    /// Returns `false` if the keyword is not one this driver knows, in which
    /// case it should be treated as a generic option. Invalid values of known
    /// keywords are reported to `cfg` and `true` is returned.
    fn parse_store(
        &self,
        store: &mut StoreConfig,
        directive: &Directive,
        cfg: &mut ConfigFile<'_>,
    ) -> bool;

    /// Check that a store section ending at `header` is complete.
    fn finish_store(
        &self,
        store: &StoreConfig,
        header: &Directive,
        cfg: &mut ConfigFile<'_>,
    );

    /// Open the store described by `store`.
    fn open(
        &self,
        store: &StoreConfig,
        endpoint: Endpoint,
    ) -> Result<Box<dyn Store>, Error>;
}

/// An open store.
pub trait Store {
    fn config(&self) -> &StoreConfig;

    /// Enumerate `mailbox`, given by its canonical name.
    fn list(&mut self, mailbox: &str) -> Result<MessageList, Error>;

    /// Apply `delta` to the message it names in `mailbox`.
    fn set_flags(
        &mut self,
        mailbox: &str,
        delta: &FlagDelta,
    ) -> Result<(), Error>;
}

/// A change to the flags and labels of a single message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlagDelta {
    pub uid: u32,
    pub add: FlagSet,
    pub remove: FlagSet,
    pub add_labels: FlagSet,
    pub remove_labels: FlagSet,
}

impl FlagDelta {
    /// Compute the change that turns the flags and labels of `old` into those
    /// of `new`, addressed to the UID of `old`.
    ///
    /// System flags (those starting with `\`) are compared
    /// case-insensitively; everything else must match exactly.
    pub fn between(old: &Message, new: &Message) -> Self {
        FlagDelta {
            uid: old.uid,
            add: missing_from(&new.flags, &old.flags),
            remove: missing_from(&old.flags, &new.flags),
            add_labels: missing_from(&new.labels, &old.labels),
            remove_labels: missing_from(&old.labels, &new.labels),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.remove.is_empty()
            && self.add_labels.is_empty()
            && self.remove_labels.is_empty()
    }
}

fn same_flag(a: &str, b: &str) -> bool {
    if a.starts_with('\\') {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// Return the flags of `src` not in `other`, without duplicates.
fn missing_from(src: &FlagSet, other: &FlagSet) -> FlagSet {
    let mut ret = FlagSet::new();
    for flag in src {
        if !other.iter().any(|o| same_flag(flag, o))
            && !ret.iter().any(|r| same_flag(flag, r))
        {
            ret.append(flag);
        }
    }
    ret
}

static MAILDIR: MaildirDriver = MaildirDriver;
static IMAP: ImapDriver = ImapDriver;

lazy_static! {
    static ref DRIVERS: BTreeMap<DriverKind, &'static dyn Driver> = {
        let mut drivers = BTreeMap::<DriverKind, &'static dyn Driver>::new();
        drivers.insert(DriverKind::Maildir, &MAILDIR);
        drivers.insert(DriverKind::Imap, &IMAP);
        drivers
    };
}

/// Return the driver for `kind`.
pub fn driver(kind: DriverKind) -> &'static dyn Driver {
    DRIVERS[&kind]
}

/// Iterate every registered driver, in `DriverKind` order.
pub fn drivers() -> impl Iterator<Item = &'static dyn Driver> {
    DRIVERS.values().copied()
}

/// Find the driver whose store sections start with `keyword`, which is
/// matched case-insensitively.
pub fn by_section_keyword(keyword: &str) -> Option<&'static dyn Driver> {
    drivers().find(|d| {
        d.kind().section_keyword().eq_ignore_ascii_case(keyword)
    })
}
