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

//! The remote IMAP store.
//!
//! The protocol itself is spoken by an `ImapSession`, which the embedding
//! program supplies already connected and authenticated. This driver turns
//! what the session fetches into `MessageList`s and `FlagDelta`s into
//! `UID STORE` operations. Labels are Gmail's `X-GM-LABELS`.

use std::borrow::Cow;
use std::fmt;

use log::{debug, info};

use super::{Capabilities, Driver, DriverKind, Endpoint, FlagDelta, Store};
use crate::config::directive::{ConfigFile, Directive};
use crate::config::store::{BackendConfig, StoreConfig};
use crate::model::flag_set::FlagSet;
use crate::model::message::{Message, MessageList, MessageStatus};
use crate::support::error::Error;

/// The wire side of an IMAP connection.
pub trait ImapSession {
    /// `SELECT` the mailbox with the given store-side name.
    fn select(&mut self, mailbox: &str) -> Result<(), Error>;

    /// Fetch the UID, size, flags, labels and `Message-ID` of every message
    /// in the selected mailbox, in UID order.
    fn fetch_flags(&mut self) -> Result<Vec<FetchedMessage>, Error>;

    /// Perform `UID STORE` on one message of the selected mailbox.
    ///
    /// `items` are flags for `AddFlags`/`RemoveFlags` and labels otherwise,
    /// already rendered for the wire: labels that are not atoms arrive as
    /// quoted strings. The session writes them into the parenthesised list
    /// verbatim, as `store_command` does.
    fn store(
        &mut self,
        uid: u32,
        op: StoreOp,
        items: &[&str],
    ) -> Result<(), Error>;
}

/// One message as reported by `FETCH`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    pub uid: u32,
    pub size: u32,
    pub msgid: Option<String>,
    pub flags: Vec<String>,
    pub labels: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    AddFlags,
    RemoveFlags,
    AddLabels,
    RemoveLabels,
}

impl StoreOp {
    pub fn data_item(self) -> &'static str {
        match self {
            StoreOp::AddFlags => "+FLAGS.SILENT",
            StoreOp::RemoveFlags => "-FLAGS.SILENT",
            StoreOp::AddLabels => "+X-GM-LABELS.SILENT",
            StoreOp::RemoveLabels => "-X-GM-LABELS.SILENT",
        }
    }

    fn is_labels(self) -> bool {
        matches!(self, StoreOp::AddLabels | StoreOp::RemoveLabels)
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.data_item())
    }
}

/// Format the `UID STORE` command line (without tag) for the given
/// operation and wire-ready items.
pub fn store_command(uid: u32, op: StoreOp, items: &[&str]) -> String {
    format!("UID STORE {} {} ({})", uid, op, items.join(" "))
}

/// Render the contents of `set` as the items of a `STORE` of `op`.
///
/// Flags go out as they are; labels are quoted where needed.
pub fn wire_items(op: StoreOp, set: &FlagSet) -> Vec<Cow<'_, str>> {
    if op.is_labels() {
        set.iter().map(label_astring).collect()
    } else {
        set.iter().map(Cow::Borrowed).collect()
    }
}

fn is_atom_char(ch: u8) -> bool {
    match ch {
        0..=b' ' => false,
        127..=255 => false,
        b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
        _ => true,
    }
}

/// Render a label as an IMAP astring, keeping system labels like
/// `\Important` bare.
fn label_astring(label: &str) -> Cow<str> {
    let bare = label.strip_prefix('\\').unwrap_or(label);
    if !bare.is_empty() && bare.bytes().all(is_atom_char) {
        Cow::Borrowed(label)
    } else {
        Cow::Owned(format!(
            "\"{}\"",
            label.replace('\\', "\\\\").replace('"', "\\\"")
        ))
    }
}

pub struct ImapDriver;

impl Driver for ImapDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Imap
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::KEYWORDS | Capabilities::LABELS
    }

    fn parse_store(
        &self,
        store: &mut StoreConfig,
        directive: &Directive,
        cfg: &mut ConfigFile<'_>,
    ) -> bool {
        let (host, port, user) = match store.backend {
            BackendConfig::Imap {
                ref mut host,
                ref mut port,
                ref mut user,
            } => (host, port, user),
            _ => return false,
        };

        if directive.is("Host") {
            *host = Some(directive.value.clone());
        } else if directive.is("Port") {
            match directive.value.parse::<u16>() {
                Ok(p) if p > 0 => *port = p,
                _ => cfg.error(
                    directive,
                    format_args!("invalid port '{}'", directive.value),
                ),
            }
        } else if directive.is("User") {
            *user = Some(directive.value.clone());
        } else {
            return false;
        }

        true
    }

    fn finish_store(
        &self,
        store: &StoreConfig,
        header: &Directive,
        cfg: &mut ConfigFile<'_>,
    ) {
        if let BackendConfig::Imap { host: None, .. } = store.backend {
            cfg.error(
                header,
                format_args!("store '{}' has no Host", store.name),
            );
        }
    }

    fn open(
        &self,
        store: &StoreConfig,
        endpoint: Endpoint,
    ) -> Result<Box<dyn Store>, Error> {
        match endpoint {
            Endpoint::Session(session) => {
                Ok(Box::new(ImapStore::new(store.clone(), session)))
            }
            Endpoint::Local => Err(Error::WrongEndpoint("imap")),
        }
    }
}

pub struct ImapStore {
    config: StoreConfig,
    session: Box<dyn ImapSession>,
    /// The store-side name of the selected mailbox.
    selected: Option<String>,
    log_prefix: String,
}

impl ImapStore {
    pub fn new(config: StoreConfig, session: Box<dyn ImapSession>) -> Self {
        ImapStore {
            log_prefix: format!("imap:{}", config.name),
            config,
            session,
            selected: None,
        }
    }

    /// Select `mailbox`. Unless `fresh`, nothing is done if it is already
    /// selected.
    fn select(&mut self, mailbox: &str, fresh: bool) -> Result<(), Error> {
        let name = self.config.store_mailbox_name(mailbox);
        if !fresh && Some(&*name) == self.selected.as_deref() {
            return Ok(());
        }

        self.selected = None;
        self.session.select(&name)?;
        self.selected = Some(name.into_owned());
        Ok(())
    }
}

impl Store for ImapStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn list(&mut self, mailbox: &str) -> Result<MessageList, Error> {
        self.select(mailbox, true)?;
        let fetched = self.session.fetch_flags()?;

        let mut list = MessageList::with_capacity(fetched.len());
        for f in fetched {
            let mut message = Message::new(f.msgid);
            message.uid = f.uid;
            message.size = f.size;
            message.status = MessageStatus::FLAGS_FETCHED;
            for flag in &f.flags {
                if flag.eq_ignore_ascii_case("\\Recent") {
                    message.status |= MessageStatus::RECENT;
                } else {
                    message.flags.append(flag);
                }
            }
            message.labels.extend(&f.labels);
            message.sync_sys_flags();
            list.push(message);
        }

        debug!(
            "{} Listed {} messages in {}",
            self.log_prefix,
            list.len(),
            mailbox
        );
        Ok(list)
    }

    fn set_flags(
        &mut self,
        mailbox: &str,
        delta: &FlagDelta,
    ) -> Result<(), Error> {
        self.select(mailbox, false)?;

        let ops: [(StoreOp, &FlagSet); 4] = [
            (StoreOp::AddFlags, &delta.add),
            (StoreOp::RemoveFlags, &delta.remove),
            (StoreOp::AddLabels, &delta.add_labels),
            (StoreOp::RemoveLabels, &delta.remove_labels),
        ];
        for &(op, set) in &ops {
            if set.is_empty() {
                continue;
            }

            let rendered = wire_items(op, set);
            let items: Vec<&str> = rendered.iter().map(|i| &**i).collect();
            self.session.store(delta.uid, op, &items)?;
            info!(
                "{} {}",
                self.log_prefix,
                store_command(delta.uid, op, &items)
            );
        }

        Ok(())
    }
}
