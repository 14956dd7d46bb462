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

//! The local file system store.
//!
//! Each mailbox is a maildir: a directory with `cur`, `new` and `tmp`
//! subdirectories. Nested mailboxes are nested directories under the store
//! root (or, with `Flatten`, one directory per mailbox with the flattening
//! delimiter in its name). `INBOX` lives at its own configurable path.
//!
//! A message file name looks like `<unique>,U=<uid>,S=<size>:2,<info>`, where
//! the `U=` and `S=` fields are optional and `<info>` holds one letter per
//! flag. Messages without a `U=` field have UID 0 until the synchroniser
//! assigns one, and cannot be addressed by `FlagDelta`s.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::{Capabilities, Driver, DriverKind, Endpoint, FlagDelta, Store};
use crate::config::directive::{ConfigFile, Directive};
use crate::config::store::{BackendConfig, StoreConfig};
use crate::model::flag_set::FlagSet;
use crate::model::message::{
    Message, MessageFlags, MessageList, MessageStatus,
};
use crate::support::error::Error;
use crate::support::file_ops::{self, ErrorTransforms, IgnoreKinds};
use crate::support::safe_name::is_safe_name;

pub struct MaildirDriver;

impl Driver for MaildirDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Maildir
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn parse_store(
        &self,
        store: &mut StoreConfig,
        directive: &Directive,
        _cfg: &mut ConfigFile<'_>,
    ) -> bool {
        let (path, inbox) = match store.backend {
            BackendConfig::Maildir {
                ref mut path,
                ref mut inbox,
            } => (path, inbox),
            _ => return false,
        };

        if directive.is("Path") {
            *path = Some(expand_tilde(&directive.value));
            true
        } else if directive.is("Inbox") {
            *inbox = Some(expand_tilde(&directive.value));
            true
        } else {
            false
        }
    }

    fn finish_store(
        &self,
        store: &StoreConfig,
        header: &Directive,
        cfg: &mut ConfigFile<'_>,
    ) {
        if let BackendConfig::Maildir {
            path: None,
            inbox: None,
        } = store.backend
        {
            cfg.error(
                header,
                format_args!(
                    "store '{}' has neither Path nor Inbox",
                    store.name
                ),
            );
        }
    }

    fn open(
        &self,
        store: &StoreConfig,
        endpoint: Endpoint,
    ) -> Result<Box<dyn Store>, Error> {
        match endpoint {
            Endpoint::Local => {
                Ok(Box::new(MaildirStore::new(store.clone())?))
            }
            Endpoint::Session(..) => Err(Error::WrongEndpoint("maildir")),
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), env::var_os("HOME")) {
        (Some(rest), Some(home)) => Path::new(&home).join(rest),
        _ => PathBuf::from(path),
    }
}

pub struct MaildirStore {
    config: StoreConfig,
    root: Option<PathBuf>,
    inbox: PathBuf,
    log_prefix: String,
}

impl MaildirStore {
    pub fn new(config: StoreConfig) -> Result<Self, Error> {
        let (root, inbox) = match config.backend {
            BackendConfig::Maildir {
                ref path,
                ref inbox,
            } => (path.clone(), inbox.clone()),
            _ => return Err(Error::WrongEndpoint("maildir")),
        };

        let inbox = inbox
            .or_else(|| root.as_ref().map(|r| r.join("INBOX")))
            .ok_or(Error::MissingOption("Path"))?;

        Ok(MaildirStore {
            log_prefix: format!("maildir:{}", config.name),
            config,
            root,
            inbox,
        })
    }

    fn mailbox_path(&self, mailbox: &str) -> Result<PathBuf, Error> {
        let name = self.config.store_mailbox_name(mailbox);
        if "INBOX" == name {
            return Ok(self.inbox.clone());
        }

        let mut path = self.root.clone().ok_or(Error::NxMailbox)?;
        for component in name.split('/') {
            if !is_safe_name(component) {
                return Err(Error::UnsafeName);
            }

            path.push(component);
        }

        Ok(path)
    }
}

/// The parsed name of a message file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MaildirName<'a> {
    /// Everything before the info part.
    base: &'a str,
    info: &'a str,
    uid: Option<u32>,
    size: Option<u32>,
}

impl<'a> MaildirName<'a> {
    fn parse(name: &'a str) -> Self {
        let (base, info) = match name.find(":2,") {
            Some(ix) => (&name[..ix], &name[ix + 3..]),
            None => (name, ""),
        };

        let field = |key: &str| -> Option<u32> {
            base.split(',')
                .skip(1)
                .find_map(|f| f.strip_prefix(key))
                .and_then(|v| v.parse().ok())
        };

        MaildirName {
            base,
            info,
            uid: field("U="),
            size: field("S="),
        }
    }

    /// Produce the file name with the info part replaced to reflect `flags`.
    ///
    /// Info characters this crate does not understand (e.g. Dovecot keyword
    /// letters) are kept. The result is in ASCII order, as maildir requires.
    fn with_flags(&self, flags: MessageFlags) -> String {
        let mut info: Vec<char> = flags.to_maildir_info().chars().collect();
        info.extend(
            self.info
                .chars()
                .filter(|&c| MessageFlags::from_maildir_letter(c).is_none()),
        );
        info.sort_unstable();
        info.dedup();

        format!("{}:2,{}", self.base, info.into_iter().collect::<String>())
    }
}

/// Convert the system flags in `set` to `MessageFlags`.
///
/// Returns the flags and whether anything in `set` had to be dropped.
fn system_flags(set: &FlagSet) -> (MessageFlags, bool) {
    let mut flags = MessageFlags::empty();
    let mut dropped = false;
    for flag in set {
        match MessageFlags::from_imap_flag(flag) {
            Some(f) => flags |= f,
            None => dropped = true,
        }
    }
    (flags, dropped)
}

impl Store for MaildirStore {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn list(&mut self, mailbox: &str) -> Result<MessageList, Error> {
        let path = self.mailbox_path(mailbox)?;
        if !path.join("cur").is_dir() {
            return Err(Error::NxMailbox);
        }

        let mut messages = Vec::new();
        for &(sub, recent) in &[("new", true), ("cur", false)] {
            let dir = path.join(sub);
            for file_name in file_ops::list_dir(&dir).ignore_not_found()? {
                let name = MaildirName::parse(&file_name);
                let size = match name.size {
                    Some(size) => size,
                    None => match fs::metadata(dir.join(&file_name)) {
                        Ok(md) => md.len().min(u32::MAX.into()) as u32,
                        // Deleted by someone else since we listed the
                        // directory
                        Err(e) if io::ErrorKind::NotFound == e.kind() => {
                            continue
                        }
                        Err(e) => return Err(e.into()),
                    },
                };

                let mut message = Message::new(None);
                message.uid = name.uid.unwrap_or(0);
                message.size = size;
                message.sys_flags = MessageFlags::from_maildir_info(name.info);
                message.flags.extend(message.sys_flags.imap_flags());
                message.status = MessageStatus::FLAGS_FETCHED;
                if recent {
                    message.status |= MessageStatus::RECENT;
                }
                messages.push(message);
            }
        }

        messages.sort_by_key(|m| m.uid);
        debug!(
            "{} Listed {} messages in {}",
            self.log_prefix,
            messages.len(),
            mailbox
        );
        Ok(messages.into_iter().collect())
    }

    fn set_flags(
        &mut self,
        mailbox: &str,
        delta: &FlagDelta,
    ) -> Result<(), Error> {
        let path = self.mailbox_path(mailbox)?;

        let (add, dropped_add) = system_flags(&delta.add);
        let (remove, dropped_remove) = system_flags(&delta.remove);
        if dropped_add
            || dropped_remove
            || !delta.add_labels.is_empty()
            || !delta.remove_labels.is_empty()
        {
            warn!(
                "{} Keywords and labels cannot be stored; ignoring them for \
                 UID {} in {}",
                self.log_prefix, delta.uid, mailbox
            );
        }

        for sub in &["cur", "new"] {
            let dir = path.join(sub);
            for file_name in file_ops::list_dir(&dir).ignore_not_found()? {
                let name = MaildirName::parse(&file_name);
                if Some(delta.uid) != name.uid {
                    continue;
                }

                let old_flags = MessageFlags::from_maildir_info(name.info);
                let new_flags = (old_flags | add) - remove;
                let src = dir.join(&file_name);
                let dst = path.join("cur").join(name.with_flags(new_flags));
                if src != dst {
                    fs::rename(&src, &dst).on_not_found(Error::NxMessage)?;
                    info!(
                        "{} Changed flags of UID {} in {} from '{}' to '{}'",
                        self.log_prefix,
                        delta.uid,
                        mailbox,
                        old_flags.to_maildir_info(),
                        new_flags.to_maildir_info()
                    );
                }

                return Ok(());
            }
        }

        Err(Error::NxMessage)
    }
}
