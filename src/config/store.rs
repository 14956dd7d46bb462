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

//! Options shared by every kind of store.

use std::borrow::Cow;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::directive::{ConfigFile, Directive};
use crate::driver::DriverKind;

/// The configuration of one store.
///
/// Everything but `backend` is understood by all drivers; `backend` holds the
/// options only one driver understands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    pub driver: DriverKind,
    /// The mailbox deleted messages are moved to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash: Option<String>,
    /// Whether messages that only exist on the other side are also moved to
    /// the trash of this store when deleted.
    #[serde(default)]
    pub trash_remote_new: bool,
    /// Whether only messages which were never propagated go to the trash.
    #[serde(default)]
    pub trash_only_new: bool,
    /// Messages larger than this many bytes are not propagated into this
    /// store. `None` means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// The name under which `INBOX` appears in the hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_inbox: Option<String>,
    /// If set, the hierarchy is flattened, with this string replacing `/` in
    /// mailbox names. Never contains `/` itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_delim: Option<String>,
    pub backend: BackendConfig,
}

/// Options only one driver understands.
///
/// Serialises as a table with a `type` key naming the driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Maildir {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inbox: Option<PathBuf>,
    },
    Imap {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        port: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
}

impl BackendConfig {
    fn for_driver(driver: DriverKind) -> Self {
        match driver {
            DriverKind::Maildir => BackendConfig::Maildir {
                path: None,
                inbox: None,
            },
            DriverKind::Imap => BackendConfig::Imap {
                host: None,
                port: 993,
                user: None,
            },
        }
    }
}

impl StoreConfig {
    /// Create a configuration with every generic option at its default.
    pub fn new(name: impl Into<String>, driver: DriverKind) -> Self {
        StoreConfig {
            name: name.into(),
            driver,
            trash: None,
            trash_remote_new: false,
            trash_only_new: false,
            max_size: None,
            map_inbox: None,
            flat_delim: None,
            backend: BackendConfig::for_driver(driver),
        }
    }

    /// Translate a canonical mailbox name (`/`-separated, `INBOX` for the
    /// inbox) into the name this store uses for it.
    ///
    /// This applies `map_inbox`, then `flat_delim`.
    pub fn store_mailbox_name<'a>(&self, mailbox: &'a str) -> Cow<'a, str> {
        if Some(mailbox) == self.map_inbox.as_deref() {
            return Cow::Borrowed("INBOX");
        }

        match self.flat_delim {
            Some(ref delim) if mailbox.contains('/') => {
                Cow::Owned(mailbox.replace('/', delim))
            }
            _ => Cow::Borrowed(mailbox),
        }
    }
}

/// Handle a directive that applies to every kind of store.
///
/// Unknown keywords and invalid values are reported to `cfg`, which makes the
/// whole configuration invalid, but do not stop processing.
pub fn parse_generic_store(
    store: &mut StoreConfig,
    directive: &Directive,
    cfg: &mut ConfigFile<'_>,
) {
    if directive.is("Trash") {
        store.trash = Some(directive.value.clone());
    } else if directive.is("TrashRemoteNew") {
        store.trash_remote_new = parse_bool(directive, cfg);
    } else if directive.is("TrashNewOnly") {
        store.trash_only_new = parse_bool(directive, cfg);
    } else if directive.is("MaxSize") {
        store.max_size = Some(parse_size(directive, cfg)).filter(|&s| s > 0);
    } else if directive.is("MapInbox") {
        store.map_inbox = Some(directive.value.clone());
    } else if directive.is("Flatten") {
        if directive.value.contains('/') {
            cfg.error(
                directive,
                "flattened hierarchy delimiter cannot contain the \
                 canonical delimiter '/'",
            );
            return;
        }

        if directive.value.is_empty() {
            cfg.error(directive, "flattened hierarchy delimiter is empty");
            return;
        }

        store.flat_delim = Some(directive.value.clone());
    } else {
        cfg.error(
            directive,
            format_args!("unknown keyword '{}'", directive.keyword),
        );
    }
}

/// Parse the value of `directive` as a boolean.
///
/// On error, the error is reported and `false` is returned.
pub fn parse_bool(directive: &Directive, cfg: &mut ConfigFile<'_>) -> bool {
    let value = &directive.value;
    if ["yes", "true", "on", "1"]
        .iter()
        .any(|t| value.eq_ignore_ascii_case(t))
    {
        true
    } else if ["no", "false", "off", "0"]
        .iter()
        .any(|f| value.eq_ignore_ascii_case(f))
    {
        false
    } else {
        cfg.error(
            directive,
            format_args!("invalid boolean value '{}'", value),
        );
        false
    }
}

/// Parse the value of `directive` as a byte count.
///
/// The number may be followed by `k` or `m` (binary multiples), and then
/// optionally by `b`, all case-insensitive. On error, the error is reported
/// and 0 is returned.
pub fn parse_size(directive: &Directive, cfg: &mut ConfigFile<'_>) -> u64 {
    match size_value(&directive.value) {
        Some(size) => size,
        None => {
            cfg.error(
                directive,
                format_args!("invalid size '{}'", directive.value),
            );
            0
        }
    }
}

fn size_value(s: &str) -> Option<u64> {
    let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, mut suffix) = s.split_at(digits_end);
    let mut value: u64 = digits.parse().ok()?;

    let multiplier = match suffix.chars().next() {
        Some('k') | Some('K') => 1024,
        Some('m') | Some('M') => 1024 * 1024,
        _ => 1,
    };
    if multiplier > 1 {
        suffix = &suffix[1..];
        value = value.checked_mul(multiplier)?;
    }

    if suffix.eq_ignore_ascii_case("b") || suffix.is_empty() {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::directive::LogDiagnostics;

    fn parse(
        store: &mut StoreConfig,
        keyword: &str,
        value: &str,
    ) -> (bool, Vec<String>) {
        let mut sink = LogDiagnostics::default();
        let valid = {
            let mut cfg = ConfigFile::new(&mut sink);
            parse_generic_store(
                store,
                &Directive::new(keyword, value, "boxsyncrc", 7),
                &mut cfg,
            );
            cfg.is_valid()
        };
        (valid, sink.messages)
    }

    #[test]
    fn flatten_rejects_canonical_delimiter() {
        let mut store = StoreConfig::new("local", DriverKind::Maildir);
        let (valid, messages) = parse(&mut store, "Flatten", "a/b");
        assert!(!valid);
        assert_eq!(None, store.flat_delim);
        assert_eq!(
            vec![
                "boxsyncrc:7: flattened hierarchy delimiter cannot contain \
                 the canonical delimiter '/'"
            ],
            messages
        );

        let (valid, messages) = parse(&mut store, "Flatten", ".");
        assert!(valid);
        assert!(messages.is_empty());
        assert_eq!(Some(".".to_owned()), store.flat_delim);

        let (valid, _) = parse(&mut store, "Flatten", "");
        assert!(!valid);
        assert_eq!(Some(".".to_owned()), store.flat_delim);
    }

    #[test]
    fn generic_options() {
        let mut store = StoreConfig::new("remote", DriverKind::Imap);
        assert!(parse(&mut store, "trash", "Deleted Items").0);
        assert!(parse(&mut store, "TrashRemoteNew", "yes").0);
        assert!(parse(&mut store, "TRASHNEWONLY", "on").0);
        assert!(parse(&mut store, "MaxSize", "100k").0);
        assert!(parse(&mut store, "MapInbox", "inbox-remote").0);

        assert_eq!(Some("Deleted Items".to_owned()), store.trash);
        assert!(store.trash_remote_new);
        assert!(store.trash_only_new);
        assert_eq!(Some(102_400), store.max_size);
        assert_eq!(Some("inbox-remote".to_owned()), store.map_inbox);

        assert!(parse(&mut store, "TrashNewOnly", "false").0);
        assert!(!store.trash_only_new);
        assert!(parse(&mut store, "MaxSize", "0").0);
        assert_eq!(None, store.max_size);
    }

    #[test]
    fn unknown_keyword() {
        let mut store = StoreConfig::new("local", DriverKind::Maildir);
        let before = store.clone();
        let (valid, messages) = parse(&mut store, "Tarsh", "Trash");
        assert!(!valid);
        assert_eq!(vec!["boxsyncrc:7: unknown keyword 'Tarsh'"], messages);
        assert_eq!(before, store);
    }

    #[test]
    fn bad_values() {
        let mut store = StoreConfig::new("local", DriverKind::Maildir);
        let (valid, messages) = parse(&mut store, "TrashNewOnly", "maybe");
        assert!(!valid);
        assert_eq!(
            vec!["boxsyncrc:7: invalid boolean value 'maybe'"],
            messages
        );

        let (valid, messages) = parse(&mut store, "MaxSize", "12q");
        assert!(!valid);
        assert_eq!(vec!["boxsyncrc:7: invalid size '12q'"], messages);
    }

    #[test]
    fn size_values() {
        assert_eq!(Some(0), size_value("0"));
        assert_eq!(Some(1234), size_value("1234"));
        assert_eq!(Some(1234), size_value("1234b"));
        assert_eq!(Some(2048), size_value("2k"));
        assert_eq!(Some(2048), size_value("2KB"));
        assert_eq!(Some(3 * 1024 * 1024), size_value("3M"));
        assert_eq!(Some(3 * 1024 * 1024), size_value("3mb"));
        assert_eq!(None, size_value(""));
        assert_eq!(None, size_value("k"));
        assert_eq!(None, size_value("10 k"));
        assert_eq!(None, size_value("10kk"));
        assert_eq!(None, size_value("10g"));
        assert_eq!(None, size_value("-1"));
        assert_eq!(None, size_value("99999999999999999999m"));
    }

    #[test]
    fn mailbox_name_mapping() {
        let mut store = StoreConfig::new("remote", DriverKind::Imap);
        assert_eq!("INBOX", store.store_mailbox_name("INBOX"));
        assert_eq!("a/b", store.store_mailbox_name("a/b"));

        store.flat_delim = Some(".".to_owned());
        store.map_inbox = Some("Inbox/Remote".to_owned());
        assert_eq!("a.b.c", store.store_mailbox_name("a/b/c"));
        assert_eq!("plain", store.store_mailbox_name("plain"));
        assert_eq!("INBOX", store.store_mailbox_name("Inbox/Remote"));
    }
}
