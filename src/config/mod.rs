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

//! Configuration loading.
//!
//! The configuration file consists of store sections, each opened by a
//! `MaildirStore name` or `IMAPStore name` line and ended by a blank line or
//! the next section header. Every other line of a section is first offered to
//! the driver of the store, then treated as a generic store option.

use std::fs;
use std::path::Path;

use log::info;
use serde::Serialize;

use self::directive::{
    ConfigFile, Diagnostics, Directive, DirectiveReader, Entry,
};
use self::store::{parse_generic_store, StoreConfig};
use crate::driver::{self, Driver};
use crate::support::error::Error;

pub mod directive;
pub mod store;

/// The result of loading a configuration file.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    /// Every store whose section had no errors, in file order.
    pub stores: Vec<StoreConfig>,
    /// Whether the whole file was free of errors.
    pub valid: bool,
}

impl LoadedConfig {
    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| name == s.name)
    }

    /// Render the loaded stores as TOML, one `[[store]]` table each.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&StoreTables {
            store: &self.stores,
        })
    }
}

#[derive(Serialize)]
struct StoreTables<'a> {
    store: &'a [StoreConfig],
}

struct Section {
    driver: &'static dyn Driver,
    store: StoreConfig,
    header: Directive,
    errors_before: usize,
}

/// Parse the store sections of `text`, which was read from `file`.
///
/// Problems are reported to `sink`. A store with any error in its section is
/// left out of the result entirely.
pub fn load_stores(
    file: &str,
    text: &str,
    sink: &mut dyn Diagnostics,
) -> LoadedConfig {
    let mut cfg = ConfigFile::new(sink);
    let mut stores = Vec::<StoreConfig>::new();
    let mut section: Option<Section> = None;

    for entry in DirectiveReader::new(file, text) {
        let directive = match entry {
            Entry::SectionBreak => {
                if let Some(section) = section.take() {
                    finish_section(section, &mut stores, &mut cfg);
                }
                continue;
            }
            Entry::Directive(d) => d,
        };

        if let Some(driver) = driver::by_section_keyword(&directive.keyword) {
            if let Some(section) = section.take() {
                finish_section(section, &mut stores, &mut cfg);
            }

            let errors_before = cfg.errors();
            if directive.value.is_empty() {
                cfg.error(&directive, "store section has no name");
            }
            section = Some(Section {
                driver,
                store: StoreConfig::new(
                    directive.value.clone(),
                    driver.kind(),
                ),
                header: directive,
                errors_before,
            });
            continue;
        }

        match section {
            Some(ref mut section) => {
                if !section.driver.parse_store(
                    &mut section.store,
                    &directive,
                    &mut cfg,
                ) {
                    parse_generic_store(
                        &mut section.store,
                        &directive,
                        &mut cfg,
                    );
                }
            }
            None => cfg.error(
                &directive,
                format_args!(
                    "'{}' is not a store section keyword",
                    directive.keyword
                ),
            ),
        }
    }

    if let Some(section) = section {
        finish_section(section, &mut stores, &mut cfg);
    }

    LoadedConfig {
        stores,
        valid: cfg.is_valid(),
    }
}

fn finish_section(
    section: Section,
    stores: &mut Vec<StoreConfig>,
    cfg: &mut ConfigFile<'_>,
) {
    section
        .driver
        .finish_store(&section.store, &section.header, cfg);

    if stores.iter().any(|s| s.name == section.store.name) {
        cfg.error(
            &section.header,
            format_args!("duplicate store '{}'", section.store.name),
        );
    }

    if cfg.errors() == section.errors_before {
        stores.push(section.store);
    } else {
        info!(
            "{}: Ignoring store '{}' due to errors",
            section.header.file, section.store.name
        );
    }
}

/// Read and load the configuration file at `path`.
pub fn load_file(
    path: &Path,
    sink: &mut dyn Diagnostics,
) -> Result<LoadedConfig, Error> {
    let text = fs::read_to_string(path)?;
    Ok(load_stores(&path.display().to_string(), &text, sink))
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use serde::Deserialize;

    use super::directive::LogDiagnostics;
    use super::store::BackendConfig;
    use super::*;
    use crate::driver::DriverKind;

    fn load(text: &str) -> (LoadedConfig, Vec<String>) {
        crate::init_test_log();
        let mut sink = LogDiagnostics::default();
        let loaded = load_stores("rc", text, &mut sink);
        (loaded, sink.messages)
    }

    #[test]
    fn two_stores() {
        let (loaded, messages) = load(
            "# Local side\n\
             MaildirStore local\n\
             Path /home/me/Mail/\n\
             Inbox /home/me/Maildir\n\
             Flatten .\n\
             Trash Trash\n\
             \n\
             IMAPStore remote\n\
             Host imap.example.com\n\
             User me\n\
             MaxSize 10m\n\
             TrashRemoteNew yes\n",
        );
        assert!(messages.is_empty(), "{:?}", messages);
        assert!(loaded.valid);
        assert_eq!(2, loaded.stores.len());

        let local = loaded.store("local").unwrap();
        assert_eq!(DriverKind::Maildir, local.driver);
        assert_eq!(Some(".".to_owned()), local.flat_delim);
        assert_eq!(Some("Trash".to_owned()), local.trash);
        assert_eq!(
            BackendConfig::Maildir {
                path: Some(PathBuf::from("/home/me/Mail/")),
                inbox: Some(PathBuf::from("/home/me/Maildir")),
            },
            local.backend
        );

        let remote = loaded.store("remote").unwrap();
        assert_eq!(DriverKind::Imap, remote.driver);
        assert_eq!(Some(10 * 1024 * 1024), remote.max_size);
        assert!(remote.trash_remote_new);
        assert_eq!(
            BackendConfig::Imap {
                host: Some("imap.example.com".to_owned()),
                port: 993,
                user: Some("me".to_owned()),
            },
            remote.backend
        );
    }

    #[test]
    fn header_ends_previous_section() {
        let (loaded, messages) = load(
            "maildirstore a\n\
             Path /a\n\
             MaildirStore b\n\
             Path /b\n",
        );
        assert!(messages.is_empty(), "{:?}", messages);
        assert_eq!(
            vec!["a", "b"],
            loaded
                .stores
                .iter()
                .map(|s| &s.name[..])
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn invalid_section_is_dropped() {
        let (loaded, messages) = load(
            "MaildirStore bad\n\
             Path /bad\n\
             Flatten a/b\n\
             \n\
             MaildirStore good\n\
             Path /good\n",
        );
        assert!(!loaded.valid);
        assert_eq!(1, loaded.stores.len());
        assert_eq!("good", loaded.stores[0].name);
        assert_eq!(
            vec![
                "rc:3: flattened hierarchy delimiter cannot contain the \
                 canonical delimiter '/'"
            ],
            messages
        );
    }

    #[test]
    fn incomplete_and_duplicate_stores() {
        let (loaded, messages) = load(
            "IMAPStore remote\n\
             User me\n\
             \n\
             MaildirStore local\n\
             Path /a\n\
             \n\
             MaildirStore local\n\
             Path /b\n\
             \n\
             MaildirStore\n\
             Path /c\n",
        );
        assert!(!loaded.valid);
        assert_eq!(1, loaded.stores.len());
        assert_eq!(
            BackendConfig::Maildir {
                path: Some(PathBuf::from("/a")),
                inbox: None,
            },
            loaded.stores[0].backend
        );
        assert_eq!(
            vec![
                "rc:1: store 'remote' has no Host",
                "rc:7: duplicate store 'local'",
                "rc:10: store section has no name",
            ],
            messages
        );
    }

    #[test]
    fn directives_outside_sections() {
        let (loaded, messages) = load(
            "Trash Trash\n\
             \n\
             MaildirStore local\n\
             Path /a\n\
             Bogus 1\n",
        );
        assert!(!loaded.valid);
        assert!(loaded.stores.is_empty());
        assert_eq!(
            vec![
                "rc:1: 'Trash' is not a store section keyword",
                "rc:5: unknown keyword 'Bogus'",
            ],
            messages
        );
    }

    #[derive(Deserialize)]
    struct ReadBack {
        store: Vec<StoreConfig>,
    }

    #[test]
    fn stores_render_as_toml() {
        let (loaded, messages) = load(
            "MaildirStore local\n\
             Path /home/me/Mail\n\
             Flatten .\n\
             MaxSize 1m\n\
             \n\
             IMAPStore remote\n\
             Host imap.example.com\n\
             Port 143\n\
             MapInbox Remote\n",
        );
        assert!(messages.is_empty(), "{:?}", messages);
        assert_eq!(2, loaded.stores.len());

        let rendered = loaded.to_toml().unwrap();
        assert!(rendered.contains("type = \"maildir\""), "{}", rendered);
        assert!(rendered.contains("type = \"imap\""), "{}", rendered);

        let read_back: ReadBack = toml::from_str(&rendered).unwrap();
        assert_eq!(loaded.stores, read_back.store);
    }

    #[test]
    fn no_stores_render_as_empty_list() {
        let (loaded, _) = load("# nothing here\n");
        let read_back: ReadBack =
            toml::from_str(&loaded.to_toml().unwrap()).unwrap();
        assert!(read_back.store.is_empty());
    }

    #[test]
    fn missing_file() {
        let mut sink = LogDiagnostics::default();
        assert_matches!(
            Err(Error::Io(_)),
            load_file(Path::new("/nonexistent/boxsyncrc"), &mut sink)
        );
    }
}
