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


use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::config::directive::{Diagnostics, LogDiagnostics};
use crate::config::{self, LoadedConfig};
use crate::driver::{self, Driver, Endpoint, Store};
use crate::model::message::MessageStatus;
use crate::support::error::Error;
use crate::support::sysexits::*;

macro_rules! die {
    ($ex:ident, $($stuff:tt)*) => {{
        eprintln!($($stuff)*);
        crate::support::sysexits::$ex.exit()
    }}
}

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Load the configuration file and report any problems in it.
    ///
    /// Exits with EX_CONFIG (78) if the file has errors.
    Check(CommonOptions),
    /// Print every valid store in the configuration file as TOML.
    Dump(CommonOptions),
    /// List the messages of one mailbox of a configured store.
    ///
    /// Each line shows the UID, size, maildir flag letters and the flags as
    /// the store reported them. Only maildir stores can be listed this way;
    /// IMAP stores need a session established by the synchroniser.
    List(ListSubcommand),
}

#[derive(StructOpt)]
struct CommonOptions {
    /// The configuration file [default: ~/.boxsyncrc]
    #[structopt(long, short, parse(from_os_str))]
    config: Option<PathBuf>,
}

#[derive(StructOpt)]
struct ListSubcommand {
    #[structopt(flatten)]
    common: CommonOptions,

    /// The name of the store, as given in its section header.
    store: String,

    /// The canonical name of the mailbox, e.g. "INBOX" or "Lists/rust".
    #[structopt(default_value = "INBOX")]
    mailbox: String,
}

/// Reports configuration problems straight to the user.
#[derive(Default)]
struct PrintDiagnostics {
    count: usize,
}

impl Diagnostics for PrintDiagnostics {
    fn report(&mut self, file: &str, line: usize, message: &str) {
        eprintln!("{}:{}: {}", file, line, message);
        self.count += 1;
    }
}

/// Why a command could not complete, and the status to exit with.
#[derive(Debug)]
struct Failure {
    exit: Sysexit,
    message: String,
}

impl Failure {
    fn new(exit: Sysexit, message: impl fmt::Display) -> Self {
        Failure {
            exit,
            message: message.to_string(),
        }
    }

    fn exit(self) -> ! {
        eprintln!("{}", self.message);
        self.exit.exit()
    }
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    init_logging();

    let result = match cmd {
        Command::Check(common) => {
            check(&config_path(common), &mut PrintDiagnostics::default())
        }
        Command::Dump(common) => dump(&config_path(common)),
        Command::List(cmd) => {
            list(&config_path(cmd.common), &cmd.store, &cmd.mailbox)
        }
    };

    match result {
        Ok(output) => print!("{}", output),
        Err(failure) => failure.exit(),
    }
}

fn init_logging() {
    if Ok(true) == nix::unistd::isatty(2) {
        crate::init_simple_log();
        return;
    }

    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_MAIL,
        hostname: None,
        process: env!("CARGO_PKG_NAME").to_owned(),
        pid: nix::unistd::getpid().as_raw(),
    };

    // Not being able to log is no reason to refuse to run
    if let Ok(logger) = syslog::unix(formatter) {
        let _ = log::set_boxed_logger(Box::new(syslog::BasicLogger::new(
            logger,
        )))
        .map(|_| log::set_max_level(log::LevelFilter::Info));
    }
}

fn config_path(common: CommonOptions) -> PathBuf {
    common.config.unwrap_or_else(|| match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".boxsyncrc"),
        None => die!(
            EX_CONFIG,
            "HOME is not set; use --config=/path/to/boxsyncrc"
        ),
    })
}

fn load(
    path: &Path,
    sink: &mut dyn Diagnostics,
) -> Result<LoadedConfig, Failure> {
    config::load_file(path, sink).map_err(|e| {
        Failure::new(
            EX_CONFIG,
            format_args!("Error reading '{}': {}", path.display(), e),
        )
    })
}

fn check(
    path: &Path,
    sink: &mut PrintDiagnostics,
) -> Result<String, Failure> {
    let loaded = load(path, sink)?;
    if !loaded.valid {
        return Err(Failure::new(
            EX_CONFIG,
            format_args!(
                "{}: {} error(s); {} valid store(s)",
                path.display(),
                sink.count,
                loaded.stores.len()
            ),
        ));
    }

    Ok(format!(
        "{}: OK, {} store(s)\n",
        path.display(),
        loaded.stores.len()
    ))
}

fn dump(path: &Path) -> Result<String, Failure> {
    let loaded = load(path, &mut LogDiagnostics::default())?;
    loaded.to_toml().map_err(|e| {
        Failure::new(
            EX_SOFTWARE,
            format_args!("Failed to format configuration: {}", e),
        )
    })
}

fn list(path: &Path, store: &str, mailbox: &str) -> Result<String, Failure> {
    let loaded = load(path, &mut LogDiagnostics::default())?;

    let store_config = loaded.store(store).ok_or_else(|| {
        Failure::new(EX_CONFIG, Error::NxStore(store.to_owned()))
    })?;

    let driver = driver::driver(store_config.driver);
    let mut store =
        driver
            .open(store_config, Endpoint::Local)
            .map_err(|e| match e {
                Error::WrongEndpoint(..) => Failure::new(EX_UNAVAILABLE, e),
                e => Failure::new(EX_CONFIG, e),
            })?;

    let messages = store.list(mailbox).map_err(|e| {
        let exit = match e {
            Error::NxMailbox => EX_NOINPUT,
            Error::UnsafeName => EX_USAGE,
            Error::Io(..) => EX_IOERR,
            _ => EX_SOFTWARE,
        };
        Failure::new(exit, format_args!("{}: {}", mailbox, e))
    })?;

    let mut output = String::new();
    for message in &messages {
        let flags: Vec<&str> = message.flags.iter().collect();
        output.push_str(&format!(
            "{:>8} {:>10} {:<6}{} {}\n",
            message.uid,
            message.size,
            message.sys_flags.to_maildir_info(),
            if message.status.contains(MessageStatus::RECENT) {
                " new"
            } else {
                "    "
            },
            flags.join(" "),
        ));
    }
    messages.release();

    Ok(output)
}

#[cfg(test)]
mod test {
    use std::fs;

    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;
    use crate::config::store::{BackendConfig, StoreConfig};

    struct Setup {
        root: TempDir,
        config: PathBuf,
    }

    fn set_up() -> Setup {
        crate::init_test_log();

        let root = TempDir::new().unwrap();
        let inbox = root.path().join("inbox");
        for sub in &["cur", "new", "tmp"] {
            fs::create_dir_all(inbox.join(sub)).unwrap();
        }
        fs::write(inbox.join("new").join("200.b,U=2"), "hello").unwrap();
        fs::write(inbox.join("cur").join("100.a,U=1,S=1234:2,FS"), "x")
            .unwrap();

        let config = root.path().join("boxsyncrc");
        fs::write(
            &config,
            format!(
                "MaildirStore local\n\
                 Path {}\n\
                 Inbox {}\n\
                 \n\
                 IMAPStore remote\n\
                 Host imap.example.com\n",
                root.path().join("mail").display(),
                inbox.display()
            ),
        )
        .unwrap();

        Setup { root, config }
    }

    #[test]
    fn check_valid_config() {
        let setup = set_up();
        let output =
            check(&setup.config, &mut PrintDiagnostics::default()).unwrap();
        assert!(output.ends_with(": OK, 2 store(s)\n"), "{}", output);
    }

    #[test]
    fn check_invalid_config() {
        let setup = set_up();
        let config = setup.root.path().join("bad");
        fs::write(&config, "MaildirStore x\nFlatten a/b\nPath /x\n").unwrap();

        let mut sink = PrintDiagnostics::default();
        let failure = check(&config, &mut sink).unwrap_err();
        assert_eq!(EX_CONFIG, failure.exit);
        assert!(
            failure.message.ends_with("1 error(s); 0 valid store(s)"),
            "{}",
            failure.message
        );
        assert_eq!(1, sink.count);

        assert_matches!(
            Err(Failure {
                exit: EX_CONFIG,
                ..
            }),
            check(
                &setup.root.path().join("nx"),
                &mut PrintDiagnostics::default()
            )
        );
    }

    #[derive(Deserialize)]
    struct Dumped {
        store: Vec<StoreConfig>,
    }

    #[test]
    fn dump_prints_every_store() {
        let setup = set_up();
        let output = dump(&setup.config).unwrap();
        assert_eq!(2, output.matches("[[store]]").count(), "{}", output);

        let dumped: Dumped = toml::from_str(&output).unwrap();
        assert_eq!(2, dumped.store.len());
        assert_eq!("local", dumped.store[0].name);
        assert_eq!(
            BackendConfig::Maildir {
                path: Some(setup.root.path().join("mail")),
                inbox: Some(setup.root.path().join("inbox")),
            },
            dumped.store[0].backend
        );
        assert_eq!("remote", dumped.store[1].name);
        assert_eq!(
            BackendConfig::Imap {
                host: Some("imap.example.com".to_owned()),
                port: 993,
                user: None,
            },
            dumped.store[1].backend
        );
    }

    #[test]
    fn list_prints_messages() {
        let setup = set_up();
        let output = list(&setup.config, "local", "INBOX").unwrap();
        let lines: Vec<Vec<&str>> = output
            .lines()
            .map(|l| l.split_whitespace().collect())
            .collect();
        assert_eq!(
            vec![
                vec!["1", "1234", "FS", "\\Flagged", "\\Seen"],
                vec!["2", "5", "new"],
            ],
            lines
        );
    }

    #[test]
    fn list_failures() {
        let setup = set_up();
        assert_matches!(
            Err(Failure {
                exit: EX_UNAVAILABLE,
                ..
            }),
            list(&setup.config, "remote", "INBOX")
        );
        assert_matches!(
            Err(Failure {
                exit: EX_CONFIG,
                ..
            }),
            list(&setup.config, "nope", "INBOX")
        );
        assert_matches!(
            Err(Failure {
                exit: EX_NOINPUT,
                ..
            }),
            list(&setup.config, "local", "Archive")
        );
        assert_matches!(
            Err(Failure {
                exit: EX_USAGE,
                ..
            }),
            list(&setup.config, "local", "../x")
        );
    }
}
