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

//! The configuration directive stream.
//!
//! A configuration file is a sequence of `Keyword value` lines. Blank lines
//! separate sections, and lines starting with `#` are comments. Values may be
//! wrapped in double quotes to preserve leading or trailing whitespace.

use std::fmt;
use std::iter::Enumerate;
use std::str::Lines;
use std::sync::Arc;

use log::error;

/// A single `keyword value` line and where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    pub keyword: String,
    pub value: String,
    pub file: Arc<str>,
    /// 1-based line number.
    pub line: usize,
}

impl Directive {
    pub fn new(
        keyword: impl Into<String>,
        value: impl Into<String>,
        file: impl Into<Arc<str>>,
        line: usize,
    ) -> Self {
        Directive {
            keyword: keyword.into(),
            value: value.into(),
            file: file.into(),
            line,
        }
    }

    /// Return whether this directive has the given keyword, which is matched
    /// case-insensitively.
    pub fn is(&self, keyword: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(keyword)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} {}",
            self.file, self.line, self.keyword, self.value
        )
    }
}

/// What the reader found on a meaningful line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    Directive(Directive),
    /// A blank line, which ends the current section.
    SectionBreak,
}

/// Splits configuration text into `Entry`s.
pub struct DirectiveReader<'a> {
    file: Arc<str>,
    lines: Enumerate<Lines<'a>>,
}

impl<'a> DirectiveReader<'a> {
    pub fn new(file: &str, text: &'a str) -> Self {
        DirectiveReader {
            file: Arc::from(file),
            lines: text.lines().enumerate(),
        }
    }
}

impl<'a> Iterator for DirectiveReader<'a> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        for (ix, line) in &mut self.lines {
            let line = line.trim();
            if line.is_empty() {
                return Some(Entry::SectionBreak);
            }

            if line.starts_with('#') {
                continue;
            }

            let (keyword, value) = match line.find(char::is_whitespace) {
                Some(split) => (&line[..split], line[split..].trim()),
                None => (line, ""),
            };

            let value = if value.len() >= 2
                && value.starts_with('"')
                && value.ends_with('"')
            {
                &value[1..value.len() - 1]
            } else {
                value
            };

            return Some(Entry::Directive(Directive::new(
                keyword,
                value,
                Arc::clone(&self.file),
                ix + 1,
            )));
        }

        None
    }
}

/// Receives configuration diagnostics without interrupting parsing.
pub trait Diagnostics {
    fn report(&mut self, file: &str, line: usize, message: &str);
}

/// A `Diagnostics` sink which logs every message and keeps them for later
/// display.
#[derive(Clone, Debug, Default)]
pub struct LogDiagnostics {
    pub messages: Vec<String>,
}

impl Diagnostics for LogDiagnostics {
    fn report(&mut self, file: &str, line: usize, message: &str) {
        let message = format!("{}:{}: {}", file, line, message);
        error!("{}", message);
        self.messages.push(message);
    }
}

/// Parsing state shared by everything handling directives of one file.
///
/// Errors are accumulated: each one is reported to the sink and counted, and
/// parsing carries on so that a single pass surfaces every problem.
pub struct ConfigFile<'a> {
    sink: &'a mut dyn Diagnostics,
    errors: usize,
}

impl<'a> ConfigFile<'a> {
    pub fn new(sink: &'a mut dyn Diagnostics) -> Self {
        ConfigFile { sink, errors: 0 }
    }

    /// Report `message` against the location of `directive` and mark the
    /// configuration invalid.
    pub fn error(&mut self, directive: &Directive, message: impl fmt::Display) {
        self.sink
            .report(&directive.file, directive.line, &message.to_string());
        self.errors += 1;
    }

    /// The number of errors reported so far.
    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn is_valid(&self) -> bool {
        0 == self.errors
    }
}
