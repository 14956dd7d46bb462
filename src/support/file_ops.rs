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

//! Miscellaneous functions for working with files.

use std::fs;
use std::io;
use std::path::Path;

use log::warn;

use crate::support::error::Error;

/// List the names of the entries in `dir`, in sorted order.
///
/// Hidden entries (starting with `.`) are skipped, as are names which are not
/// UTF-8, the latter with a warning.
pub fn list_dir(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        match name.to_str() {
            Some(name) if name.starts_with('.') => (),
            Some(name) => names.push(name.to_owned()),
            None => warn!(
                "Skipping non-UTF-8 name {:?} in {}",
                name,
                dir.display()
            ),
        }
    }

    names.sort();
    Ok(names)
}

pub trait IgnoreKinds {
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_not_found(self) -> Self {
        match self {
            Ok(r) => Ok(r),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            Err(e) => Err(e),
        }
    }
}

pub trait ErrorTransforms {
    type Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            s => s,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_dir_skips_hidden() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        fs::write(dir.path().join(".hidden"), b"").unwrap();
        assert_eq!(vec!["a", "b"], list_dir(dir.path()).unwrap());

        assert_eq!(
            Vec::<String>::new(),
            list_dir(&dir.path().join("nx")).ignore_not_found().unwrap()
        );
        assert_matches!(
            Err(Error::NxMailbox),
            list_dir(&dir.path().join("nx")).on_not_found(Error::NxMailbox)
        );
    }
}
