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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsafe mailbox name")]
    UnsafeName,
    #[error("No such mailbox")]
    NxMailbox,
    #[error("No such message")]
    NxMessage,
    #[error("Store '{0}' is not configured")]
    NxStore(String),
    #[error("Missing {0} option")]
    MissingOption(&'static str),
    #[error("Endpoint does not match the {0} driver")]
    WrongEndpoint(&'static str),
    #[error("Operation not supported by the {0} driver")]
    Unsupported(&'static str),
    #[error("Session failure: {0}")]
    Session(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
