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

/// Determine whether `name` is safe to use as one path component of a
/// mailbox on the local file system.
///
/// This excludes empty names and patterns that cause directory traversal or
/// hidden files, as well as characters that are wildcards in IMAP and so
/// could never be synchronised to the other side.
///
/// This does not care about whether the name is ultimately a valid file name;
/// for that, we simply rely on the OS rejecting it.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() &&
        // Block directory traversal through .. and creation of hidden files
        // (which maildir readers skip)
        !name.starts_with('.') &&
        !name.contains('/') &&
        // Only a path separator on Windows, but always block since it has high
        // potential of causing problems
        !name.contains('\\') &&
        // Don't allow any ASCII control characters
        !name.contains(|c: char| c < ' ' || c == '\x7F') &&
        !name.contains(|c: char| c == '*' || c == '%')
}
