//! The concrete record layouts of the catalogue: text formats for the
//! three delimited inputs and binary formats for the three compressed
//! files, plus field index constants for lazy access.

use std::sync::Arc;

use crate::encoding::format::{FieldKind, Format, ListPair};

/// Field order of the accounts text input.
pub mod account_text {
    pub const ID: usize = 0;
    pub const LOGIN: usize = 1;
    pub const KIND: usize = 2;
    pub const CREATED_AT: usize = 3;
    pub const FOLLOWERS: usize = 4;
    pub const FOLLOWER_LIST: usize = 5;
    pub const FOLLOWING: usize = 6;
    pub const FOLLOWING_LIST: usize = 7;
    pub const PUBLIC_GISTS: usize = 8;
    pub const PUBLIC_REPOS: usize = 9;
}

/// Field order of a compressed account record in `users.dat`.
pub mod account {
    pub const ID: usize = 0;
    pub const LOGIN_LEN: usize = 1;
    pub const KIND: usize = 2;
    pub const FRIENDS_LEN: usize = 3;
    pub const FRIENDS: usize = 4;
    pub const LOGIN: usize = 5;
}

/// Field order of the repositories text input.
pub mod repo_text {
    pub const ID: usize = 0;
    pub const OWNER_ID: usize = 1;
    pub const FULL_NAME: usize = 2;
    pub const LICENSE: usize = 3;
    pub const HAS_WIKI: usize = 4;
    pub const DESCRIPTION: usize = 5;
    pub const LANGUAGE: usize = 6;
    pub const DEFAULT_BRANCH: usize = 7;
    pub const CREATED_AT: usize = 8;
    pub const UPDATED_AT: usize = 9;
    pub const FORKS: usize = 10;
    pub const OPEN_ISSUES: usize = 11;
    pub const STARGAZERS: usize = 12;
    pub const SIZE: usize = 13;
}

/// Field order of a compressed repository record in `repos.dat`. The
/// fields queries touch come first; the language is addressable through
/// its length field at a fixed offset.
pub mod repo {
    pub const ID: usize = 0;
    pub const OWNER_ID: usize = 1;
    pub const LAST_COMMIT: usize = 2;
    pub const LANGUAGE_LEN: usize = 3;
    pub const LANGUAGE: usize = 4;
    pub const DESCRIPTION_LEN: usize = 5;
    pub const DESCRIPTION: usize = 6;
    pub const HAS_WIKI: usize = 7;
    pub const DEFAULT_BRANCH_LEN: usize = 8;
    pub const DEFAULT_BRANCH: usize = 9;
    pub const CREATED_AT: usize = 10;
    pub const UPDATED_AT: usize = 11;
    pub const FORKS: usize = 12;
    pub const OPEN_ISSUES: usize = 13;
    pub const STARGAZERS: usize = 14;
    pub const SIZE: usize = 15;
    pub const FULL_NAME_LEN: usize = 16;
    pub const FULL_NAME: usize = 17;
    pub const LICENSE_LEN: usize = 18;
    pub const LICENSE: usize = 19;
}

/// Field order of the commits text input.
pub mod commit_text {
    pub const REPO_ID: usize = 0;
    pub const AUTHOR_ID: usize = 1;
    pub const COMMITTER_ID: usize = 2;
    pub const COMMITTED_AT: usize = 3;
    pub const MESSAGE: usize = 4;
}

/// Field order of a compressed commit record in `commits.dat`.
pub mod commit {
    pub const REPO_ID: usize = 0;
    pub const AUTHOR_ID: usize = 1;
    pub const AUTHOR_FRIEND: usize = 2;
    pub const COMMITTER_ID: usize = 3;
    pub const COMMITTER_FRIEND: usize = 4;
    pub const COMMITTED_AT: usize = 5;
    pub const MESSAGE_LEN: usize = 6;
    pub const MESSAGE: usize = 7;
}

pub fn account_text_format() -> Format {
    Format::text(
        vec![
            FieldKind::Int,      // id
            FieldKind::Str,      // login
            FieldKind::Kind,     // kind
            FieldKind::DateTime, // created_at
            FieldKind::Int,      // followers
            FieldKind::IntList,  // follower_list
            FieldKind::Int,      // following
            FieldKind::IntList,  // following_list
            FieldKind::Int,      // public_gists
            FieldKind::Int,      // public_repos
        ],
        vec![
            ListPair { list: account_text::FOLLOWER_LIST, length: account_text::FOLLOWERS },
            ListPair { list: account_text::FOLLOWING_LIST, length: account_text::FOLLOWING },
        ],
        ';',
    )
    .expect("static format")
}

pub fn account_format() -> Arc<Format> {
    Arc::new(
        Format::binary(
            vec![
                FieldKind::Int,     // id
                FieldKind::Int,     // login_len
                FieldKind::Kind,    // kind
                FieldKind::Int,     // friends_len
                FieldKind::IntList, // friends
                FieldKind::Str,     // login
            ],
            vec![
                ListPair { list: account::FRIENDS, length: account::FRIENDS_LEN },
                ListPair { list: account::LOGIN, length: account::LOGIN_LEN },
            ],
        )
        .expect("static format"),
    )
}

pub fn repo_text_format() -> Format {
    Format::text(
        vec![
            FieldKind::Int,      // id
            FieldKind::Int,      // owner_id
            FieldKind::Str,      // full_name
            FieldKind::Str,      // license
            FieldKind::Bool,     // has_wiki
            FieldKind::StrNull,  // description
            FieldKind::Str,      // language
            FieldKind::Str,      // default_branch
            FieldKind::DateTime, // created_at
            FieldKind::DateTime, // updated_at
            FieldKind::Int,      // forks
            FieldKind::Int,      // open_issues
            FieldKind::Int,      // stargazers
            FieldKind::Int,      // size
        ],
        vec![],
        ';',
    )
    .expect("static format")
}

pub fn repo_format() -> Arc<Format> {
    Arc::new(
        Format::binary(
            vec![
                FieldKind::Int,      // id
                FieldKind::Int,      // owner_id
                FieldKind::DateTime, // last_commit
                FieldKind::Int,      // language_len
                FieldKind::Str,      // language
                FieldKind::Int,      // description_len
                FieldKind::StrNull,  // description
                FieldKind::Bool,     // has_wiki
                FieldKind::Int,      // default_branch_len
                FieldKind::Str,      // default_branch
                FieldKind::DateTime, // created_at
                FieldKind::DateTime, // updated_at
                FieldKind::Int,      // forks
                FieldKind::Int,      // open_issues
                FieldKind::Int,      // stargazers
                FieldKind::Int,      // size
                FieldKind::Int,      // full_name_len
                FieldKind::Str,      // full_name
                FieldKind::Int,      // license_len
                FieldKind::Str,      // license
            ],
            vec![
                ListPair { list: repo::LANGUAGE, length: repo::LANGUAGE_LEN },
                ListPair { list: repo::DESCRIPTION, length: repo::DESCRIPTION_LEN },
                ListPair { list: repo::DEFAULT_BRANCH, length: repo::DEFAULT_BRANCH_LEN },
                ListPair { list: repo::FULL_NAME, length: repo::FULL_NAME_LEN },
                ListPair { list: repo::LICENSE, length: repo::LICENSE_LEN },
            ],
        )
        .expect("static format"),
    )
}

pub fn commit_text_format() -> Format {
    Format::text(
        vec![
            FieldKind::Int,      // repo_id
            FieldKind::Int,      // author_id
            FieldKind::Int,      // committer_id
            FieldKind::DateTime, // committed_at
            FieldKind::StrNull,  // message
        ],
        vec![],
        ';',
    )
    .expect("static format")
}

pub fn commit_format() -> Arc<Format> {
    Arc::new(
        Format::binary(
            vec![
                FieldKind::Int,      // repo_id
                FieldKind::Int,      // author_id
                FieldKind::Bool,     // author_friend
                FieldKind::Int,      // committer_id
                FieldKind::Bool,     // committer_friend
                FieldKind::DateTime, // committed_at
                FieldKind::Int,      // message_len
                FieldKind::StrNull,  // message
            ],
            vec![ListPair { list: commit::MESSAGE, length: commit::MESSAGE_LEN }],
        )
        .expect("static format"),
    )
}

/// Format of the 36-byte header file: the three kind counts and the
/// three precomputed query scalars.
pub fn header_format() -> Format {
    Format::binary(
        vec![
            FieldKind::Int,    // user count
            FieldKind::Int,    // organization count
            FieldKind::Int,    // bot count
            FieldKind::Double, // Q2
            FieldKind::Double, // Q3
            FieldKind::Double, // Q4
        ],
        vec![],
    )
    .expect("static format")
}

/// The friends of an account: the sorted, deduplicated intersection of
/// its follower and following lists.
pub fn friends_of(followers: &[u32], following: &[u32]) -> Vec<u32> {
    if followers.is_empty() || following.is_empty() {
        return Vec::new();
    }
    let mut a = followers.to_vec();
    let mut b = following.to_vec();
    a.sort_unstable();
    a.dedup();
    b.sort_unstable();
    b.dedup();

    let mut friends = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                friends.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    friends
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::format::{Record, Value};

    #[test]
    fn test_account_text_round_trip() {
        let format = account_text_format();
        let line = "83;wildling;User;2013-09-20 12:00:00;2;[10, 20];1;[10];5;12";
        let record = format.parse(line).unwrap();
        assert_eq!(record.int(account_text::ID), 83);
        assert_eq!(record.str(account_text::LOGIN), "wildling");
        assert_eq!(record.int_list(account_text::FOLLOWER_LIST), &[10, 20]);

        let mut out = Vec::new();
        format.print_text(&record, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), line);
    }

    #[test]
    fn test_account_text_rejects_list_mismatch() {
        let format = account_text_format();
        assert!(!format.validate("83;wildling;User;2013-09-20 12:00:00;3;[10, 20];1;[10];5;12"));
    }

    #[test]
    fn test_commit_text_allows_empty_message() {
        let format = commit_text_format();
        let record = format.parse("7;100;200;2020-05-01 10:30:00;").unwrap();
        assert_eq!(record.opt_str(commit_text::MESSAGE), None);
    }

    #[test]
    fn test_disk_account_layout() {
        let format = account_format();
        let record = Record(vec![
            Value::Int(7),
            Value::Int(3),
            Value::Kind(crate::encoding::AccountKind::Bot),
            Value::Int(2),
            Value::IntList(vec![1, 2]),
            Value::Str("bot".into()),
        ]);
        let mut buf = Vec::new();
        format.write_binary(&record, &mut buf).unwrap();
        // id, login_len, kind byte, friends_len, 2 friends, login bytes
        assert_eq!(buf.len(), 4 + 4 + 1 + 4 + 8 + 3);
        assert_eq!(&buf[..4], &[0, 0, 0, 7]);
        assert_eq!(buf[8], 2); // kind byte for Bot
        assert_eq!(&buf[21..], b"bot");
    }

    #[test]
    fn test_repo_disk_language_offset_is_fixed() {
        // The language length field sits at a fixed offset so index keys
        // can address it directly.
        let format = repo_format();
        assert_eq!(format.fixed_offset_of(repo::LANGUAGE_LEN), Some(12));
    }

    #[test]
    fn test_friends_of_is_sorted_intersection() {
        assert_eq!(friends_of(&[5, 3, 9, 1], &[9, 2, 3, 7]), vec![3, 9]);
        assert_eq!(friends_of(&[], &[1]), Vec::<u32>::new());
        assert_eq!(friends_of(&[1, 1, 2], &[1, 1]), vec![1]);
    }
}
