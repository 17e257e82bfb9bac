//! Catalogue construction: ingest the three delimited inputs, emit the
//! compressed record files, build and sort the index set, back-fill the
//! friend flags and persist the header scalars.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{FileId, PageCache};
use crate::catalog::records::{
    self, account, account_text, commit, commit_text, friends_of, repo, repo_text,
};
use crate::catalog::{
    write_header, Catalog, Header, COLLABORATORS, COLLABORATORS_VALS, COMMITS_BY_DATE,
    COMMITS_BY_REPO, COMMITS_BY_REPO_VALS, COMMITS_DAT, HEADER, REPOS_BY_ID, REPOS_BY_LANGUAGE,
    REPOS_BY_LANGUAGE_VALS, REPOS_BY_LAST_COMMIT, REPOS_DAT, USERS_BY_ID, USERS_DAT,
};
use crate::config::CatalogConfig;
use crate::date::Timestamp;
use crate::encoding::format::{Format, Record, Value};
use crate::encoding::{AccountKind, LazyRecord};
use crate::errdata;
use crate::error::Result;
use crate::index::{Indexer, KeyOrder, ProbeKey};

/// Builds the catalogue from the text inputs, replacing any persisted
/// files.
pub(crate) fn build(config: CatalogConfig) -> Result<Catalog> {
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        "building catalogue"
    );
    fs::create_dir_all(&config.output_dir)?;

    let cache = PageCache::new(config.cache_frames);

    let users_file = create_rw(&config.output_path(USERS_DAT))?;
    let commits_file = create_rw(&config.output_path(COMMITS_DAT))?;
    let repos_file = create_rw(&config.output_path(REPOS_DAT))?;
    let users = cache.register(users_file.clone());
    let commits = cache.register(commits_file.clone());
    let repos = cache.register(repos_file.clone());

    let account_format = records::account_format();
    let commit_format = records::commit_format();
    let repo_format = records::repo_format();

    let mut users_by_id =
        Indexer::create(Some(&config.output_path(USERS_BY_ID)), KeyOrder::Id, Some(users), &cache)?;
    let mut repos_by_id =
        Indexer::create(Some(&config.output_path(REPOS_BY_ID)), KeyOrder::Id, Some(repos), &cache)?;
    let mut commits_by_repo =
        Indexer::create(Some(&config.output_path(COMMITS_BY_REPO)), KeyOrder::Id, Some(commits), &cache)?;
    let mut repos_by_last_commit = Indexer::create(
        Some(&config.output_path(REPOS_BY_LAST_COMMIT)),
        KeyOrder::Id,
        Some(repos),
        &cache,
    )?;
    let mut repos_by_language = Indexer::create(
        Some(&config.output_path(REPOS_BY_LANGUAGE)),
        KeyOrder::Text { keys: repos },
        Some(repos),
        &cache,
    )?;
    let mut commits_by_date =
        Indexer::create(Some(&config.output_path(COMMITS_BY_DATE)), KeyOrder::Id, Some(commits), &cache)?;
    let mut collaborators =
        Indexer::create(Some(&config.output_path(COLLABORATORS)), KeyOrder::Id, Some(users), &cache)?;

    let run_entries = config.sort_run_entries;

    // Account ingestion and the repository id pre-scan are independent.
    let (counts, repo_ids) = rayon::join(
        || parse_accounts(&config, &cache, &users_file, &account_format, &mut users_by_id, run_entries),
        || scan_repo_ids(&config),
    );
    let (user_count, organization_count, bot_count) = counts?;
    let repo_ids = repo_ids?;

    let last_commit = filter_commits(&config, &cache, &commits_file, &users_by_id, &repo_ids)?;

    // Repository ingestion and commit indexing share only read-only
    // state: the accounts index and the finished commits file.
    let (repos_result, commits_result) = rayon::join(
        || {
            parse_repos(
                &config,
                &cache,
                &repos_file,
                &repo_format,
                &users_by_id,
                &last_commit,
                &mut repos_by_id,
                &mut repos_by_last_commit,
                &mut repos_by_language,
                run_entries,
            )
        },
        || {
            parse_commits(
                &cache,
                &commits_file,
                commits,
                &commit_format,
                &users_by_id,
                &mut commits_by_date,
                &mut commits_by_repo,
                &mut collaborators,
                run_entries,
                &config,
            )
        },
    );
    repos_result?;
    commits_result?;

    let mut catalog = Catalog {
        config,
        cache,
        users,
        commits,
        repos,
        account_format,
        commit_format,
        repo_format,
        users_by_id,
        repos_by_id,
        commits_by_repo,
        repos_by_last_commit,
        repos_by_language,
        commits_by_date,
        collaborators,
        header: Header {
            user_count: 0,
            organization_count: 0,
            bot_count: 0,
            q2: 0.0,
            q3: 0.0,
            q4: 0.0,
        },
    };

    catalog.header = solve_static_queries(&catalog, user_count, organization_count, bot_count)?;
    write_header(&catalog.config.output_path(HEADER), &catalog.header)?;

    info!(
        accounts = catalog.account_count(),
        commits = catalog.commit_count(),
        repo_groups = catalog.repo_group_count(),
        "catalogue built"
    );
    Ok(catalog)
}

fn create_rw(path: &Path) -> Result<Arc<File>> {
    Ok(Arc::new(
        File::options().read(true).write(true).create(true).truncate(true).open(path)?,
    ))
}

/// Streams the accounts input: validates each record, derives the
/// friends list, emits the compressed record, feeds the id index and
/// counts account kinds. The index is sorted at the end so the commit
/// filter can search it.
fn parse_accounts(
    config: &CatalogConfig,
    cache: &PageCache,
    file: &Arc<File>,
    format: &Arc<Format>,
    users_by_id: &mut Indexer,
    run_entries: usize,
) -> Result<(u32, u32, u32)> {
    let text_format = records::account_text_format();
    let input = BufReader::new(File::open(config.input_path(&config.accounts_file))?);
    let mut writer = BufWriter::new(file.as_ref());

    let (mut user_count, mut organization_count, mut bot_count) = (0u32, 0u32, 0u32);
    let (mut accepted, mut dropped) = (0u64, 0u64);
    let mut pos = 0u64;
    let mut buf = Vec::new();

    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if i == 0 {
            continue;
        }
        let record = match text_format.parse(line.trim_end_matches('\r')) {
            Ok(record) => record,
            Err(err) => {
                debug!(line = i + 1, %err, "account dropped");
                dropped += 1;
                continue;
            }
        };

        match record.kind(account_text::KIND) {
            AccountKind::User => user_count += 1,
            AccountKind::Organization => organization_count += 1,
            AccountKind::Bot => bot_count += 1,
        }

        let friends = friends_of(
            record.int_list(account_text::FOLLOWER_LIST),
            record.int_list(account_text::FOLLOWING_LIST),
        );
        let login = record.str(account_text::LOGIN);
        let disk = Record(vec![
            Value::Int(record.int(account_text::ID)),
            Value::Int(login.len() as u32),
            Value::Kind(record.kind(account_text::KIND)),
            Value::Int(friends.len() as u32),
            Value::IntList(friends),
            Value::Str(login.to_string()),
        ]);

        buf.clear();
        format.write_binary(&disk, &mut buf)?;
        writer.write_all(&buf)?;
        users_by_id.insert(record.int(account_text::ID) as u64, pos)?;
        pos += buf.len() as u64;
        accepted += 1;
    }
    writer.flush()?;
    users_by_id.sort(cache, run_entries)?;

    info!(accepted, dropped, "accounts ingested");
    Ok((user_count, organization_count, bot_count))
}

/// Collects the ids of every well-formed repository in the input,
/// before any acceptance filtering.
fn scan_repo_ids(config: &CatalogConfig) -> Result<HashSet<u32>> {
    let text_format = records::repo_text_format();
    let input = BufReader::new(File::open(config.input_path(&config.repos_file))?);

    let mut ids = HashSet::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if i == 0 {
            continue;
        }
        if let Ok(record) = text_format.parse(line.trim_end_matches('\r')) {
            ids.insert(record.int(repo_text::ID));
        }
    }
    debug!(repos = ids.len(), "repository ids pre-scanned");
    Ok(ids)
}

/// Streams the commits input: a commit is accepted when its author and
/// committer resolve as accounts and its repository id appeared in the
/// unfiltered repository input. Accepted commits are emitted with both
/// friend flags clear; the per-repository latest commit date is
/// maintained for the repository pass.
fn filter_commits(
    config: &CatalogConfig,
    cache: &PageCache,
    file: &Arc<File>,
    users_by_id: &Indexer,
    repo_ids: &HashSet<u32>,
) -> Result<HashMap<u32, u32>> {
    let text_format = records::commit_text_format();
    let disk_format = records::commit_format();
    let input = BufReader::new(File::open(config.input_path(&config.commits_file))?);
    let mut writer = BufWriter::new(file.as_ref());

    let mut last_commit: HashMap<u32, u32> = HashMap::new();
    let (mut accepted, mut dropped) = (0u64, 0u64);
    let mut buf = Vec::new();

    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if i == 0 {
            continue;
        }
        let record = match text_format.parse(line.trim_end_matches('\r')) {
            Ok(record) => record,
            Err(err) => {
                debug!(line = i + 1, %err, "commit dropped");
                dropped += 1;
                continue;
            }
        };

        let repo_id = record.int(commit_text::REPO_ID);
        let author = record.int(commit_text::AUTHOR_ID);
        let committer = record.int(commit_text::COMMITTER_ID);

        let known = users_by_id.find_key(cache, &ProbeKey::Id(author as u64)).is_some()
            && (committer == author
                || users_by_id.find_key(cache, &ProbeKey::Id(committer as u64)).is_some())
            && repo_ids.contains(&repo_id);
        if !known {
            dropped += 1;
            continue;
        }

        let at = record.timestamp(commit_text::COMMITTED_AT);
        let message = record.opt_str(commit_text::MESSAGE);
        let disk = Record(vec![
            Value::Int(repo_id),
            Value::Int(author),
            Value::Bool(false),
            Value::Int(committer),
            Value::Bool(false),
            Value::DateTime(at),
            Value::Int(message.map_or(0, str::len) as u32),
            Value::StrNull(message.map(str::to_string)),
        ]);
        buf.clear();
        disk_format.write_binary(&disk, &mut buf)?;
        writer.write_all(&buf)?;
        accepted += 1;

        let packed = at.pack();
        let latest = last_commit.entry(repo_id).or_insert(packed);
        if *latest < packed {
            *latest = packed;
        }
    }
    writer.flush()?;

    info!(accepted, dropped, "commits filtered");
    Ok(last_commit)
}

/// Streams the repositories input: a repository is accepted when its
/// owner resolves and at least one accepted commit references it. The
/// language is lower-cased and the last-commit date back-filled; the
/// three repository indexes are then sorted (and languages grouped) in
/// parallel.
#[allow(clippy::too_many_arguments)]
fn parse_repos(
    config: &CatalogConfig,
    cache: &PageCache,
    file: &Arc<File>,
    format: &Arc<Format>,
    users_by_id: &Indexer,
    last_commit: &HashMap<u32, u32>,
    repos_by_id: &mut Indexer,
    repos_by_last_commit: &mut Indexer,
    repos_by_language: &mut Indexer,
    run_entries: usize,
) -> Result<()> {
    let text_format = records::repo_text_format();
    let input = BufReader::new(File::open(config.input_path(&config.repos_file))?);
    let mut writer = BufWriter::new(file.as_ref());

    // The language is addressed by the offset of its length field,
    // which sits after three fixed-size fields.
    let language_key = format.fixed_offset_of(repo::LANGUAGE_LEN).expect("fixed prefix");

    let (mut accepted, mut dropped) = (0u64, 0u64);
    let mut pos = 0u64;
    let mut buf = Vec::new();

    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if i == 0 {
            continue;
        }
        let record = match text_format.parse(line.trim_end_matches('\r')) {
            Ok(record) => record,
            Err(err) => {
                debug!(line = i + 1, %err, "repository dropped");
                dropped += 1;
                continue;
            }
        };

        let id = record.int(repo_text::ID);
        let owner = record.int(repo_text::OWNER_ID);
        let Some(&last) = last_commit.get(&id) else {
            dropped += 1;
            continue;
        };
        if users_by_id.find_key(cache, &ProbeKey::Id(owner as u64)).is_none() {
            dropped += 1;
            continue;
        }

        let language = record.str(repo_text::LANGUAGE).to_ascii_lowercase();
        let description = record.opt_str(repo_text::DESCRIPTION);
        let branch = record.str(repo_text::DEFAULT_BRANCH);
        let full_name = record.str(repo_text::FULL_NAME);
        let license = record.str(repo_text::LICENSE);

        let disk = Record(vec![
            Value::Int(id),
            Value::Int(owner),
            Value::DateTime(Timestamp::unpack(last)),
            Value::Int(language.len() as u32),
            Value::Str(language),
            Value::Int(description.map_or(0, str::len) as u32),
            Value::StrNull(description.map(str::to_string)),
            Value::Bool(record.boolean(repo_text::HAS_WIKI)),
            Value::Int(branch.len() as u32),
            Value::Str(branch.to_string()),
            Value::DateTime(record.timestamp(repo_text::CREATED_AT)),
            Value::DateTime(record.timestamp(repo_text::UPDATED_AT)),
            Value::Int(record.int(repo_text::FORKS)),
            Value::Int(record.int(repo_text::OPEN_ISSUES)),
            Value::Int(record.int(repo_text::STARGAZERS)),
            Value::Int(record.int(repo_text::SIZE)),
            Value::Int(full_name.len() as u32),
            Value::Str(full_name.to_string()),
            Value::Int(license.len() as u32),
            Value::Str(license.to_string()),
        ]);

        buf.clear();
        format.write_binary(&disk, &mut buf)?;
        writer.write_all(&buf)?;

        repos_by_id.insert(id as u64, pos)?;
        repos_by_last_commit.insert(last as u64, pos)?;
        repos_by_language.insert(pos + language_key, pos)?;
        pos += buf.len() as u64;
        accepted += 1;
    }
    writer.flush()?;

    let (by_id, rest) = rayon::join(
        || repos_by_id.sort(cache, run_entries),
        || {
            rayon::join(
                || repos_by_last_commit.sort(cache, run_entries),
                || {
                    repos_by_language.sort(cache, run_entries)?;
                    repos_by_language.group(
                        cache,
                        Some(&config.output_path(REPOS_BY_LANGUAGE_VALS)),
                        false,
                    )
                },
            )
        },
    );
    by_id?;
    let (by_last, by_language) = rest;
    by_last?;
    by_language?;

    info!(accepted, dropped, "repositories ingested");
    Ok(())
}

/// Scans the compressed commits linearly through lazy views, feeding the
/// date, repository and collaborator indexes, then sorts and groups them
/// in parallel. Collaborator values are account record offsets, so
/// queries can open the account without another id lookup.
#[allow(clippy::too_many_arguments)]
fn parse_commits(
    cache: &PageCache,
    commits_file: &Arc<File>,
    commits: FileId,
    format: &Arc<Format>,
    users_by_id: &Indexer,
    commits_by_date: &mut Indexer,
    commits_by_repo: &mut Indexer,
    collaborators: &mut Indexer,
    run_entries: usize,
    config: &CatalogConfig,
) -> Result<()> {
    let size = commits_file.metadata()?.len();
    let mut view = LazyRecord::new(format.clone(), commits, 0);
    let mut pos = 0u64;

    while pos < size {
        view.rebind(commits, pos);
        let repo_id = view.get_int(commit::REPO_ID, cache)? as u64;
        let author = view.get_int(commit::AUTHOR_ID, cache)?;
        let committer = view.get_int(commit::COMMITTER_ID, cache)?;
        let at = view.get_timestamp(commit::COMMITTED_AT, cache)?;

        commits_by_date.insert(at.pack() as u64, pos)?;
        commits_by_repo.insert(repo_id, pos)?;

        let Some(ord) = users_by_id.find_key(cache, &ProbeKey::Id(author as u64)) else {
            return errdata!("commit author {author} missing from the accounts index");
        };
        collaborators.insert(repo_id, users_by_id.value_at(cache, ord))?;
        if committer != author {
            let Some(ord) = users_by_id.find_key(cache, &ProbeKey::Id(committer as u64)) else {
                return errdata!("commit committer {committer} missing from the accounts index");
            };
            collaborators.insert(repo_id, users_by_id.value_at(cache, ord))?;
        }

        pos = view.position_after(cache)?;
    }

    let (by_repo, rest) = rayon::join(
        || {
            commits_by_repo.sort(cache, run_entries)?;
            commits_by_repo.group(cache, Some(&config.output_path(COMMITS_BY_REPO_VALS)), false)
        },
        || {
            rayon::join(
                || {
                    collaborators.sort(cache, run_entries)?;
                    collaborators.group(cache, Some(&config.output_path(COLLABORATORS_VALS)), true)
                },
                || commits_by_date.sort(cache, run_entries),
            )
        },
    );
    by_repo?;
    let (collab, by_date) = rest;
    collab?;
    by_date?;

    info!(commits = commits_by_date.element_count(), "commits indexed");
    Ok(())
}

/// Walks every repository group once: accumulates the Q2 collaborator
/// sum, detects bot contributors for Q3, and writes the two friend
/// flags into each commit record. The commits file is flushed so the
/// flags are durable before the header is written.
fn solve_static_queries(
    catalog: &Catalog,
    user_count: u32,
    organization_count: u32,
    bot_count: u32,
) -> Result<Header> {
    let cache = &catalog.cache;
    let repo_groups = catalog.commits_by_repo.element_count();

    let mut commit_view = catalog.commit_view();
    let mut repo_view = catalog.repo_view();
    let mut account_view = catalog.account_view();
    let mut owner_view = catalog.account_view();

    let mut q2_sum = 0u64;
    let mut q3 = 0u64;

    for i in 0..repo_groups {
        let collaborator_group = catalog.collaborators.value_at(cache, i);
        q2_sum += catalog.collaborators.group_size(cache, collaborator_group) as u64;

        let repo_id = catalog.commits_by_repo.key_at(cache, i);
        if !catalog.repos_by_id.find_value_as_view(cache, &ProbeKey::Id(repo_id), &mut repo_view) {
            // Phantom repository: commits reference it but it was not
            // accepted, so there is nothing to flag.
            continue;
        }
        let owner = repo_view.get_int(repo::OWNER_ID, cache)?;
        let owner_friends: Vec<u32> = if catalog
            .users_by_id
            .find_value_as_view(cache, &ProbeKey::Id(owner as u64), &mut owner_view)
        {
            owner_view.get_int_list(account::FRIENDS, cache)?.to_vec()
        } else {
            Vec::new()
        };

        let group = catalog.commits_by_repo.value_at(cache, i);
        let size = catalog.commits_by_repo.group_size(cache, group);
        let mut bot_seen = false;

        for j in 0..size {
            catalog.commits_by_repo.group_elem_as_view(cache, group, j, &mut commit_view);
            let author = commit_view.get_int(commit::AUTHOR_ID, cache)?;
            let committer = commit_view.get_int(commit::COMMITTER_ID, cache)?;

            if !bot_seen && account_kind(catalog, author, &mut account_view)? == Some(AccountKind::Bot) {
                q3 += 1;
                bot_seen = true;
            }
            if author != owner && owner_friends.binary_search(&author).is_ok() {
                commit_view.set(commit::AUTHOR_FRIEND, Value::Bool(true));
            }

            if committer != author {
                if !bot_seen
                    && account_kind(catalog, committer, &mut account_view)? == Some(AccountKind::Bot)
                {
                    q3 += 1;
                    bot_seen = true;
                }
                if committer != owner && owner_friends.binary_search(&committer).is_ok() {
                    commit_view.set(commit::COMMITTER_FRIEND, Value::Bool(true));
                }
            }

            commit_view.flush_to_file(cache)?;
        }
    }

    cache.flush_file(catalog.commits);

    let q2 = if repo_groups == 0 { 0.0 } else { q2_sum as f64 / repo_groups as f64 };
    let accounts = catalog.account_count();
    let q4 = if accounts == 0 { 0.0 } else { catalog.commit_count() as f64 / accounts as f64 };

    debug!(q2, q3, q4, "static queries solved");
    Ok(Header { user_count, organization_count, bot_count, q2, q3: q3 as f64, q4 })
}

fn account_kind(
    catalog: &Catalog,
    id: u32,
    view: &mut LazyRecord,
) -> Result<Option<AccountKind>> {
    if !catalog.users_by_id.find_value_as_view(&catalog.cache, &ProbeKey::Id(id as u64), view) {
        return Ok(None);
    }
    Ok(Some(view.get_kind(account::KIND, &catalog.cache)?))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_build_produces_all_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = standard_inputs(dir.path());
        let catalog = build(config.clone()).unwrap();

        for name in [
            USERS_DAT,
            COMMITS_DAT,
            REPOS_DAT,
            USERS_BY_ID,
            REPOS_BY_ID,
            COMMITS_BY_REPO,
            COMMITS_BY_REPO_VALS,
            REPOS_BY_LAST_COMMIT,
            REPOS_BY_LANGUAGE,
            REPOS_BY_LANGUAGE_VALS,
            COMMITS_BY_DATE,
            COLLABORATORS,
            COLLABORATORS_VALS,
            HEADER,
        ] {
            assert!(config.output_path(name).exists(), "{name} missing");
        }

        assert_eq!(catalog.account_count(), 8);
        // Two invalid commits dropped, eight accepted.
        assert_eq!(catalog.commit_count(), 8);
        // Repos 1, 2, 3 and phantom repo 9.
        assert_eq!(catalog.repo_group_count(), 4);
        assert_eq!(catalog.header.user_count, 5);
        assert_eq!(catalog.header.organization_count, 1);
        assert_eq!(catalog.header.bot_count, 2);
    }

    #[test]
    fn test_friend_flags_are_backfilled() {
        let dir = tempfile::TempDir::new().unwrap();
        let catalog = build(standard_inputs(dir.path())).unwrap();
        let cache = &catalog.cache;

        // Walk every commit of repo 1: only account 20 (mutual follower
        // of owner 10) gets flags.
        let ord = catalog.commits_by_repo.find_key(cache, &ProbeKey::Id(1)).unwrap();
        let group = catalog.commits_by_repo.value_at(cache, ord);
        let size = catalog.commits_by_repo.group_size(cache, group);
        assert_eq!(size, 4);

        let mut view = catalog.commit_view();
        let mut flagged_authors = Vec::new();
        for j in 0..size {
            catalog.commits_by_repo.group_elem_as_view(cache, group, j, &mut view);
            if view.get_bool(commit::AUTHOR_FRIEND, cache).unwrap() {
                flagged_authors.push(view.get_int(commit::AUTHOR_ID, cache).unwrap());
            }
        }
        assert_eq!(flagged_authors, vec![20, 20]);
    }

    #[test]
    fn test_friend_lists_are_symmetric() {
        let dir = tempfile::TempDir::new().unwrap();
        let catalog = build(standard_inputs(dir.path())).unwrap();
        let cache = &catalog.cache;

        let mut view = catalog.account_view();
        let mut other = catalog.account_view();
        for i in 0..catalog.users_by_id.element_count() {
            catalog.users_by_id.value_as_view(cache, i, &mut view);
            let id = view.get_int(account::ID, cache).unwrap();
            let friends = view.get_int_list(account::FRIENDS, cache).unwrap().to_vec();
            assert!(friends.windows(2).all(|w| w[0] < w[1]), "friends list not strictly sorted");
            for friend in friends {
                assert!(
                    catalog
                        .users_by_id
                        .find_value_as_view(cache, &ProbeKey::Id(friend as u64), &mut other),
                    "friend {friend} not an account"
                );
                let back = other.get_int_list(account::FRIENDS, cache).unwrap();
                assert!(back.binary_search(&id).is_ok(), "{friend} missing {id}");
            }
        }
    }

    #[test]
    fn test_repo_without_commits_is_dropped() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = write_inputs(
            dir.path(),
            &["10;solo;User;2012-01-01 08:00:00;0;[];0;[];0;0"],
            &[
                "1;10;solo/active;mit;True;;C;main;2015-01-01 10:00:00;2020-01-01 10:00:00;0;0;0;1",
                "2;10;solo/idle;mit;True;;C;main;2015-01-01 10:00:00;2020-01-01 10:00:00;0;0;0;1",
            ],
            &["1;10;10;2020-03-01 12:00:00;work"],
        );
        let catalog = build(config).unwrap();
        assert!(catalog
            .repos_by_id
            .find_key(&catalog.cache, &ProbeKey::Id(1))
            .is_some());
        assert!(catalog
            .repos_by_id
            .find_key(&catalog.cache, &ProbeKey::Id(2))
            .is_none());
    }

    #[test]
    fn test_collaborators_are_deduplicated() {
        let dir = tempfile::TempDir::new().unwrap();
        let catalog = build(standard_inputs(dir.path())).unwrap();
        let cache = &catalog.cache;

        // Repo 1 saw accounts 20, 10, 30, 50; account 20 appears in two
        // commits but counts once.
        let ord = catalog.collaborators.find_key(cache, &ProbeKey::Id(1)).unwrap();
        let group = catalog.collaborators.value_at(cache, ord);
        assert_eq!(catalog.collaborators.group_size(cache, group), 4);

        // Q2: groups of sizes 4, 2, 1 and 1 over four repo groups.
        assert!((catalog.header.q2 - 2.0).abs() < 1e-9);
        // Q3: repo 1 has a bot commit; repos 2, 3, 9 do not.
        assert_eq!(catalog.header.q3, 1.0);
        // Q4: eight commits over eight accounts.
        assert!((catalog.header.q4 - 1.0).abs() < 1e-9);
    }
}
