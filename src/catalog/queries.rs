//! The query catalogue: parsing of query lines and the ten aggregation
//! queries, each an ordered scan or grouped iteration over the index
//! set. Queries run sequentially against a fully built catalogue.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::catalog::records::{commit, repo};
use crate::catalog::Catalog;
use crate::date::Timestamp;
use crate::errinput;
use crate::error::Result;
use crate::index::ProbeKey;

/// A parsed query line. Lines are `<id> [args…]` with single-space
/// separators; ids 1 through 10.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// 1: account counts by kind.
    KindCounts,
    /// 2: average collaborators per repository.
    AvgCollaborators,
    /// 3: repositories with at least one bot commit.
    BotRepos,
    /// 4: average commits per account.
    AvgCommitsPerAccount,
    /// 5: most active accounts in a date interval.
    TopActive { n: u32, start: Timestamp, end: Timestamp },
    /// 6: most active accounts in repositories of a language.
    TopByLanguage { n: u32, language: String },
    /// 7: repositories with no commits since a date.
    InactiveSince { date: Timestamp },
    /// 8: most used languages since a date.
    TopLanguages { n: u32, since: Timestamp },
    /// 9: accounts with most commits into friends' repositories.
    FriendCommits { n: u32 },
    /// 10: per repository, accounts with the longest commit message.
    LongestMessages { n: u32 },
}

impl Query {
    pub fn parse(line: &str) -> Result<Query> {
        let mut parts = line.split(' ');
        let id = parts.next().unwrap_or("");
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return errinput!("malformed query id {id:?}");
        }
        let id: u32 = match id.parse() {
            Ok(id) => id,
            Err(_) => return errinput!("query id {id:?} out of range"),
        };
        let args: Vec<&str> = parts.collect();

        match (id, args.as_slice()) {
            (1, []) => Ok(Query::KindCounts),
            (2, []) => Ok(Query::AvgCollaborators),
            (3, []) => Ok(Query::BotRepos),
            (4, []) => Ok(Query::AvgCommitsPerAccount),
            (5, [n, start, end]) => Ok(Query::TopActive {
                n: parse_count(n)?,
                start: Timestamp::parse_date(start)?,
                end: Timestamp::parse_date(end)?,
            }),
            (6, [n, language]) if !language.is_empty() => Ok(Query::TopByLanguage {
                n: parse_count(n)?,
                language: (*language).to_string(),
            }),
            (7, [date]) => Ok(Query::InactiveSince { date: Timestamp::parse_date(date)? }),
            (8, [n, since]) => Ok(Query::TopLanguages {
                n: parse_count(n)?,
                since: Timestamp::parse_date(since)?,
            }),
            (9, [n]) => Ok(Query::FriendCommits { n: parse_count(n)? }),
            (10, [n]) => Ok(Query::LongestMessages { n: parse_count(n)? }),
            _ => errinput!("malformed query {line:?}"),
        }
    }
}

fn parse_count(token: &str) -> Result<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return errinput!("invalid count {token:?}");
    }
    match token.parse() {
        Ok(n) => Ok(n),
        Err(_) => errinput!("count {token:?} out of range"),
    }
}

/// Executes a query, writing its rows to `out`.
pub fn execute(catalog: &Catalog, query: &Query, out: &mut impl Write) -> Result<()> {
    match query {
        Query::KindCounts => {
            let header = catalog.header;
            write!(
                out,
                "Bot: {}\nOrganization: {}\nUser: {}\n",
                header.bot_count, header.organization_count, header.user_count
            )?;
        }
        Query::AvgCollaborators => writeln!(out, "{:.2}", catalog.header.q2)?,
        Query::BotRepos => writeln!(out, "{}", catalog.header.q3 as u64)?,
        Query::AvgCommitsPerAccount => writeln!(out, "{:.2}", catalog.header.q4)?,
        Query::TopActive { n, start, end } => top_active(catalog, *n, *start, *end, out)?,
        Query::TopByLanguage { n, language } => top_by_language(catalog, *n, language, out)?,
        Query::InactiveSince { date } => inactive_since(catalog, *date, out)?,
        Query::TopLanguages { n, since } => top_languages(catalog, *n, *since, out)?,
        Query::FriendCommits { n } => friend_commits(catalog, *n, out)?,
        Query::LongestMessages { n } => longest_messages(catalog, *n, out)?,
    }
    Ok(())
}

/// Reads queries from a file, one per line, writing each valid query's
/// output to `commandN_output.txt` (1-indexed) in the output directory.
/// Invalid lines produce no output file. The parsed queries are handed
/// to a worker pool; every worker reads the shared catalogue through
/// the cache and owns its lazy views.
pub fn run_query_file(catalog: &Catalog, query_file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(query_file)?;
    let mut tasks = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match Query::parse(line) {
            Ok(query) => tasks.push((i + 1, query)),
            Err(err) => debug!(line = i + 1, %err, "invalid query"),
        }
    }

    tasks
        .par_iter()
        .map(|(number, query)| {
            let path = catalog.config.output_path(&format!("command{number}_output.txt"));
            let mut out = BufWriter::new(File::create(&path)?);
            execute(catalog, query, &mut out)?;
            out.flush()?;
            info!(line = number, "query executed");
            Ok(())
        })
        .collect::<Result<()>>()
}

/// Q5: iterate commits-by-date from the start bound while the key stays
/// within the interval; the end bound is the last second of its day.
fn top_active(catalog: &Catalog, n: u32, start: Timestamp, end: Timestamp, out: &mut impl Write) -> Result<()> {
    let cache = &catalog.cache;
    let end = end.with_time(23, 59, 59).pack() as u64;
    let total = catalog.commits_by_date.element_count();

    let mut counts: HashMap<u32, u64> = HashMap::new();
    let mut view = catalog.commit_view();
    let mut i = catalog.commits_by_date.lower_bound(cache, &ProbeKey::Id(start.pack() as u64));
    while i < total && catalog.commits_by_date.key_at(cache, i) <= end {
        catalog.commits_by_date.value_as_view(cache, i, &mut view);
        let author = view.get_int(commit::AUTHOR_ID, cache)?;
        let committer = view.get_int(commit::COMMITTER_ID, cache)?;
        *counts.entry(author).or_default() += 1;
        if committer != author {
            *counts.entry(committer).or_default() += 1;
        }
        i += 1;
    }
    print_account_counts(catalog, counts, n, true, out)
}

/// Q6: all commits of all repositories of the given language,
/// case-insensitively.
fn top_by_language(catalog: &Catalog, n: u32, language: &str, out: &mut impl Write) -> Result<()> {
    let cache = &catalog.cache;
    let probe = ProbeKey::Text(language.to_ascii_lowercase());

    let mut counts: HashMap<u32, u64> = HashMap::new();
    if let Some(ord) = catalog.repos_by_language.find_key(cache, &probe) {
        let group = catalog.repos_by_language.value_at(cache, ord);
        let mut repo_view = catalog.repo_view();
        let mut commit_view = catalog.commit_view();
        for i in 0..catalog.repos_by_language.group_size(cache, group) {
            catalog.repos_by_language.group_elem_as_view(cache, group, i, &mut repo_view);
            let repo_id = repo_view.get_int(repo::ID, cache)? as u64;
            let Some(commits_ord) = catalog.commits_by_repo.find_key(cache, &ProbeKey::Id(repo_id)) else {
                continue;
            };
            let commits = catalog.commits_by_repo.value_at(cache, commits_ord);
            for j in 0..catalog.commits_by_repo.group_size(cache, commits) {
                catalog.commits_by_repo.group_elem_as_view(cache, commits, j, &mut commit_view);
                let author = commit_view.get_int(commit::AUTHOR_ID, cache)?;
                let committer = commit_view.get_int(commit::COMMITTER_ID, cache)?;
                *counts.entry(author).or_default() += 1;
                if committer != author {
                    *counts.entry(committer).or_default() += 1;
                }
            }
        }
    }
    print_account_counts(catalog, counts, n, true, out)
}

/// Q7: every repository whose last commit precedes the date, in
/// last-commit order.
fn inactive_since(catalog: &Catalog, date: Timestamp, out: &mut impl Write) -> Result<()> {
    let cache = &catalog.cache;
    let last = catalog.repos_by_last_commit.lower_bound(cache, &ProbeKey::Id(date.pack() as u64));
    let mut view = catalog.repo_view();
    for i in 0..last {
        catalog.repos_by_last_commit.value_as_view(cache, i, &mut view);
        let id = view.get_int(repo::ID, cache)?;
        let description = view.get_opt_str(repo::DESCRIPTION, cache)?.unwrap_or("");
        writeln!(out, "{id};{description}")?;
    }
    Ok(())
}

/// Q8: languages of repositories committed to since the date, ranked by
/// commit count. The literal language `none` never takes a slot.
fn top_languages(catalog: &Catalog, n: u32, since: Timestamp, out: &mut impl Write) -> Result<()> {
    let cache = &catalog.cache;
    let total = catalog.commits_by_date.element_count();

    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut commit_view = catalog.commit_view();
    let mut repo_view = catalog.repo_view();
    for i in catalog.commits_by_date.lower_bound(cache, &ProbeKey::Id(since.pack() as u64))..total {
        catalog.commits_by_date.value_as_view(cache, i, &mut commit_view);
        let repo_id = commit_view.get_int(commit::REPO_ID, cache)? as u64;
        if !catalog.repos_by_id.find_value_as_view(cache, &ProbeKey::Id(repo_id), &mut repo_view) {
            continue;
        }
        let language = repo_view.get_str(repo::LANGUAGE, cache)?.to_ascii_lowercase();
        *counts.entry(language).or_default() += 1;
    }

    for (language, _) in counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
        .filter(|(language, _)| language != "none")
        .take(n as usize)
    {
        writeln!(out, "{language}")?;
    }
    Ok(())
}

/// Q9: a full commit scan counting the persisted friend flags.
fn friend_commits(catalog: &Catalog, n: u32, out: &mut impl Write) -> Result<()> {
    let cache = &catalog.cache;
    let mut counts: HashMap<u32, u64> = HashMap::new();
    let mut view = catalog.commit_view();
    for i in 0..catalog.commits_by_date.element_count() {
        catalog.commits_by_date.value_as_view(cache, i, &mut view);
        let author = view.get_int(commit::AUTHOR_ID, cache)?;
        let committer = view.get_int(commit::COMMITTER_ID, cache)?;
        if view.get_bool(commit::AUTHOR_FRIEND, cache)? {
            *counts.entry(author).or_default() += 1;
        }
        if committer != author && view.get_bool(commit::COMMITTER_FRIEND, cache)? {
            *counts.entry(committer).or_default() += 1;
        }
    }
    print_account_counts(catalog, counts, n, false, out)
}

/// Q10: per repository group, the accounts with the longest commit
/// message observed.
fn longest_messages(catalog: &Catalog, n: u32, out: &mut impl Write) -> Result<()> {
    let cache = &catalog.cache;
    let mut commit_view = catalog.commit_view();
    let mut account_view = catalog.account_view();

    for i in 0..catalog.commits_by_repo.element_count() {
        let repo_id = catalog.commits_by_repo.key_at(cache, i);
        let group = catalog.commits_by_repo.value_at(cache, i);

        let mut longest: HashMap<u32, u32> = HashMap::new();
        for j in 0..catalog.commits_by_repo.group_size(cache, group) {
            catalog.commits_by_repo.group_elem_as_view(cache, group, j, &mut commit_view);
            let length = commit_view.get_int(commit::MESSAGE_LEN, cache)?;
            let author = commit_view.get_int(commit::AUTHOR_ID, cache)?;
            let committer = commit_view.get_int(commit::COMMITTER_ID, cache)?;
            let entry = longest.entry(author).or_default();
            *entry = (*entry).max(length);
            if committer != author {
                let entry = longest.entry(committer).or_default();
                *entry = (*entry).max(length);
            }
        }

        for (id, length) in longest
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
            .take(n as usize)
        {
            let login = catalog.login_of(id, &mut account_view)?;
            writeln!(out, "{id};{login};{length};{repo_id}")?;
        }
    }
    Ok(())
}

/// Rows `id;login[;count]`, ranked by count descending with ties broken
/// by ascending id.
fn print_account_counts(
    catalog: &Catalog,
    counts: HashMap<u32, u64>,
    n: u32,
    with_count: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut view = catalog.account_view();
    for (id, count) in counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
        .take(n as usize)
    {
        let login = catalog.login_of(id, &mut view)?;
        if with_count {
            writeln!(out, "{id};{login};{count}")?;
        } else {
            writeln!(out, "{id};{login}")?;
        }
    }
    Ok(())
}
