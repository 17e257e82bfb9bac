//! The catalogue: compressed record files, the index set built over
//! them, and the precomputed header scalars, opened from disk when the
//! persisted files are intact and rebuilt from the text inputs
//! otherwise.

pub mod build;
pub mod queries;
pub mod records;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{FileId, PageCache};
use crate::config::CatalogConfig;
use crate::encoding::format::Format;
use crate::encoding::LazyRecord;
use crate::error::Result;
use crate::index::{Indexer, KeyOrder, ProbeKey};
use crate::{errdata, errinput};

use records::account;

pub(crate) const USERS_DAT: &str = "users.dat";
pub(crate) const COMMITS_DAT: &str = "commits.dat";
pub(crate) const REPOS_DAT: &str = "repos.dat";
pub(crate) const USERS_BY_ID: &str = "usersById.indx";
pub(crate) const REPOS_BY_ID: &str = "reposById.indx";
pub(crate) const COMMITS_BY_REPO: &str = "commitsByRepo.indx";
pub(crate) const COMMITS_BY_REPO_VALS: &str = "commitsByRepo.dat";
pub(crate) const REPOS_BY_LAST_COMMIT: &str = "reposByLastCommitDate.indx";
pub(crate) const REPOS_BY_LANGUAGE: &str = "reposByLanguage.indx";
pub(crate) const REPOS_BY_LANGUAGE_VALS: &str = "reposByLanguage.dat";
pub(crate) const COMMITS_BY_DATE: &str = "commitsByDate.indx";
pub(crate) const COLLABORATORS: &str = "collaborators.indx";
pub(crate) const COLLABORATORS_VALS: &str = "collaborators.dat";
pub(crate) const HEADER: &str = "staticQueries.dat";

/// The size of the persisted header: three u32 kind counts and three f64
/// query scalars, all big-endian.
pub(crate) const HEADER_SIZE: usize = 36;

/// The scalars persisted in the header file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
    pub user_count: u32,
    pub organization_count: u32,
    pub bot_count: u32,
    pub q2: f64,
    pub q3: f64,
    pub q4: f64,
}

/// An opened catalogue: the block cache, the three compressed record
/// files, their formats, the seven indexes, and the header scalars.
pub struct Catalog {
    pub(crate) config: CatalogConfig,
    pub(crate) cache: PageCache,
    pub(crate) users: FileId,
    pub(crate) commits: FileId,
    pub(crate) repos: FileId,
    pub(crate) account_format: Arc<Format>,
    pub(crate) commit_format: Arc<Format>,
    pub(crate) repo_format: Arc<Format>,
    pub(crate) users_by_id: Indexer,
    pub(crate) repos_by_id: Indexer,
    pub(crate) commits_by_repo: Indexer,
    pub(crate) repos_by_last_commit: Indexer,
    pub(crate) repos_by_language: Indexer,
    pub(crate) commits_by_date: Indexer,
    pub(crate) collaborators: Indexer,
    pub(crate) header: Header,
}

impl Catalog {
    /// Opens the persisted catalogue if every file is present and the
    /// header reads back cleanly; otherwise rebuilds it from the text
    /// inputs.
    pub fn open(config: CatalogConfig) -> Result<Catalog> {
        match Self::load(&config) {
            Ok(catalog) => {
                info!("catalogue loaded from {}", config.output_dir.display());
                Ok(catalog)
            }
            Err(err) => {
                debug!(%err, "persisted catalogue unusable, rebuilding");
                build::build(config)
            }
        }
    }

    /// Loads the persisted catalogue, failing if any piece is missing or
    /// the header is truncated.
    fn load(config: &CatalogConfig) -> Result<Catalog> {
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
            if !config.output_path(name).exists() {
                return errinput!("missing catalogue file {name}");
            }
        }

        let cache = PageCache::new(config.cache_frames);
        let users_file = Arc::new(File::open(config.output_path(USERS_DAT))?);
        let commits_file = Arc::new(File::open(config.output_path(COMMITS_DAT))?);
        let repos_file = Arc::new(File::open(config.output_path(REPOS_DAT))?);
        let users = cache.register(users_file);
        let commits = cache.register(commits_file);
        let repos = cache.register(repos_file);

        let header = read_header(&config.output_path(HEADER))?;

        let catalog = Catalog {
            users_by_id: Indexer::open(&config.output_path(USERS_BY_ID), KeyOrder::Id, Some(users), &cache)?,
            repos_by_id: Indexer::open(&config.output_path(REPOS_BY_ID), KeyOrder::Id, Some(repos), &cache)?,
            commits_by_repo: Indexer::open_grouped(
                &config.output_path(COMMITS_BY_REPO),
                &config.output_path(COMMITS_BY_REPO_VALS),
                KeyOrder::Id,
                Some(commits),
                &cache,
            )?,
            repos_by_last_commit: Indexer::open(
                &config.output_path(REPOS_BY_LAST_COMMIT),
                KeyOrder::Id,
                Some(repos),
                &cache,
            )?,
            repos_by_language: Indexer::open_grouped(
                &config.output_path(REPOS_BY_LANGUAGE),
                &config.output_path(REPOS_BY_LANGUAGE_VALS),
                KeyOrder::Text { keys: repos },
                Some(repos),
                &cache,
            )?,
            commits_by_date: Indexer::open(&config.output_path(COMMITS_BY_DATE), KeyOrder::Id, Some(commits), &cache)?,
            collaborators: Indexer::open_grouped(
                &config.output_path(COLLABORATORS),
                &config.output_path(COLLABORATORS_VALS),
                KeyOrder::Id,
                Some(users),
                &cache,
            )?,
            config: config.clone(),
            cache,
            users,
            commits,
            repos,
            account_format: records::account_format(),
            commit_format: records::commit_format(),
            repo_format: records::repo_format(),
            header,
        };
        Ok(catalog)
    }

    /// A fresh lazy view over the accounts file.
    pub(crate) fn account_view(&self) -> LazyRecord {
        LazyRecord::new(self.account_format.clone(), self.users, 0)
    }

    /// A fresh lazy view over the commits file.
    pub(crate) fn commit_view(&self) -> LazyRecord {
        LazyRecord::new(self.commit_format.clone(), self.commits, 0)
    }

    /// A fresh lazy view over the repositories file.
    pub(crate) fn repo_view(&self) -> LazyRecord {
        LazyRecord::new(self.repo_format.clone(), self.repos, 0)
    }

    /// The login of the account with the given id.
    pub(crate) fn login_of(&self, id: u32, view: &mut LazyRecord) -> Result<String> {
        if !self.users_by_id.find_value_as_view(&self.cache, &ProbeKey::Id(id as u64), view) {
            return errdata!("account {id} not in the catalogue");
        }
        Ok(view.get_str(account::LOGIN, &self.cache)?.to_string())
    }

    /// Total number of accounts.
    pub fn account_count(&self) -> u64 {
        self.users_by_id.element_count()
    }

    /// Total number of commits.
    pub fn commit_count(&self) -> u64 {
        self.commits_by_date.element_count()
    }

    /// Number of repositories that received commits, including ids the
    /// repository input did not describe.
    pub fn repo_group_count(&self) -> u64 {
        self.commits_by_repo.element_count()
    }

    pub fn header(&self) -> Header {
        self.header
    }
}

fn read_header(path: &Path) -> Result<Header> {
    let bytes = std::fs::read(path)?;
    if bytes.len() != HEADER_SIZE {
        return errdata!("header file is {} bytes, expected {HEADER_SIZE}", bytes.len());
    }
    let record = records::header_format().read_binary(&mut bytes.as_slice())?;
    Ok(Header {
        user_count: record.int(0),
        organization_count: record.int(1),
        bot_count: record.int(2),
        q2: record.double(3),
        q3: record.double(4),
        q4: record.double(5),
    })
}

pub(crate) fn write_header(path: &Path, header: &Header) -> Result<()> {
    use crate::encoding::format::{Record, Value};
    let record = Record(vec![
        Value::Int(header.user_count),
        Value::Int(header.organization_count),
        Value::Int(header.bot_count),
        Value::Double(header.q2),
        Value::Double(header.q3),
        Value::Double(header.q4),
    ]);
    let mut out = Vec::with_capacity(HEADER_SIZE);
    records::header_format().write_binary(&record, &mut out)?;
    debug_assert_eq!(out.len(), HEADER_SIZE);
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(HEADER);
        let header = Header {
            user_count: 5,
            organization_count: 1,
            bot_count: 2,
            q2: 4.0,
            q3: 3.0,
            q4: 1.25,
        };
        write_header(&path, &header).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), HEADER_SIZE as u64);
        assert_eq!(read_header(&path).unwrap(), header);
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(HEADER);
        std::fs::write(&path, [0u8; 20]).unwrap();
        assert!(read_header(&path).is_err());
    }
}
