use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex_lite::Regex;
use serde::{Deserialize, Deserializer};

use crate::model::ParseError;

const FILE_SCHEME: &str = "file://";

static SCP_LIKE: OnceLock<Regex> = OnceLock::new();

fn scp_like() -> &'static Regex {
    SCP_LIKE.get_or_init(|| Regex::new(r"^([^@/:]+@)?[^@/:]{2,}:").unwrap())
}

/// Location of a git repository, either a local path or anything git can fetch from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct GitUrl {
    url: String,
}

impl GitUrl {
    pub fn parse(url: impl Into<String>) -> Result<GitUrl, ParseError> {
        let url = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyUrl(url));
        }
        Ok(GitUrl {
            url: trimmed.to_owned(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the url designates a directory on this machine.
    ///
    /// `file://` urls and scheme-less paths are local, scp-like
    /// addresses (`git@host:path`) are not.
    pub fn is_local(&self) -> bool {
        if self.url.starts_with(FILE_SCHEME) {
            return true;
        }
        !self.url.contains("://") && !scp_like().is_match(&self.url)
    }

    /// The url without its `file://` scheme, with a leading `~/` expanded.
    pub fn schemeless(&self) -> PathBuf {
        let path = self.url.strip_prefix(FILE_SCHEME).unwrap_or(&self.url);
        match (path.strip_prefix("~/"), home::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(path),
        }
    }

    /// The address handed to git: local urls resolved to a path, others unchanged.
    ///
    /// libgit2 knows nothing about `~`, so a `~/` path has to be expanded first.
    pub fn fetch_url(&self) -> String {
        if self.is_local() {
            self.schemeless().to_string_lossy().into_owned()
        } else {
            self.url.clone()
        }
    }
}

impl TryFrom<String> for GitUrl {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GitUrl::parse(value)
    }
}

impl Display for GitUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Content of a `.gitsplit.toml` file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub project_url: GitUrl,
    #[serde(default)]
    pub cache_url: Option<GitUrl>,
    #[serde(default)]
    pub splits: Vec<Split>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Split {
    #[serde(rename = "prefix", default, deserialize_with = "one_or_many")]
    pub prefixes: Vec<String>,
    #[serde(rename = "target", default, deserialize_with = "one_or_many")]
    pub targets: Vec<String>,
}

impl Config {
    pub fn new(project_url: GitUrl) -> Config {
        Config {
            project_url,
            cache_url: None,
            splits: Vec::new(),
        }
    }

    pub fn with_cache(mut self, cache_url: GitUrl) -> Config {
        self.cache_url = Some(cache_url);
        self
    }

    pub fn with_split(mut self, split: Split) -> Config {
        self.splits.push(split);
        self
    }

    pub fn from_file(path: &Path) -> Result<Config, ParseError> {
        Config::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn from_toml_str(data: &str) -> Result<Config, ParseError> {
        let config = toml::from_str::<Config>(data)?;
        if let Some(index) = config.splits.iter().position(|s| s.targets.is_empty()) {
            return Err(ParseError::MissingTarget(index));
        }
        Ok(config)
    }

    /// Every target of every split, in declaration order, duplicates included.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.splits
            .iter()
            .flat_map(|split| split.targets.iter().map(String::as_str))
    }
}

impl Split {
    pub fn new(prefixes: Vec<String>, targets: Vec<String>) -> Split {
        Split { prefixes, targets }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
