//! Deciding how a statement runs and what happens to its effects.
//!
//! By default every query runs in its own transaction. Once it executes
//! successfully the request's [`CommitIntent`] is consulted, and for
//! [`CommitIntent::Auto`] the configured [`CommitRule`] inspects the query text.
//!
//! Some statements run directly on the session instead, with no transaction
//! around them: transaction control typed by the user, statements the drivers
//! refuse inside a transaction such as `VACUUM`, and statements the legacy
//! [`CommitRule::Substring`] rule would never have wrapped.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Leading keywords treated as data or schema changes by [`CommitRule::Keyword`].
const MUTATING_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "MERGE", "UPSERT", "CREATE", "DROP", "ALTER",
    "TRUNCATE", "RENAME",
];

/// Keywords searched for anywhere in the text by [`CommitRule::Substring`].
const SUBSTRING_MARKERS: &[&str] = &["INSERT", "UPDATE", "DELETE"];

/// Leading keywords that open a transaction under [`CommitRule::Substring`] even
/// when no marker matched, so their effects are held back.
const DML_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Leading keywords never wrapped in a transaction, whatever the intent.
const DIRECT_KEYWORDS: &[&str] = &[
    "BEGIN", "START", "COMMIT", "END", "ROLLBACK", "VACUUM", "ATTACH", "DETACH",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitRule {
    /// Commit when the first keyword, case-insensitive and after comments, mutates.
    #[default]
    Keyword,
    /// Commit when `INSERT`, `UPDATE` or `DELETE` occurs anywhere in the text,
    /// case-sensitive. Matches identifiers, literals and comments as well, so
    /// `SELECT * FROM UPDATE_LOG` commits while a lowercase `insert` does not.
    ///
    /// Statements without a marker are not rolled back: they run directly and
    /// persist, except DML, which is held in a transaction and discarded.
    Substring,
}

impl CommitRule {
    pub fn should_commit(self, sql: &str) -> bool {
        match self {
            CommitRule::Keyword => leading_keyword_in(sql, MUTATING_KEYWORDS),
            CommitRule::Substring => SUBSTRING_MARKERS.iter().any(|m| sql.contains(m)),
        }
    }

    pub fn plan(self, sql: &str) -> Plan {
        let commit = self.should_commit(sql);
        match self {
            CommitRule::Substring if !commit && !leading_keyword_in(sql, DML_KEYWORDS) => {
                Plan::Direct
            }
            _ => Plan::Transaction { commit },
        }
    }
}

impl fmt::Display for CommitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommitRule::Keyword => "keyword",
            CommitRule::Substring => "substring",
        })
    }
}

impl FromStr for CommitRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" => Ok(CommitRule::Keyword),
            "substring" => Ok(CommitRule::Substring),
            other => Err(format!(
                "unknown commit rule {other:?} (expected `keyword` or `substring`)"
            )),
        }
    }
}

/// Per-request override of the configured rule.
///
/// Has no effect on statements that always run directly, nor inside a
/// transaction the user opened with `BEGIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitIntent {
    #[default]
    Auto,
    Commit,
    Rollback,
}

impl CommitIntent {
    pub fn plan(self, rule: CommitRule, sql: &str) -> Plan {
        if leading_keyword_in(sql, DIRECT_KEYWORDS) {
            return Plan::Direct;
        }
        match self {
            CommitIntent::Auto => rule.plan(sql),
            CommitIntent::Commit => Plan::Transaction { commit: true },
            CommitIntent::Rollback => Plan::Transaction { commit: false },
        }
    }
}

impl FromStr for CommitIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(CommitIntent::Auto),
            "commit" => Ok(CommitIntent::Commit),
            "rollback" => Ok(CommitIntent::Rollback),
            other => Err(format!("unknown commit intent {other:?}")),
        }
    }
}

/// How a statement is run on its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// In a transaction of its own, committed or rolled back after it succeeds.
    Transaction { commit: bool },
    /// As is, with whatever transaction state the session already has.
    Direct,
}

impl Plan {
    pub fn completion(self) -> Completion {
        match self {
            Plan::Transaction { commit: true } => Completion::Committed,
            Plan::Transaction { commit: false } => Completion::RolledBack,
            Plan::Direct => Completion::Autocommitted,
        }
    }
}

/// What became of a successful statement's effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Committed,
    #[default]
    RolledBack,
    Autocommitted,
    /// Part of a transaction the user opened and has not finished yet.
    Pending,
}

impl Completion {
    /// Whether other sessions can see the statement's effects.
    pub fn is_persisted(self) -> bool {
        matches!(self, Completion::Committed | Completion::Autocommitted)
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Completion::Committed => "committed",
            Completion::RolledBack => "rolled back",
            Completion::Autocommitted => "autocommitted",
            Completion::Pending => "pending in an open transaction",
        })
    }
}

/// Transaction control typed into the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionControl {
    Open,
    Commit,
    Rollback,
}

impl TransactionControl {
    pub fn detect(sql: &str) -> Option<Self> {
        let mut words = words(statement_start(sql));
        let first = words.next()?;
        if first.eq_ignore_ascii_case("BEGIN") {
            return Some(TransactionControl::Open);
        }
        if first.eq_ignore_ascii_case("START") {
            return words
                .next()
                .filter(|w| w.eq_ignore_ascii_case("TRANSACTION"))
                .map(|_| TransactionControl::Open);
        }
        if first.eq_ignore_ascii_case("COMMIT") || first.eq_ignore_ascii_case("END") {
            return Some(TransactionControl::Commit);
        }
        if first.eq_ignore_ascii_case("ROLLBACK") {
            // ROLLBACK [TRANSACTION | WORK] TO [SAVEPOINT] name keeps the transaction open
            let to_savepoint = words
                .find(|w| !w.eq_ignore_ascii_case("TRANSACTION") && !w.eq_ignore_ascii_case("WORK"))
                .is_some_and(|w| w.eq_ignore_ascii_case("TO"));
            return (!to_savepoint).then_some(TransactionControl::Rollback);
        }
        None
    }
}

/// The statement text after leading whitespace and `--`, `#`, `/* */` comments.
fn statement_start(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--").or_else(|| rest.strip_prefix('#')) {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            return rest;
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
}

fn leading_keyword(sql: &str) -> Option<&str> {
    let rest = statement_start(sql);
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

fn leading_keyword_in(sql: &str, keywords: &[&str]) -> bool {
    leading_keyword(sql).is_some_and(|kw| keywords.iter().any(|k| k.eq_ignore_ascii_case(kw)))
}
