use std::fmt;
use std::str::FromStr;

/// Which database a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Mysql,
    Sqlite,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Mysql, Backend::Sqlite];

    /// The selector value used by the query form.
    pub fn selector(self) -> &'static str {
        match self {
            Backend::Mysql => "MYSQL",
            Backend::Sqlite => "SQLITE",
        }
    }

    /// Rewrite `%s` markers into the driver's native positional marker.
    ///
    /// Both sqlx drivers bind with `?`. The replacement is textual, so a `%s`
    /// inside a string literal is rewritten too.
    pub fn translate_placeholders(self, sql: &str) -> String {
        match self {
            Backend::Mysql | Backend::Sqlite => sql.replace("%s", "?"),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|b| b.selector() == s)
            .ok_or_else(|| format!("unknown database selector: {s:?}"))
    }
}
