use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Args, ValueEnum};
use feedsync_core::{AccountScope, Archive, ScopeFilter};

/// Scope flags shared by the feed commands.
#[derive(Debug, Clone, Default, Args)]
pub struct ScopeArgs {
    /// Account id, or "all"
    #[arg(long, short = 'a', default_value = "all")]
    pub account: String,

    /// Chat id to include (can be specified multiple times)
    #[arg(long = "chat")]
    pub chats: Vec<String>,

    /// Case-insensitive text to find in message content
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Earliest timestamp: RFC 3339 or YYYY-MM-DD
    #[arg(long)]
    pub since: Option<String>,

    /// Latest timestamp: RFC 3339 or YYYY-MM-DD (inclusive of that whole day)
    #[arg(long)]
    pub until: Option<String>,
}

impl ScopeArgs {
    pub fn account_scope(&self) -> AccountScope {
        AccountScope::parse(&self.account)
    }

    pub fn to_scope(&self) -> Result<ScopeFilter> {
        let since = self
            .since
            .as_deref()
            .map(|s| parse_bound(s, Bound::Start))
            .transpose()?;
        let until = self
            .until
            .as_deref()
            .map(|s| parse_bound(s, Bound::End))
            .transpose()?;
        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                bail!("--since {} is after --until {}", since, until);
            }
        }

        let mut scope = ScopeFilter::for_account(self.account_scope())
            .with_chats(self.chats.clone())
            .with_range(since, until);
        if let Some(search) = &self.search {
            scope = scope.with_search(search.as_str());
        }
        Ok(scope)
    }
}

/// Which backend message store to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ArchiveArg {
    /// Messages logged by the running clients
    #[default]
    Live,
    /// Messages copied by dump jobs
    Dump,
}

impl From<ArchiveArg> for Archive {
    fn from(arg: ArchiveArg) -> Self {
        match arg {
            ArchiveArg::Live => Archive::Live,
            ArchiveArg::Dump => Archive::Dump,
        }
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_bound(value: &str, bound: Bound) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
        bail!("invalid date '{}': expected RFC 3339 or YYYY-MM-DD", value);
    };
    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
    };
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_core::ChatSelection;

    #[test]
    fn test_defaults_to_everything() {
        let scope = ScopeArgs {
            account: "all".to_string(),
            ..ScopeArgs::default()
        }
        .to_scope()
        .unwrap();
        assert_eq!(scope, ScopeFilter::default());
    }

    #[test]
    fn test_full_scope() {
        let args = ScopeArgs {
            account: "42".to_string(),
            chats: vec!["g1".to_string(), "g2".to_string()],
            search: Some("alpha+beta".to_string()),
            since: Some("2024-03-01".to_string()),
            until: Some("2024-03-02T12:00:00+02:00".to_string()),
        };
        let scope = args.to_scope().unwrap();
        assert_eq!(scope.account, AccountScope::Account("42".to_string()));
        assert!(matches!(scope.chat, Some(ChatSelection::Multiple(_))));
        assert_eq!(scope.search.as_deref(), Some("alpha+beta"));
        assert_eq!(scope.start_date.unwrap().to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(scope.end_date.unwrap().to_rfc3339(), "2024-03-02T10:00:00+00:00");
    }

    #[test]
    fn test_until_date_covers_whole_day() {
        let args = ScopeArgs {
            account: "all".to_string(),
            until: Some("2024-03-01".to_string()),
            ..ScopeArgs::default()
        };
        let end = args.to_scope().unwrap().end_date.unwrap();
        assert_eq!(end.to_rfc3339(), "2024-03-01T23:59:59.999+00:00");
    }

    #[test]
    fn test_rejects_bad_input() {
        let args = ScopeArgs {
            account: "all".to_string(),
            since: Some("yesterday".to_string()),
            ..ScopeArgs::default()
        };
        assert!(args.to_scope().is_err());

        let args = ScopeArgs {
            account: "all".to_string(),
            since: Some("2024-03-02".to_string()),
            until: Some("2024-03-01".to_string()),
            ..ScopeArgs::default()
        };
        assert!(args.to_scope().unwrap_err().to_string().contains("is after"));
    }

    #[test]
    fn test_archive_names() {
        assert_eq!(Archive::from(ArchiveArg::default()), Archive::Live);
        let dump = ArchiveArg::from_str("dump", true).unwrap();
        assert_eq!(Archive::from(dump), Archive::Dump);
        assert!(ArchiveArg::from_str("cold", true).is_err());
    }

    #[test]
    fn test_blank_search_is_dropped() {
        let args = ScopeArgs {
            account: "all".to_string(),
            search: Some("   ".to_string()),
            ..ScopeArgs::default()
        };
        assert!(args.to_scope().unwrap().search.is_none());
    }
}
