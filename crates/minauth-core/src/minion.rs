//! Minion and authority identifiers.
//!
//! Minions present themselves with whatever id their config carries, often a
//! fully-qualified hostname ("web01.corp.local"). The CMDB stores short
//! hostnames, so lookups use only the leading label.
//!
//! The authority (Salt master) id follows Salt's default `<host>_master`
//! convention; the target for the remote call is the part before the first `_`.

use std::fmt;

use crate::error::{ConfigError, InvalidMinionId};

/// Identifier a minion presented when asking to be accepted.
///
/// Holds the original, non-normalized string. Events always carry this form;
/// only the lookup uses [`short`](Self::short).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinionId(String);

impl MinionId {
    /// Validate a candidate identifier.
    ///
    /// Fails when the id is empty or when nothing precedes the first `.`
    /// (e.g. ".corp.local"), since there would be no lookup key.
    pub fn parse(raw: &str) -> Result<Self, InvalidMinionId> {
        if raw.is_empty() || short_name(raw).is_empty() {
            return Err(InvalidMinionId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// The id exactly as presented.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lookup key: everything before the first `.`.
    ///
    /// "host01.example.com" → "host01", "host01" → "host01"
    pub fn short(&self) -> &str {
        short_name(&self.0)
    }
}

impl fmt::Display for MinionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target name of the coordinating Salt master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityId(String);

impl AuthorityId {
    /// Derive the authority from a configured master id, truncating at the first `_`.
    ///
    /// "saltmaster_master" → "saltmaster"
    pub fn from_master_id(id: &str) -> Result<Self, ConfigError> {
        let name = id.split('_').next().unwrap_or_default();
        if name.is_empty() {
            return Err(ConfigError::InvalidId(id.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn short_name(id: &str) -> &str {
    id.split('.').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqdn_is_shortened() {
        let id = MinionId::parse("host01.example.com").unwrap();
        assert_eq!(id.short(), "host01");
        assert_eq!(id.as_str(), "host01.example.com");
    }

    #[test]
    fn bare_hostname_unchanged() {
        let id = MinionId::parse("web01").unwrap();
        assert_eq!(id.short(), "web01");
    }

    #[test]
    fn only_first_dot_splits() {
        let id = MinionId::parse("a.b.c.d").unwrap();
        assert_eq!(id.short(), "a");
    }

    #[test]
    fn empty_id_rejected() {
        assert_eq!(MinionId::parse(""), Err(InvalidMinionId(String::new())));
    }

    #[test]
    fn leading_dot_rejected() {
        assert_eq!(
            MinionId::parse(".corp.local"),
            Err(InvalidMinionId(".corp.local".into()))
        );
    }

    #[test]
    fn display_keeps_original() {
        let id = MinionId::parse("web01.corp.local").unwrap();
        assert_eq!(id.to_string(), "web01.corp.local");
    }

    #[test]
    fn master_suffix_truncated() {
        let authority = AuthorityId::from_master_id("saltmaster_master").unwrap();
        assert_eq!(authority.as_str(), "saltmaster");
    }

    #[test]
    fn master_id_split_once() {
        let authority = AuthorityId::from_master_id("salt_prod_master").unwrap();
        assert_eq!(authority.as_str(), "salt");
    }

    #[test]
    fn master_id_without_underscore() {
        let authority = AuthorityId::from_master_id("salt01").unwrap();
        assert_eq!(authority.to_string(), "salt01");
    }

    #[test]
    fn master_id_leading_underscore_invalid() {
        assert!(matches!(
            AuthorityId::from_master_id("_master"),
            Err(ConfigError::InvalidId(_))
        ));
    }
}
