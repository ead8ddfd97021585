//! Replica-set configuration: validation and seed-string parsing.

use std::collections::HashSet;

use tracing::info;

use drove_core::messages::{MemberConfigDoc, ReplSetConfigDoc};
use drove_core::{Endpoint, ProcessIdentity};

use crate::error::{CommandError, ErrorKind};

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

/// One member's validated configuration entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberCfg {
    pub id: u32,
    pub host: Endpoint,
    pub arbiter_only: bool,
    pub priority: f64,
}

impl MemberCfg {
    /// Eligible to hold the primary role: holds data and has a positive
    /// priority.
    #[must_use]
    pub fn potentially_hot(&self) -> bool {
        !self.arbiter_only && self.priority > 0.0
    }

    fn to_doc(&self) -> MemberConfigDoc {
        MemberConfigDoc {
            id: self.id,
            host: self.host.to_string(),
            arbiter_only: self.arbiter_only,
            priority: if (self.priority - 1.0).abs() < f64::EPSILON {
                None
            } else {
                Some(self.priority)
            },
        }
    }
}

/// A validated replica-set configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplSetConfig {
    pub set_id: String,
    pub version: i64,
    pub members: Vec<MemberCfg>,
}

impl ReplSetConfig {
    /// Validates a stored/wire configuration document.
    ///
    /// # Errors
    ///
    /// Returns a `Fatal`-kind [`CommandError`] for structurally bad
    /// configurations: empty set id, version below one, no members,
    /// duplicate member ids, or unparseable hosts.
    pub fn from_doc(doc: &ReplSetConfigDoc) -> Result<Self, CommandError> {
        let bad = |msg: String| CommandError::new(ErrorKind::Fatal, msg);
        if doc.set_id.is_empty() {
            return Err(bad("replica set config has no set id".to_string()));
        }
        if doc.version < 1 {
            return Err(bad(format!("bad config version {}", doc.version)));
        }
        if doc.members.is_empty() {
            return Err(bad("replica set config has no members".to_string()));
        }
        let mut ids = HashSet::new();
        let mut members = Vec::with_capacity(doc.members.len());
        for m in &doc.members {
            if !ids.insert(m.id) {
                return Err(bad(format!("duplicate member id {}", m.id)));
            }
            let host: Endpoint = m
                .host
                .parse()
                .map_err(|e| bad(format!("bad member host {:?}: {e}", m.host)))?;
            members.push(MemberCfg {
                id: m.id,
                host,
                arbiter_only: m.arbiter_only,
                priority: m.priority.unwrap_or(1.0),
            });
        }
        Ok(Self {
            set_id: doc.set_id.clone(),
            version: doc.version,
            members,
        })
    }

    #[must_use]
    pub fn to_doc(&self) -> ReplSetConfigDoc {
        ReplSetConfigDoc {
            set_id: self.set_id.clone(),
            version: self.version,
            members: self.members.iter().map(MemberCfg::to_doc).collect(),
        }
    }

    /// How many member entries resolve to the running process.
    #[must_use]
    pub fn count_self(&self, identity: &ProcessIdentity) -> usize {
        self.members
            .iter()
            .filter(|m| m.host.is_self(identity))
            .count()
    }

    /// The member entry for the running process, when there is exactly
    /// one.
    #[must_use]
    pub fn self_member(&self, identity: &ProcessIdentity) -> Option<&MemberCfg> {
        let mut found = None;
        for m in &self.members {
            if m.host.is_self(identity) {
                if found.is_some() {
                    return None;
                }
                found = Some(m);
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Seed string
// ---------------------------------------------------------------------------

/// The parsed `--replSet` argument: a set name and the seed endpoints to
/// ask for configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplSeedList {
    pub set_name: String,
    pub seeds: Vec<Endpoint>,
}

/// Parses `<setname>/<seedhost1>,<seedhost2>[,...]`.
///
/// Duplicate seeds and local-host seeds are rejected; a seed that resolves
/// to the running process is logged and skipped.
///
/// # Errors
///
/// Returns a `BadInput`-kind [`CommandError`] for a malformed string.
pub fn parse_repl_set_arg(
    arg: &str,
    identity: &ProcessIdentity,
) -> Result<ReplSeedList, CommandError> {
    let Some((set_name, seed_part)) = arg.split_once('/') else {
        return Err(CommandError::bad_input(
            "bad --replSet config string format is: <setname>/<seedhost1>,<seedhost2>[,...]",
        ));
    };
    if set_name.is_empty() {
        return Err(CommandError::bad_input("bad --replSet config string: empty set name"));
    }

    let mut seen = HashSet::new();
    let mut seeds = Vec::new();
    for part in seed_part.split(',').filter(|p| !p.is_empty()) {
        let seed: Endpoint = part
            .parse()
            .map_err(|e| CommandError::bad_input(format!("bad --replSet seed hostname: {e}")))?;
        if !seen.insert(seed.clone()) {
            return Err(CommandError::bad_input("bad --replSet config string - dups?"));
        }
        if seed.is_local_host() {
            return Err(CommandError::bad_input(
                "can't use localhost in replset host list",
            ));
        }
        if seed.is_self(identity) {
            info!(seed = %seed, "ignoring seed (=self)");
            continue;
        }
        seeds.push(seed);
    }

    Ok(ReplSeedList {
        set_name: set_name.to_string(),
        seeds,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use drove_core::messages::MemberConfigDoc;

    fn doc(version: i64, hosts: &[(u32, &str)]) -> ReplSetConfigDoc {
        ReplSetConfigDoc {
            set_id: "herd".to_string(),
            version,
            members: hosts
                .iter()
                .map(|(id, host)| MemberConfigDoc {
                    id: *id,
                    host: (*host).to_string(),
                    arbiter_only: false,
                    priority: None,
                })
                .collect(),
        }
    }

    fn me() -> ProcessIdentity {
        ProcessIdentity::new("db1", 7100)
    }

    // -- validation --

    #[test]
    fn valid_config_parses() {
        let cfg = ReplSetConfig::from_doc(&doc(1, &[(0, "db1:7100"), (1, "db2:7100")])).unwrap();
        assert_eq!(cfg.set_id, "herd");
        assert_eq!(cfg.members.len(), 2);
        assert!(cfg.members[0].potentially_hot());
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let err =
            ReplSetConfig::from_doc(&doc(1, &[(0, "db1:7100"), (0, "db2:7100")])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
    }

    #[test]
    fn bad_version_and_empty_members_are_fatal() {
        assert!(ReplSetConfig::from_doc(&doc(0, &[(0, "db1:7100")])).is_err());
        assert!(ReplSetConfig::from_doc(&doc(1, &[])).is_err());
    }

    #[test]
    fn bad_host_is_fatal() {
        let err = ReplSetConfig::from_doc(&doc(1, &[(0, "db1:notaport")])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
    }

    #[test]
    fn arbiter_and_zero_priority_are_not_hot() {
        let mut d = doc(1, &[(0, "db1:7100"), (1, "db2:7100")]);
        d.members[0].arbiter_only = true;
        d.members[1].priority = Some(0.0);
        let cfg = ReplSetConfig::from_doc(&d).unwrap();
        assert!(!cfg.members[0].potentially_hot());
        assert!(!cfg.members[1].potentially_hot());
    }

    #[test]
    fn count_self_and_self_member() {
        let cfg = ReplSetConfig::from_doc(&doc(1, &[(0, "db1:7100"), (1, "db2:7100")])).unwrap();
        assert_eq!(cfg.count_self(&me()), 1);
        assert_eq!(cfg.self_member(&me()).unwrap().id, 0);

        let absent = ProcessIdentity::new("db9", 7100);
        assert_eq!(cfg.count_self(&absent), 0);
        assert!(cfg.self_member(&absent).is_none());

        let twice =
            ReplSetConfig::from_doc(&doc(1, &[(0, "db1:7100"), (1, "db1:7100")])).unwrap();
        assert_eq!(twice.count_self(&me()), 2);
        assert!(twice.self_member(&me()).is_none());
    }

    #[test]
    fn doc_roundtrip_preserves_fields() {
        let mut d = doc(4, &[(0, "db1:7100"), (1, "db2:7100")]);
        d.members[1].arbiter_only = true;
        d.members[1].priority = Some(0.0);
        let cfg = ReplSetConfig::from_doc(&d).unwrap();
        let back = cfg.to_doc();
        assert_eq!(back.set_id, "herd");
        assert_eq!(back.version, 4);
        assert!(back.members[1].arbiter_only);
        assert_eq!(back.members[1].priority, Some(0.0));
        assert_eq!(back.members[0].priority, None);
    }

    // -- seed string --

    #[test]
    fn parses_set_name_and_seeds() {
        let parsed = parse_repl_set_arg("herd/db2:7100,db3:7100", &me()).unwrap();
        assert_eq!(parsed.set_name, "herd");
        assert_eq!(parsed.seeds.len(), 2);
    }

    #[test]
    fn missing_slash_is_rejected() {
        assert!(parse_repl_set_arg("herd", &me()).is_err());
        assert!(parse_repl_set_arg("/db2:7100", &me()).is_err());
    }

    #[test]
    fn duplicate_seed_is_rejected() {
        assert!(parse_repl_set_arg("herd/db2:7100,db2:7100", &me()).is_err());
    }

    #[test]
    fn localhost_seed_is_rejected() {
        assert!(parse_repl_set_arg("herd/localhost:7100", &me()).is_err());
        assert!(parse_repl_set_arg("herd/127.0.0.1:7100", &me()).is_err());
    }

    #[test]
    fn self_seed_is_skipped_not_fatal() {
        let parsed = parse_repl_set_arg("herd/db1:7100,db2:7100", &me()).unwrap();
        assert_eq!(parsed.seeds.len(), 1);
        assert_eq!(parsed.seeds[0].host(), "db2");
    }

    #[test]
    fn empty_seed_list_is_allowed() {
        let parsed = parse_repl_set_arg("herd/", &me()).unwrap();
        assert!(parsed.seeds.is_empty());
    }
}
