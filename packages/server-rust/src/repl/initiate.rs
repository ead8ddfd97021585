//! Set initiation and reconfiguration.
//!
//! Both paths probe every prospective member with a `checkEmpty` heartbeat
//! before committing: initiation demands empty, unconfigured peers;
//! reconfiguration demands that nobody already holds a config version at
//! or above the proposal.

use std::sync::Arc;

use tracing::{info, warn};

use drove_core::messages::{
    HeartbeatRequest, ReplSetConfigDoc, REPL_PROTOCOL_VERSION,
};
use drove_core::ProcessIdentity;

use crate::error::{CommandError, ErrorKind};

use super::config::ReplSetConfig;
use super::coordinator::{ReplSet, StartupStatus};
use super::heartbeat::ReplTransport;

/// Probes every member of a proposed configuration.
///
/// # Errors
///
/// - `BadInput` when self is absent from (or duplicated in) the proposal.
/// - `ConfigConflict` when a peer already belongs to a set (initiation) or
///   holds a config version at or above the proposal (reconfiguration),
///   when a peer's set name mismatches, or when a non-initiating peer has
///   data.
/// - `Transient` when any peer is unreachable or not ready.
pub async fn check_all_members_up_for_config_change(
    cfg: &ReplSetConfig,
    identity: &ProcessIdentity,
    transport: &dyn ReplTransport,
) -> Result<(), CommandError> {
    match cfg.count_self(identity) {
        0 => return Err(CommandError::bad_input("can't find self in the replset config")),
        1 => {}
        _ => return Err(CommandError::bad_input("bad config: self appears twice")),
    }

    for member in &cfg.members {
        let host = member.host.to_string();
        let req = HeartbeatRequest {
            set_name: cfg.set_id.clone(),
            config_version: -1,
            protocol_version: REPL_PROTOCOL_VERSION,
            check_empty: true,
        };
        let res = match transport.heartbeat(&member.host, req).await {
            Ok(res) => res,
            Err(e) => {
                warn!(member = %host, error = %e, "config-change heartbeat failed");
                return Err(CommandError::transient(format!(
                    "need all members up to initiate, not ok: {host}"
                )));
            }
        };

        if let Some(their_version) = res.config_version {
            if their_version >= cfg.version {
                return Err(CommandError::config_conflict(format!(
                    "member {host} has too new a config version ({their_version}) to \
                     reconfigure"
                )));
            }
        }
        if res.mismatch {
            return Err(CommandError::config_conflict(format!(
                "set name does not match the set name host {host} expects"
            )));
        }
        if res.set.is_some() {
            if cfg.version <= 1 {
                // This is to be initiation; no one should be initiated
                // already.
                return Err(CommandError::config_conflict(format!(
                    "member {host} is already initiated"
                )));
            }
        } else if !res.ok && !res.rs {
            return Err(CommandError::transient(format!(
                "need all members up to initiate, not ok: {host}"
            )));
        }

        // Initiation demands empty members; a running set's members hold
        // data by definition.
        if cfg.version <= 1 && res.has_data == Some(true) && !member.host.is_self(identity) {
            return Err(CommandError::config_conflict(format!(
                "member {host} has data already, cannot initiate set; all members except \
                 the initiator must be empty"
            )));
        }
    }
    Ok(())
}

/// Christens a replica set.
///
/// # Errors
///
/// Refused (`BadInput`) when already initialized, when the node's op-log
/// is non-empty, or when the proposed version exceeds one; `Transient`
/// when configuration loading hasn't settled into `EmptyConfig` yet;
/// otherwise whatever the member probe reports.
pub async fn initiate(rs: &Arc<ReplSet>, proposal: &ReplSetConfigDoc) -> Result<(), CommandError> {
    info!(set = %rs.set_name(), "initiate command received");

    if rs.config().is_some() {
        return Err(CommandError::bad_input("already initialized"));
    }
    match rs.startup_status() {
        StartupStatus::BadConfig => {
            return Err(CommandError::bad_input(
                "server already in BADCONFIG state (check logs); not initiating",
            ));
        }
        StartupStatus::EmptyConfig => {}
        other => {
            return Err(CommandError::transient(format!(
                "all members and seeds must be reachable to initiate set (status {other:?})"
            )));
        }
    }

    // The initiating member may hold other data, but an existing op-log
    // would conflict with the set's.
    match rs.oplog().is_empty() {
        Ok(true) => {}
        Ok(false) => {
            return Err(CommandError::bad_input(
                "op-log is not empty on the initiating member; cannot initiate",
            ));
        }
        Err(e) => return Err(CommandError::new(ErrorKind::Fatal, e.to_string())),
    }

    let cfg = ReplSetConfig::from_doc(proposal).map_err(|e| CommandError::bad_input(e.message))?;
    if cfg.version > 1 {
        return Err(CommandError::bad_input(
            "can't initiate with a version number greater than 1",
        ));
    }
    info!(members = cfg.members.len(), "initiate config parses ok");

    check_all_members_up_for_config_change(&cfg, rs.identity(), rs.transport().as_ref()).await?;
    info!("initiate: all members seem up");

    rs.config_store()
        .save(proposal)
        .map_err(|e| CommandError::new(ErrorKind::Fatal, e.to_string()))?;
    rs.set_startup_status(
        StartupStatus::Soon,
        "received initiate; should come online shortly",
    );
    info!("initiate config now saved locally; should come online in about a minute");
    Ok(())
}

/// Replaces the configuration of a running set.
///
/// # Errors
///
/// `BadInput` before initiation; `ConfigConflict` when the proposed
/// version does not exceed the current one or any peer's; otherwise
/// whatever the member probe reports.
pub async fn reconfig(rs: &Arc<ReplSet>, proposal: &ReplSetConfigDoc) -> Result<(), CommandError> {
    let Some(current) = rs.config() else {
        return Err(CommandError::bad_input("not yet initiated; cannot reconfigure"));
    };
    let cfg = ReplSetConfig::from_doc(proposal).map_err(|e| CommandError::bad_input(e.message))?;
    if cfg.version <= current.version {
        return Err(CommandError::config_conflict(format!(
            "version number must increase (current {}, proposed {})",
            current.version, cfg.version
        )));
    }

    check_all_members_up_for_config_change(&cfg, rs.identity(), rs.transport().as_ref()).await?;

    rs.have_new_config(proposal);
    info!(version = cfg.version, "reconfig accepted");
    Ok(())
}
