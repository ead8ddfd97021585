//! The replica-set coordinator.
//!
//! One [`ReplSet`] per process: it loads the shared configuration, owns the
//! member table, and drives role transitions. All mutation of self-state
//! happens on the single manager task; health pollers only send it
//! messages. The object itself is guarded by one coarse mutex, and
//! `assume_primary` additionally takes the administrative write lock so
//! promotion is fenced against op-log appends.

use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use drove_core::messages::{MemberState, ReplSetConfigDoc};
use drove_core::{Endpoint, OpTime, ProcessIdentity};

use crate::config::NodeConfig;
use crate::error::CommandError;

use super::config::{parse_repl_set_arg, MemberCfg, ReplSetConfig};
use super::heartbeat::{spawn_health_poll, ReplTransport};
use super::member::{HeartbeatInfo, Member};
use super::storage::{ConfigStore, OplogStore};

// ---------------------------------------------------------------------------
// Startup status
// ---------------------------------------------------------------------------

/// Where startup configuration loading stands, for diagnostics and for the
/// initiate command's preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStatus {
    PreStart,
    LoadingConfig,
    /// A configuration parsed but was invalid: fatal, replication will not
    /// start.
    BadConfig,
    /// Self and every seed are reachable and none has a configuration.
    EmptyConfig,
    /// No configuration found and at least one seed was unreachable.
    EmptyUnreachable,
    /// An initiate was accepted; the set should come online shortly.
    Soon,
    Started,
}

// ---------------------------------------------------------------------------
// Manager messages
// ---------------------------------------------------------------------------

/// Work for the manager task. Health pollers produce; the manager is the
/// sole consumer and the only place self-state changes.
#[derive(Debug)]
pub enum ManagerMsg {
    UpdateHeartbeat(HeartbeatInfo),
    CheckNewState,
    NewConfig(ReplSetConfigDoc),
}

// ---------------------------------------------------------------------------
// ReplSet
// ---------------------------------------------------------------------------

/// Collaborators the coordinator drives the outside world through.
pub struct ReplDeps {
    pub transport: Arc<dyn ReplTransport>,
    pub oplog: Arc<dyn OplogStore>,
    pub config_store: Arc<dyn ConfigStore>,
    /// Shared with the op-log writer; promotion takes it in write mode.
    pub admin_lock: Arc<tokio::sync::RwLock<()>>,
}

struct ReplState {
    my_state: MemberState,
    /// Non-self members of the adopted configuration.
    members: Vec<Member>,
    self_cfg: Option<MemberCfg>,
    current_primary: Option<u32>,
    last_op_time: OpTime,
    hb_tasks: Vec<JoinHandle<()>>,
}

/// The per-node replica-set coordinator.
pub struct ReplSet {
    /// Handle to our own `Arc`, for spawning tasks that hold the
    /// coordinator.
    me: Weak<ReplSet>,
    set_name: String,
    seeds: Vec<Endpoint>,
    identity: ProcessIdentity,
    node_config: Arc<NodeConfig>,
    deps: ReplDeps,
    inner: Mutex<ReplState>,
    /// Adopted configuration snapshot for lock-free readers.
    current_config: ArcSwapOption<ReplSetConfig>,
    startup: Mutex<(StartupStatus, String)>,
    mgr_tx: mpsc::UnboundedSender<ManagerMsg>,
    mgr_rx: Mutex<Option<mpsc::UnboundedReceiver<ManagerMsg>>>,
}

impl ReplSet {
    /// Builds the coordinator from the configured `<set>/<seeds>` string.
    ///
    /// # Errors
    ///
    /// Returns `BadInput` when no replica set is configured or the seed
    /// string is malformed.
    pub fn new(
        node_config: Arc<NodeConfig>,
        identity: ProcessIdentity,
        deps: ReplDeps,
    ) -> Result<Arc<Self>, CommandError> {
        let arg = node_config
            .repl_set
            .as_deref()
            .ok_or_else(|| CommandError::bad_input("no replica set configured"))?;
        let parsed = parse_repl_set_arg(arg, &identity)?;
        let (mgr_tx, mgr_rx) = mpsc::unbounded_channel();

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            set_name: parsed.set_name,
            seeds: parsed.seeds,
            identity,
            node_config,
            deps,
            inner: Mutex::new(ReplState {
                my_state: MemberState::Startup,
                members: Vec::new(),
                self_cfg: None,
                current_primary: None,
                last_op_time: OpTime::default(),
                hb_tasks: Vec::new(),
            }),
            current_config: ArcSwapOption::empty(),
            startup: Mutex::new((StartupStatus::PreStart, "prestart".to_string())),
            mgr_tx,
            mgr_rx: Mutex::new(None),
        }))
    }

    /// A strong handle to this coordinator, for task spawning.
    ///
    /// # Panics
    ///
    /// Panics if called while the last `Arc` is being dropped, which no
    /// live call path does.
    fn arc(&self) -> Arc<Self> {
        self.me.upgrade().expect("coordinator still alive")
    }

    // -- accessors -----------------------------------------------------------

    #[must_use]
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    #[must_use]
    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    #[must_use]
    pub fn node_config(&self) -> &NodeConfig {
        &self.node_config
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn ReplTransport> {
        &self.deps.transport
    }

    pub(crate) fn oplog(&self) -> &Arc<dyn OplogStore> {
        &self.deps.oplog
    }

    pub(crate) fn config_store(&self) -> &Arc<dyn ConfigStore> {
        &self.deps.config_store
    }

    #[must_use]
    pub fn seeds(&self) -> &[Endpoint] {
        &self.seeds
    }

    #[must_use]
    pub fn my_state(&self) -> MemberState {
        self.inner.lock().my_state
    }

    #[must_use]
    pub fn last_op_time(&self) -> OpTime {
        self.inner.lock().last_op_time
    }

    /// The adopted configuration, if any.
    #[must_use]
    pub fn config(&self) -> Option<Arc<ReplSetConfig>> {
        self.current_config.load_full()
    }

    /// The adopted configuration version; `-1` before any adoption.
    #[must_use]
    pub fn config_version(&self) -> i64 {
        self.config().map_or(-1, |c| c.version)
    }

    #[must_use]
    pub fn startup_status(&self) -> StartupStatus {
        self.startup.lock().0
    }

    #[must_use]
    pub fn startup_status_msg(&self) -> String {
        self.startup.lock().1.clone()
    }

    pub(crate) fn set_startup_status(&self, status: StartupStatus, msg: impl Into<String>) {
        *self.startup.lock() = (status, msg.into());
    }

    /// The id of the member currently believed primary.
    #[must_use]
    pub fn current_primary(&self) -> Option<u32> {
        self.inner.lock().current_primary
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.my_state() == MemberState::Primary
    }

    /// `true` when own configuration allows holding the primary role.
    #[must_use]
    pub fn i_am_potentially_hot(&self) -> bool {
        self.inner
            .lock()
            .self_cfg
            .as_ref()
            .is_some_and(MemberCfg::potentially_hot)
    }

    /// Snapshot of every peer's heartbeat info.
    #[must_use]
    pub fn heartbeat_table(&self) -> Vec<HeartbeatInfo> {
        self.inner.lock().members.iter().map(|m| m.hb.clone()).collect()
    }

    /// Hosts/passives/arbiters summary, the shape diagnostics expect.
    #[must_use]
    pub fn member_summary(&self) -> MemberSummary {
        let inner = self.inner.lock();
        let mut summary = MemberSummary::default();
        let mut add = |cfg: &MemberCfg| {
            let host = cfg.host.to_string();
            if cfg.potentially_hot() {
                summary.hosts.push(host);
            } else if cfg.arbiter_only {
                summary.arbiters.push(host);
            } else {
                summary.passives.push(host);
            }
        };
        if let Some(cfg) = &inner.self_cfg {
            add(cfg);
        }
        for m in &inner.members {
            add(&m.cfg);
        }
        summary.primary = inner.current_primary;
        summary
    }

    pub(crate) fn send_manager(&self, msg: ManagerMsg) {
        // The manager outlives every sender short of shutdown; a closed
        // channel just means the process is going down.
        let _ = self.mgr_tx.send(msg);
    }

    // -- startup -------------------------------------------------------------

    /// Starts the coordinator: reads the op-log position, enters
    /// `Startup2`, and launches the manager and configuration-loading
    /// tasks. Returns quickly.
    ///
    /// # Errors
    ///
    /// A local op-log read failure is fatal: the node transitions to
    /// `Fatal` and the error is returned.
    pub fn start(&self) -> Result<(), CommandError> {
        match self.deps.oplog.last_op_time() {
            Ok(last) => {
                let mut inner = self.inner.lock();
                inner.last_op_time = last.unwrap_or_default();
                inner.my_state = MemberState::Startup2;
            }
            Err(e) => {
                self.fatal(&format!("couldn't query the local op-log: {e}"));
                return Err(CommandError::fatal(format!(
                    "couldn't query the local op-log: {e}"
                )));
            }
        }

        let rx = self
            .mgr_rx
            .lock()
            .take()
            .ok_or_else(|| CommandError::fatal("coordinator already started"))?;
        let mgr = self.arc();
        tokio::spawn(async move { mgr.manager_loop(rx).await });

        let loader = self.arc();
        tokio::spawn(async move { loader.load_config_loop().await });
        Ok(())
    }

    /// Retries configuration loading until a configuration is adopted or
    /// loading is fatal.
    async fn load_config_loop(self: Arc<Self>) {
        info!(set = %self.set_name, "startup: trying to load config from various servers");
        let retry = Duration::from_millis(self.node_config.config_retry_ms);
        loop {
            match self.try_load_config().await {
                Ok(true) => break,
                Ok(false) => tokio::time::sleep(retry).await,
                Err(_) => return, // fatal; status already set
            }
        }
        self.set_startup_status(StartupStatus::Started, "started");
        self.send_manager(ManagerMsg::CheckNewState);
    }

    /// One configuration-loading pass over self plus every seed.
    ///
    /// Returns `Ok(true)` when a configuration was adopted, `Ok(false)`
    /// when the caller should retry later.
    ///
    /// # Errors
    ///
    /// A parseable-but-invalid configuration (from any source) or a local
    /// store failure is `BadConfig`: fatal.
    pub async fn try_load_config(&self) -> Result<bool, CommandError> {
        self.set_startup_status(StartupStatus::LoadingConfig, "loading replica set config");

        let mut docs: Vec<ReplSetConfigDoc> = Vec::new();
        let mut n_empty = 0_usize;
        let mut n_unreachable = 0_usize;

        match self.deps.config_store.load() {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => n_empty += 1,
            Err(e) => {
                self.set_startup_status(StartupStatus::BadConfig, "error loading set config");
                self.fatal(&format!("error loading local set config: {e}"));
                return Err(CommandError::fatal(e.to_string()));
            }
        }
        let local_version = docs.first().map_or(-1, |d| d.version);

        for seed in &self.seeds {
            match self.deps.transport.fetch_config(seed).await {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => n_empty += 1,
                Err(e) => {
                    n_unreachable += 1;
                    warn!(seed = %seed, error = %e, "couldn't load config from seed");
                }
            }
        }

        let mut configs = Vec::with_capacity(docs.len());
        for doc in &docs {
            match ReplSetConfig::from_doc(doc) {
                Ok(cfg) => configs.push(cfg),
                Err(e) => {
                    self.set_startup_status(StartupStatus::BadConfig, "error loading set config");
                    self.fatal(&format!("bad replica set config: {e}"));
                    return Err(e);
                }
            }
        }

        let Some(highest) = configs.into_iter().max_by_key(|c| c.version) else {
            if n_unreachable == 0 {
                self.set_startup_status(
                    StartupStatus::EmptyConfig,
                    "can't get config from self or any seed (have you run the initiate \
                     command?)",
                );
            } else {
                self.set_startup_status(
                    StartupStatus::EmptyUnreachable,
                    "can't currently get config from self or any seed",
                );
            }
            warn!(set = %self.set_name, status = ?self.startup_status(),
                  "no replica set config available yet, will retry");
            return Ok(false);
        };

        let adopted_version = highest.version;
        if !self.init_from_config(highest)? {
            info!("couldn't load config yet, will retry");
            return Ok(false);
        }

        if adopted_version > local_version {
            info!(version = adopted_version, "got config from a remote, saving locally");
            if let Some(cfg) = self.config() {
                if let Err(e) = self.deps.config_store.save(&cfg.to_doc()) {
                    warn!(error = %e, "couldn't persist adopted config");
                }
            }
        }
        Ok(true)
    }

    // -- configuration adoption ---------------------------------------------

    /// Adopts a validated configuration: rebuilds the member table, ends
    /// superseded health tasks, and starts one per non-self member.
    ///
    /// Returns `Ok(false)` (adoption refused) when self is absent.
    ///
    /// # Errors
    ///
    /// Fatal when self appears more than once or the set name differs.
    pub(crate) fn init_from_config(&self, cfg: ReplSetConfig) -> Result<bool, CommandError> {
        match cfg.count_self(&self.identity) {
            0 => {
                warn!(set = %cfg.set_id, "can't find self in the replica set configuration");
                return Ok(false);
            }
            1 => {}
            _ => {
                self.fatal("self appears twice in the replica set configuration");
                return Err(CommandError::fatal(
                    "self appears twice in the replica set configuration",
                ));
            }
        }
        if cfg.set_id != self.set_name {
            self.fatal("replica set name in config doesn't match");
            return Err(CommandError::fatal(format!(
                "replica set name in config ({}) doesn't match ours ({})",
                cfg.set_id, self.set_name
            )));
        }

        let mut inner = self.inner.lock();

        // Reconfig: members absent from the new configuration are orphaned
        // with their pollers.
        for task in inner.hb_tasks.drain(..) {
            task.abort();
        }
        let old_primary = inner.current_primary.take();
        inner.members.clear();
        inner.self_cfg = None;

        for m in &cfg.members {
            if m.host.is_self(&self.identity) {
                inner.self_cfg = Some(m.clone());
                if old_primary == Some(m.id) {
                    inner.current_primary = Some(m.id);
                }
            } else {
                if old_primary == Some(m.id) {
                    inner.current_primary = Some(m.id);
                }
                inner.members.push(Member::new(m.clone()));
                inner
                    .hb_tasks
                    .push(spawn_health_poll(self.arc(), m.id, m.host.clone()));
            }
        }
        drop(inner);

        info!(set = %cfg.set_id, version = cfg.version, members = cfg.members.len(),
              "adopted replica set config");
        self.current_config.store(Some(Arc::new(cfg)));
        self.send_manager(ManagerMsg::CheckNewState);
        Ok(true)
    }

    /// Installs a configuration handed over at runtime (reconfig or a
    /// newer version learned via heartbeat): persists it, then re-inits.
    /// Any failure past validation is fatal.
    pub(crate) fn have_new_config(&self, doc: &ReplSetConfigDoc) {
        let cfg = match ReplSetConfig::from_doc(doc) {
            Ok(c) => c,
            Err(e) => {
                self.fatal(&format!("unexpected error in new config: {e}"));
                return;
            }
        };
        if let Err(e) = self.deps.config_store.save(doc) {
            warn!(error = %e, "couldn't persist new config");
        }
        match self.init_from_config(cfg) {
            Ok(true) => info!("new config saved locally"),
            Ok(false) => warn!("new config does not include self; not adopted"),
            Err(_) => {} // already fatal
        }
    }

    // -- role transitions ----------------------------------------------------

    /// Becomes primary. Legal only from `Secondary` or `Startup2` and only
    /// when own configuration is potentially hot. Takes the administrative
    /// write lock to synchronize with op-log writes.
    ///
    /// Returns `true` when the transition happened.
    pub async fn assume_primary(&self) -> bool {
        if !self.i_am_potentially_hot() {
            return false;
        }
        let _fence = self.deps.admin_lock.write().await;
        let mut inner = self.inner.lock();
        if !matches!(inner.my_state, MemberState::Secondary | MemberState::Startup2) {
            return false;
        }
        inner.my_state = MemberState::Primary;
        inner.current_primary = inner.self_cfg.as_ref().map(|c| c.id);
        info!(set = %self.set_name, "self is now primary");
        true
    }

    /// Steps down: `Primary` (or `Startup2`) becomes `Recovering`.
    pub fn relinquish(&self) {
        let mut inner = self.inner.lock();
        match inner.my_state {
            MemberState::Primary => {
                inner.my_state = MemberState::Recovering;
                if inner.current_primary == inner.self_cfg.as_ref().map(|c| c.id) {
                    inner.current_primary = None;
                }
                info!(set = %self.set_name, "relinquished primary state");
            }
            MemberState::Startup2 => {
                inner.my_state = MemberState::Recovering;
            }
            _ => {}
        }
    }

    /// Enters secondary state (replication caught up enough to serve).
    pub fn become_secondary(&self) {
        let mut inner = self.inner.lock();
        if matches!(
            inner.my_state,
            MemberState::Startup2 | MemberState::Recovering
        ) {
            inner.my_state = MemberState::Secondary;
            info!(set = %self.set_name, "self is now secondary");
        }
    }

    /// Absorbing failure state: stays up for diagnostics, refuses cluster
    /// participation.
    pub fn fatal(&self, msg: &str) {
        self.inner.lock().my_state = MemberState::Fatal;
        error!(set = %self.set_name, msg, "fatal error, stopping replication");
    }

    // -- manager -------------------------------------------------------------

    async fn manager_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ManagerMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                ManagerMsg::UpdateHeartbeat(hb) => self.msg_update_heartbeat(hb),
                ManagerMsg::NewConfig(doc) => {
                    if doc.version > self.config_version() {
                        self.have_new_config(&doc);
                    } else {
                        info!(
                            offered = doc.version,
                            ours = self.config_version(),
                            "received config version isn't higher; ignoring"
                        );
                    }
                }
                ManagerMsg::CheckNewState => self.check_new_state().await,
            }
        }
    }

    fn msg_update_heartbeat(&self, hb: HeartbeatInfo) {
        let mut inner = self.inner.lock();
        if let Some(m) = inner.members.iter_mut().find(|m| m.id() == hb.id) {
            m.hb = hb;
        }
    }

    /// Election check, run only on the manager task.
    ///
    /// A reachable peer claiming primary wins recognition; two primaries
    /// resolve in favor of the lower member id. With no primary in sight,
    /// the lowest-id potentially-hot member among the up majority promotes
    /// itself.
    async fn check_new_state(&self) {
        enum Decision {
            Promote,
            StepDown,
            FollowPrimary,
            None,
        }

        let decision = {
            let mut inner = self.inner.lock();
            let Some(self_cfg) = inner.self_cfg.clone() else {
                return;
            };

            let peer_primary = inner
                .members
                .iter()
                .filter(|m| m.hb.up() && m.hb.state == MemberState::Primary)
                .map(Member::id)
                .min();

            if let Some(peer) = peer_primary {
                inner.current_primary = Some(peer);
                if inner.my_state == MemberState::Primary && peer < self_cfg.id {
                    Decision::StepDown
                } else if inner.my_state == MemberState::Startup2 {
                    Decision::FollowPrimary
                } else {
                    Decision::None
                }
            } else {
                if inner.current_primary != Some(self_cfg.id) {
                    inner.current_primary = None;
                }
                let eligible = matches!(
                    inner.my_state,
                    MemberState::Secondary | MemberState::Startup2
                ) && self_cfg.potentially_hot();

                let total = inner.members.len() + 1;
                let up = 1 + inner.members.iter().filter(|m| m.hb.up()).count();
                let majority = up * 2 > total;

                let lowest_hot_up = inner
                    .members
                    .iter()
                    .filter(|m| m.hb.up() && m.potentially_hot())
                    .map(Member::id)
                    .chain(std::iter::once(self_cfg.id))
                    .min();

                if eligible && majority && lowest_hot_up == Some(self_cfg.id) {
                    Decision::Promote
                } else {
                    Decision::None
                }
            }
        };

        match decision {
            Decision::Promote => {
                self.assume_primary().await;
            }
            Decision::StepDown => {
                warn!(set = %self.set_name, "another primary with a lower id is up, stepping down");
                self.relinquish();
            }
            Decision::FollowPrimary => self.become_secondary(),
            Decision::None => {}
        }
    }
}

/// Hosts/passives/arbiters plus the believed primary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSummary {
    pub hosts: Vec<String>,
    pub passives: Vec<String>,
    pub arbiters: Vec<String>,
    pub primary: Option<u32>,
}
