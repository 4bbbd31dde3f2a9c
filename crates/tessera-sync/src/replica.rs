use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use tessera_protocol::{PanelDescriptor, ReplicaMessage};
use tessera_store::{ChangeFilter, EventKind, ListenerId, Project, ProjectEvent};
use tessera_types::{KeyGenerator, ProjectId};

use crate::config::ReplicaConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{ChannelTransport, Envelope, PeerTransport, ReplicaId};

/// Receiving end of a replica's channel.
pub struct Inbox {
    receiver: UnboundedReceiver<Envelope>,
}

impl Inbox {
    /// Wait for the next envelope.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// The next envelope, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Inbox")
    }
}

struct Loaded {
    project: Arc<Project>,
    listener: ListenerId,
}

struct Shared {
    id: ReplicaId,
    config: ReplicaConfig,
    keys: Arc<KeyGenerator>,
    sender: UnboundedSender<Envelope>,
    peers: RwLock<Vec<Arc<dyn PeerTransport>>>,
    loaded: RwLock<Option<Loaded>>,
    panel: RwLock<Option<PanelDescriptor>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let loaded = self.loaded.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(loaded) = loaded.take() {
            loaded.project.unsubscribe(loaded.listener);
        }
    }
}

/// One runtime instance holding a live project and its peer links.
///
/// Cheap to clone; clones drive the same replica.
#[derive(Clone)]
pub struct Replica {
    shared: Arc<Shared>,
}

impl Replica {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// A replica that already holds `project`, typically the first one.
    pub fn root(project: Arc<Project>, config: ReplicaConfig) -> (Self, Inbox) {
        let (replica, inbox) = Self::detached(Arc::clone(project.keys()), config);
        replica.install(project);
        info!(replica = %replica.id(), "root replica started");
        (replica, inbox)
    }

    /// A replica with no project yet. It becomes usable once a peer answers
    /// its `ready` with a snapshot.
    pub fn detached(keys: Arc<KeyGenerator>, config: ReplicaConfig) -> (Self, Inbox) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            id: ReplicaId::new(),
            config,
            keys,
            sender,
            peers: RwLock::new(Vec::new()),
            loaded: RwLock::new(None),
            panel: RwLock::new(None),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            Inbox { receiver },
        )
    }

    /// Start a child replica linked both ways to this one. The child shares
    /// this process's key generator and inherits the config.
    pub fn spawn_child(&self) -> (Self, Inbox) {
        let (child, inbox) =
            Self::detached(Arc::clone(&self.shared.keys), self.shared.config.clone());
        self.connect(&child);
        child.connect(self);
        debug!(parent = %self.id(), child = %child.id(), "child replica spawned");
        (child, inbox)
    }

    /// Send to `peer` from now on.
    pub fn connect(&self, peer: &Replica) {
        self.add_peer(Arc::new(peer.transport()));
    }

    pub fn add_peer(&self, peer: Arc<dyn PeerTransport>) {
        self.shared
            .peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(peer);
    }

    pub fn remove_peer(&self, id: ReplicaId) -> bool {
        let mut peers = self
            .shared
            .peers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = peers.len();
        peers.retain(|peer| peer.peer_id() != id);
        peers.len() != before
    }

    /// A transport other replicas use to reach this one.
    pub fn transport(&self) -> ChannelTransport {
        ChannelTransport::new(self.shared.id, self.shared.sender.clone())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> ReplicaId {
        self.shared.id
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.shared.config
    }

    pub fn peer_ids(&self) -> Vec<ReplicaId> {
        self.peers().iter().map(|peer| peer.peer_id()).collect()
    }

    /// The live project, once loaded.
    pub fn project(&self) -> Option<Arc<Project>> {
        self.shared
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|loaded| Arc::clone(&loaded.project))
    }

    pub fn is_loaded(&self) -> bool {
        self.project().is_some()
    }

    /// The panel this replica has open, sent to new replicas on `ready`.
    pub fn panel(&self) -> Option<PanelDescriptor> {
        self.shared
            .panel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_panel(&self, panel: Option<PanelDescriptor>) {
        *self
            .shared
            .panel
            .write()
            .unwrap_or_else(PoisonError::into_inner) = panel;
    }

    // -----------------------------------------------------------------------
    // Outgoing
    // -----------------------------------------------------------------------

    /// Tell every peer this replica is ready for a snapshot.
    pub fn announce_ready(&self) {
        info!(replica = %self.id(), peers = self.peers().len(), "announcing ready");
        self.broadcast(&ReplicaMessage::Ready, None);
    }

    fn broadcast(&self, message: &ReplicaMessage, except: Option<ReplicaId>) {
        match Envelope::seal(self.id(), message) {
            Ok(envelope) => self.relay(&envelope, except),
            Err(err) => warn!(
                replica = %self.id(),
                message = message.type_name(),
                error = %err,
                "failed to encode outgoing message"
            ),
        }
    }

    fn relay(&self, envelope: &Envelope, except: Option<ReplicaId>) {
        for peer in self.peers() {
            let peer_id = peer.peer_id();
            if Some(peer_id) == except {
                continue;
            }
            if let Err(err) = peer.post(envelope.relayed_by(self.id())) {
                warn!(replica = %self.id(), peer = %peer_id, error = %err, "message not delivered");
            }
        }
    }

    /// Forward a locally originated change to every peer.
    fn forward_local(&self, project_id: &ProjectId, event: &ProjectEvent) {
        let message = match event {
            ProjectEvent::Transaction(transaction) => ReplicaMessage::IncomingTransaction {
                project_id: project_id.clone(),
                transaction: transaction.clone(),
            },
            ProjectEvent::LocalState {
                property, value, ..
            } if self.shared.config.forward_local_state => ReplicaMessage::LocalStateChanged {
                project_id: project_id.clone(),
                property: property.clone(),
                value: value.clone(),
            },
            _ => return,
        };
        debug!(replica = %self.id(), message = message.type_name(), "forwarding local change");
        self.broadcast(&message, None);
    }

    // -----------------------------------------------------------------------
    // Incoming
    // -----------------------------------------------------------------------

    /// Apply one received envelope.
    ///
    /// Errors describe why the message was dropped; the run loops log them
    /// and carry on.
    pub fn handle(&self, envelope: &Envelope) -> SyncResult<()> {
        let message = envelope.open()?;
        debug!(
            replica = %self.id(),
            from = %envelope.from,
            message = message.type_name(),
            "message received"
        );

        let forwardable = message.is_forwardable();
        match message {
            ReplicaMessage::Ready => self.answer_ready(envelope.from)?,
            ReplicaMessage::LoadProject {
                project_id,
                project_data,
                project_local_state,
                panel,
            } => {
                let project = Project::from_snapshot(
                    project_id,
                    project_data,
                    project_local_state,
                    Arc::clone(&self.shared.keys),
                )?;
                info!(replica = %self.id(), project = %project.id(), from = %envelope.from, "project snapshot installed");
                self.install(Arc::new(project));
                self.set_panel(panel);
            }
            ReplicaMessage::IncomingTransaction {
                project_id,
                transaction,
            } => {
                self.project_for(&project_id)?
                    .apply_external_transaction(transaction);
            }
            ReplicaMessage::LocalStateChanged {
                project_id,
                property,
                value,
            } => {
                self.project_for(&project_id)?
                    .apply_external_local_state(&property, value);
            }
        }

        if forwardable {
            self.rebroadcast(envelope);
        }
        Ok(())
    }

    /// Handle everything already queued in `inbox` without waiting.
    /// Returns the number of envelopes taken off the queue.
    pub fn pump(&self, inbox: &mut Inbox) -> usize {
        let mut handled = 0;
        while let Some(envelope) = inbox.try_recv() {
            self.dispatch(&envelope);
            handled += 1;
        }
        handled
    }

    /// Handle envelopes as they arrive until `shutdown` completes or every
    /// sender is gone. Returns the number of envelopes handled.
    pub async fn run<F>(&self, inbox: &mut Inbox, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut handled = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                next = inbox.recv() => match next {
                    Some(envelope) => {
                        self.dispatch(&envelope);
                        handled += 1;
                    }
                    None => break,
                },
            }
        }
        info!(replica = %self.id(), handled, "replica loop stopped");
        handled
    }

    fn dispatch(&self, envelope: &Envelope) {
        if let Err(err) = self.handle(envelope) {
            warn!(replica = %self.id(), from = %envelope.from, error = %err, "replication message dropped");
        }
    }

    fn answer_ready(&self, from: ReplicaId) -> SyncResult<()> {
        let project = self.project().ok_or(SyncError::NotLoaded)?;
        let peer = self
            .peers()
            .into_iter()
            .find(|peer| peer.peer_id() == from)
            .ok_or(SyncError::UnknownPeer(from))?;

        let panel = if self.shared.config.reopen_panel {
            self.panel()
        } else {
            None
        };
        let message = ReplicaMessage::LoadProject {
            project_id: project.id().clone(),
            project_data: project.data(),
            project_local_state: project.local_state(),
            panel,
        };
        peer.post(Envelope::seal(self.id(), &message)?)?;
        info!(replica = %self.id(), peer = %from, project = %project.id(), "snapshot sent");
        Ok(())
    }

    fn rebroadcast(&self, envelope: &Envelope) {
        if self.shared.config.rebroadcast {
            self.relay(envelope, Some(envelope.from));
        }
    }

    fn project_for(&self, project_id: &ProjectId) -> SyncResult<Arc<Project>> {
        self.project()
            .filter(|project| project.id() == project_id)
            .ok_or_else(|| SyncError::ReplicationDesync(project_id.clone()))
    }

    /// Make `project` the live project and start forwarding its local
    /// changes. Any previously installed project stops being forwarded.
    fn install(&self, project: Arc<Project>) {
        let project_id = project.id().clone();
        let weak = Arc::downgrade(&self.shared);
        let listener = project.subscribe(
            ChangeFilter::kinds([EventKind::Transaction, EventKind::LocalState]),
            move |event| {
                if event.is_external() {
                    return;
                }
                if let Some(shared) = weak.upgrade() {
                    Replica { shared }.forward_local(&project_id, event);
                }
            },
        );

        let previous = self
            .shared
            .loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Loaded { project, listener });
        if let Some(previous) = previous {
            previous.project.unsubscribe(previous.listener);
        }
    }

    fn peers(&self) -> Vec<Arc<dyn PeerTransport>> {
        self.shared
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica")
            .field("id", &self.id())
            .field("peers", &self.peer_ids())
            .field("project", &self.project().map(|p| p.id().clone()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tessera_model::{Model, ModelContext, ReferenceGroup, Scene, SyncRegistry};
    use tessera_store::Transaction;
    use tessera_types::Path;
    use tokio::sync::oneshot;

    use super::*;

    fn root_with(data: serde_json::Value) -> (Replica, Inbox) {
        let keys = Arc::new(KeyGenerator::new());
        let project = Project::from_snapshot(ProjectId::new(), data, Default::default(), keys).unwrap();
        Replica::root(Arc::new(project), ReplicaConfig::default())
    }

    fn handshake(parent: &Replica, parent_inbox: &mut Inbox) -> (Replica, Inbox) {
        let (child, mut child_inbox) = parent.spawn_child();
        child.announce_ready();
        assert_eq!(parent.pump(parent_inbox), 1);
        assert_eq!(child.pump(&mut child_inbox), 1);
        assert!(child.is_loaded());
        (child, child_inbox)
    }

    #[test]
    fn handshake_installs_parent_snapshot() {
        let (root, mut root_inbox) = root_with(json!({"scenes": {"s1": {"name": "Intro"}}}));
        let project = root.project().unwrap();
        project.set_local_state("zoom", json!(2));
        root.set_panel(Some(PanelDescriptor {
            kind: "sceneEditor".into(),
            model_path: Some(Path::root("scenes").child("s1")),
        }));

        let (child, _child_inbox) = handshake(&root, &mut root_inbox);
        let copy = child.project().unwrap();

        assert_eq!(copy.id(), project.id());
        assert_eq!(copy.data(), project.data());
        assert_eq!(copy.local_state_value("zoom"), Some(json!(2)));
        assert_eq!(copy.get(&Path::root("scenes").child("s1").child("name")), Some(json!("Intro")));
        assert_eq!(copy.timeline_len(), 0);
        assert_eq!(child.panel(), root.panel());
    }

    #[test]
    fn panel_is_withheld_when_disabled() {
        let keys = Arc::new(KeyGenerator::new());
        let config = ReplicaConfig {
            reopen_panel: false,
            ..Default::default()
        };
        let (root, mut root_inbox) = Replica::root(Arc::new(Project::new(keys)), config);
        root.set_panel(Some(PanelDescriptor {
            kind: "sceneEditor".into(),
            model_path: None,
        }));

        let (child, _inbox) = handshake(&root, &mut root_inbox);
        assert_eq!(child.panel(), None);
    }

    #[test]
    fn remote_transaction_is_not_echoed() {
        let (x, mut x_inbox) = root_with(json!({}));
        let (y, mut y_inbox) = handshake(&x, &mut x_inbox);

        x.project().unwrap().set(&Path::root("a"), json!(1));
        assert_eq!(y.pump(&mut y_inbox), 1);

        let y_project = y.project().unwrap();
        assert_eq!(y_project.get(&Path::root("a")), Some(json!(1)));
        assert_eq!(y_project.timeline_len(), 1);
        assert!(!y_project.timeline()[0].created_externally);

        // Y applied it as external, so nothing goes back to X.
        assert_eq!(x.pump(&mut x_inbox), 0);
    }

    #[test]
    fn child_writes_reach_parent() {
        let (x, mut x_inbox) = root_with(json!({}));
        let (y, _y_inbox) = handshake(&x, &mut x_inbox);

        y.project().unwrap().delete(&Path::root("missing"));
        y.project().unwrap().set(&Path::root("b"), json!("from y"));
        assert_eq!(x.pump(&mut x_inbox), 2);
        assert_eq!(x.project().unwrap().get(&Path::root("b")), Some(json!("from y")));
    }

    #[test]
    fn hub_rebroadcasts_to_every_other_child() {
        let (hub, mut hub_inbox) = root_with(json!({}));
        let (a, mut a_inbox) = handshake(&hub, &mut hub_inbox);
        let (b, mut b_inbox) = handshake(&hub, &mut hub_inbox);
        let (c, mut c_inbox) = handshake(&hub, &mut hub_inbox);

        a.project().unwrap().set(&Path::root("k"), json!(7));
        assert_eq!(hub.pump(&mut hub_inbox), 1);
        assert_eq!(hub.project().unwrap().get(&Path::root("k")), Some(json!(7)));

        assert_eq!(a.pump(&mut a_inbox), 0);
        assert_eq!(b.pump(&mut b_inbox), 1);
        assert_eq!(c.pump(&mut c_inbox), 1);
        assert_eq!(b.project().unwrap().get(&Path::root("k")), Some(json!(7)));
        assert_eq!(c.project().unwrap().get(&Path::root("k")), Some(json!(7)));

        // Neither relayed copy comes back.
        assert_eq!(hub.pump(&mut hub_inbox), 0);
    }

    #[test]
    fn rebroadcast_can_be_disabled() {
        let keys = Arc::new(KeyGenerator::new());
        let config = ReplicaConfig {
            rebroadcast: false,
            ..Default::default()
        };
        let (hub, mut hub_inbox) = Replica::root(Arc::new(Project::new(keys)), config);
        let (a, _a_inbox) = handshake(&hub, &mut hub_inbox);
        let (_b, mut b_inbox) = handshake(&hub, &mut hub_inbox);

        a.project().unwrap().set(&Path::root("k"), json!(1));
        assert_eq!(hub.pump(&mut hub_inbox), 1);
        assert_eq!(b_inbox.try_recv(), None);
    }

    #[test]
    fn local_state_propagates_without_echo() {
        let (x, mut x_inbox) = root_with(json!({}));
        let (y, mut y_inbox) = handshake(&x, &mut x_inbox);

        x.project().unwrap().set_local_state("selection", json!(["objects", "k"]));
        assert_eq!(y.pump(&mut y_inbox), 1);
        assert_eq!(
            y.project().unwrap().local_state_value("selection"),
            Some(json!(["objects", "k"]))
        );
        assert_eq!(x.pump(&mut x_inbox), 0);
        assert_eq!(y.project().unwrap().timeline_len(), 0);
    }

    #[test]
    fn local_state_stays_local_when_disabled() {
        let keys = Arc::new(KeyGenerator::new());
        let config = ReplicaConfig {
            forward_local_state: false,
            ..Default::default()
        };
        let (x, mut x_inbox) = Replica::root(Arc::new(Project::new(keys)), config);
        let (_y, mut y_inbox) = handshake(&x, &mut x_inbox);

        x.project().unwrap().set_local_state("zoom", json!(3));
        assert_eq!(y_inbox.try_recv(), None);
    }

    #[test]
    fn message_before_load_is_desync() {
        let (x, _x_inbox) = root_with(json!({}));
        let (y, _y_inbox) = x.spawn_child();
        let project_id = x.project().unwrap().id().clone();

        let envelope = Envelope::seal(
            x.id(),
            &ReplicaMessage::IncomingTransaction {
                project_id: project_id.clone(),
                transaction: Transaction::set(Path::root("a"), json!(1)),
            },
        )
        .unwrap();
        assert!(matches!(y.handle(&envelope), Err(SyncError::ReplicationDesync(id)) if id == project_id));
    }

    #[test]
    fn unknown_project_is_dropped() {
        let (x, mut x_inbox) = root_with(json!({}));
        let (y, _y_inbox) = handshake(&x, &mut x_inbox);

        let envelope = Envelope::seal(
            y.id(),
            &ReplicaMessage::LocalStateChanged {
                project_id: ProjectId::from("someone-else"),
                property: "zoom".into(),
                value: json!(1),
            },
        )
        .unwrap();
        x.transport().post(envelope).unwrap();

        assert_eq!(x.pump(&mut x_inbox), 1);
        assert_eq!(x.project().unwrap().local_state_value("zoom"), None);
    }

    #[test]
    fn ready_without_project_is_not_answered() {
        let keys = Arc::new(KeyGenerator::new());
        let (lonely, _inbox) = Replica::detached(keys, ReplicaConfig::default());
        let (other, _other_inbox) = lonely.spawn_child();
        let envelope = Envelope::seal(other.id(), &ReplicaMessage::Ready).unwrap();
        assert!(matches!(lonely.handle(&envelope), Err(SyncError::NotLoaded)));
    }

    #[test]
    fn garbage_frame_is_a_protocol_error() {
        let (x, _inbox) = root_with(json!({}));
        let envelope = Envelope {
            from: ReplicaId::new(),
            frame: vec![0, 0, 0, 2, 1, b'{'],
        };
        assert!(matches!(x.handle(&envelope), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn models_created_on_root_resolve_on_child() {
        let (root, mut root_inbox) = root_with(json!({}));
        let (child, mut child_inbox) = handshake(&root, &mut root_inbox);

        let registry = Arc::new(SyncRegistry::editor());
        let root_ctx = ModelContext::new(root.project().unwrap(), Arc::clone(&registry));
        let scenes = ReferenceGroup::<Scene>::new(root_ctx, Path::root(Scene::COLLECTION));
        let scene = scenes.add_new(|s| s.set_name("Intro")).unwrap();
        child.pump(&mut child_inbox);

        let child_ctx = ModelContext::new(child.project().unwrap(), registry);
        let mirrored = ReferenceGroup::<Scene>::new(child_ctx, Path::root(Scene::COLLECTION));
        let list = mirrored.model_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name().as_deref(), Some("Intro"));
        assert_eq!(list[0].handle().path(), scene.handle().path());
    }

    #[tokio::test]
    async fn run_loop_serves_handshake() {
        let (root, mut root_inbox) = root_with(json!({"a": 1}));
        let (child, mut child_inbox) = root.spawn_child();
        let (stop, stopped) = oneshot::channel::<()>();

        let server = root.clone();
        let task = tokio::spawn(async move {
            server
                .run(&mut root_inbox, async {
                    let _ = stopped.await;
                })
                .await
        });

        child.announce_ready();
        let envelope = tokio::time::timeout(Duration::from_secs(5), child_inbox.recv())
            .await
            .unwrap()
            .unwrap();
        child.handle(&envelope).unwrap();
        assert_eq!(child.project().unwrap().get(&Path::root("a")), Some(json!(1)));

        stop.send(()).unwrap();
        assert_eq!(task.await.unwrap(), 1);
    }
}
